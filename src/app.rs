//! Application wiring
//!
//! Turns a validated [`Config`] into the runtime pieces: the pneumatic
//! driver, the motion controller, and the print job.

use dispensekit_communication::{
    AckPolicy, Communicator, ConnectionParams, PneumaticConfig, PneumaticDriver,
    RecordingCommunicator, SerialCommunicator,
};
use dispensekit_core::{Axis, ChannelBank, MotionController, Psi, SharedMotionController};
use dispensekit_motion::SimulatedController;
use dispensekit_print::{PrintJob, PrintTiming, RasterPattern};
use dispensekit_settings::{
    Config, ConnectionSettings, MotionSettings, PressureSettings, RasterSettings, TimingSettings,
};
use std::sync::Arc;
use std::time::Duration;

/// Raster geometry from the `raster` section
pub fn raster_pattern(settings: &RasterSettings) -> RasterPattern {
    RasterPattern {
        rows: settings.rows,
        units_per_row: settings.units_per_row,
        travel_axis: Axis::new(settings.travel_axis.as_str()),
        step_axis: Axis::new(settings.step_axis.as_str()),
        lift_axis: Axis::new(settings.lift_axis.as_str()),
        travel: settings.travel,
        step: settings.step,
        speed: settings.speed,
        lift: settings.lift,
        lift_speed: settings.lift_speed,
    }
}

/// Valve timing from the `timing` section
pub fn print_timing(settings: &TimingSettings) -> PrintTiming {
    PrintTiming {
        settle: Duration::from_millis(settings.settle_ms),
        valve_stagger: Duration::from_millis(settings.valve_stagger_ms),
    }
}

/// Link bring-up parameters. A simulated link skips the reset delay.
pub fn pneumatic_config(settings: &ConnectionSettings, simulate: bool) -> PneumaticConfig {
    let ack = if settings.wait_for_ack {
        AckPolicy::WaitForAck {
            timeout: Duration::from_millis(settings.ack_timeout_ms),
        }
    } else {
        AckPolicy::None
    };

    if simulate {
        return PneumaticConfig {
            params: ConnectionParams::recording(),
            startup_delay: Duration::ZERO,
            ack,
        };
    }

    PneumaticConfig {
        params: ConnectionParams::serial(settings.port.as_str())
            .with_baud_rate(settings.baud_rate)
            .with_timeout_ms(settings.timeout_ms),
        startup_delay: Duration::from_millis(settings.startup_delay_ms),
        ack,
    }
}

/// Channel state seeded with the configured pressures, valves closed
pub fn channel_bank(settings: &PressureSettings) -> dispensekit_core::Result<ChannelBank> {
    Ok(ChannelBank::new(
        Psi::new(settings.channel_1_psi)?,
        Psi::new(settings.channel_2_psi)?,
    ))
}

/// Disconnected simulated controller with the configured axes
pub fn motion_controller(settings: &MotionSettings) -> SimulatedController {
    SimulatedController::new(settings.axes.iter().map(|a| Axis::new(a.as_str())))
        .with_time_scale(settings.time_scale)
}

/// Everything a print run needs
pub struct Rig {
    /// Shared pneumatic driver
    pub driver: Arc<PneumaticDriver>,
    /// Connected, started controller with every configured axis enabled
    pub controller: SharedMotionController,
    /// The job to run
    pub job: PrintJob,
}

impl Rig {
    /// Open the pneumatic link and bring the controller up
    pub fn open(config: &Config, simulate: bool) -> anyhow::Result<Self> {
        config.validate()?;

        let channels = Arc::new(channel_bank(&config.pressure)?);
        let link = pneumatic_config(&config.connection, simulate);
        let comm: Box<dyn Communicator> = if simulate {
            let comm = RecordingCommunicator::new();
            if config.connection.wait_for_ack {
                Box::new(comm.with_auto_ack())
            } else {
                Box::new(comm)
            }
        } else {
            Box::new(SerialCommunicator::new())
        };
        let driver = Arc::new(PneumaticDriver::open(&link, comm, channels)?);

        let controller = match motion_controller(&config.motion).ready() {
            Ok(controller) => controller,
            Err(e) => {
                if let Err(cleanup) = driver.shutdown() {
                    tracing::warn!("Cleanup after controller failure: {}", cleanup);
                }
                return Err(e.into());
            }
        };
        tracing::info!("Motion controller ready: {}", controller.name());

        Ok(Self {
            driver,
            controller: Arc::new(controller),
            job: PrintJob {
                pattern: raster_pattern(&config.raster),
                timing: print_timing(&config.timing),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispensekit_core::Channel;
    use dispensekit_print::{JobState, PrintOrchestrator};
    use dispensekit_settings::SettingsManager;
    use dispensekit_ui::ControlSurface;
    use tempfile::TempDir;

    fn fast_config(rows: u32) -> Config {
        let mut config = Config::default();
        config.raster.rows = rows;
        config.timing.settle_ms = 0;
        config.timing.valve_stagger_ms = 0;
        config.motion.time_scale = 0.0;
        config
    }

    #[test]
    fn test_raster_pattern_follows_settings() {
        let settings = RasterSettings {
            rows: 3,
            lift_axis: "Z".to_string(),
            ..RasterSettings::default()
        };
        let pattern = raster_pattern(&settings);
        assert_eq!(pattern.rows, 3);
        assert_eq!(pattern.lift_axis, Axis::new("Z"));
        assert_eq!(pattern.travel, 60.0);
        assert_eq!(pattern.speed, 50.0);
    }

    #[test]
    fn test_default_timing() {
        let timing = print_timing(&TimingSettings::default());
        assert_eq!(timing.settle, Duration::from_secs(5));
        assert_eq!(timing.valve_stagger, Duration::from_millis(100));
    }

    #[test]
    fn test_pneumatic_config_modes() {
        let settings = ConnectionSettings {
            port: "/dev/ttyUSB3".to_string(),
            wait_for_ack: true,
            ..ConnectionSettings::default()
        };

        let real = pneumatic_config(&settings, false);
        assert_eq!(real.params.port, "/dev/ttyUSB3");
        assert_eq!(real.params.baud_rate, 9600);
        assert_eq!(real.startup_delay, Duration::from_millis(2000));
        assert_eq!(
            real.ack,
            AckPolicy::WaitForAck {
                timeout: Duration::from_millis(500)
            }
        );

        let sim = pneumatic_config(&settings, true);
        assert!(sim.startup_delay.is_zero());
    }

    #[test]
    fn test_channel_bank_seeds_pressures() {
        let bank = channel_bank(&PressureSettings {
            channel_1_psi: 20,
            channel_2_psi: 35,
        })
        .unwrap();
        assert_eq!(bank.desired(Channel::One).value(), 20);
        assert_eq!(bank.desired(Channel::Two).value(), 35);
        assert!(!bank.valve_open(Channel::One));

        assert!(channel_bank(&PressureSettings {
            channel_1_psi: 101,
            channel_2_psi: 0,
        })
        .is_err());
    }

    #[test]
    fn test_simulated_rig_opens() {
        let rig = Rig::open(&Config::default(), true).unwrap();
        assert!(rig.driver.is_connected());
        assert!(rig.controller.is_running());
        assert_eq!(rig.job.pattern.rows, 100);
        rig.driver.shutdown().unwrap();
        assert!(!rig.driver.is_connected());
    }

    #[test]
    fn test_print_from_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rig.toml");
        fast_config(2).save_to_file(&path).unwrap();

        let manager = SettingsManager::load_or_default(Some(&path)).unwrap();
        let rig = Rig::open(manager.config(), true).unwrap();
        let driver = rig.driver.clone();

        let report = PrintOrchestrator::new(rig.controller.clone(), driver.clone(), rig.job)
            .run()
            .unwrap();
        assert_eq!(report.state, JobState::Done);
        assert_eq!(report.rows_completed, 2);
        assert_eq!(report.segments, 40);
        assert_eq!(report.lifts, 2);
        assert!(!driver.channels().valve_open(Channel::One));

        driver.shutdown().unwrap();
        assert!(!driver.is_connected());
    }

    #[test]
    fn test_surface_close_stops_running_job() {
        let mut config = fast_config(100);
        config.motion.time_scale = 0.01;
        let rig = Rig::open(&config, true).unwrap();
        let driver = rig.driver.clone();

        let handle = PrintOrchestrator::new(rig.controller.clone(), driver.clone(), rig.job)
            .spawn()
            .unwrap();
        let remote = handle.remote();
        let surface = ControlSurface::new(driver.clone()).with_close_hook(move || {
            remote.stop(Duration::from_secs(10));
        });

        std::thread::sleep(Duration::from_millis(50));
        surface.close().unwrap();

        let report = handle.join().unwrap();
        assert_eq!(report.state, JobState::Cancelled);
        assert!(report.rows_completed < 100);
        assert!(!driver.is_connected());
    }
}
