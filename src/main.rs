use anyhow::Context;
use clap::{Parser, Subcommand};
use dispensekit::app::{self, Rig};
use dispensekit::{init_logging, LogFormat, BUILD_DATE, VERSION};
use dispensekit_communication::{list_ports, PneumaticDriver};
use dispensekit_motion::ConsoleSession;
use dispensekit_print::{JobRemote, JobState, PrintError, PrintOrchestrator};
use dispensekit_settings::SettingsManager;
use dispensekit_ui::{ControlSurface, TerminalSurface};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// How long cleanup waits for an in-flight move to finish
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "dispensekit", version, about = "Pneumatic dispensing and motion sequencing")]
struct Cli {
    /// Config file (TOML or JSON); defaults to the per-user config
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use an in-memory pneumatic link instead of the serial port
    #[arg(long, global = true)]
    simulate: bool,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive motion-controller console
    Console,
    /// Run the raster print with the pressure control surface
    Print {
        /// Override the number of rows
        #[arg(long)]
        rows: Option<u32>,
        /// Use the GTK window instead of the terminal
        #[arg(long)]
        gui: bool,
    },
    /// List candidate serial ports
    Ports,
    /// Write a default config file
    InitConfig {
        /// Target path; defaults to the per-user config
        path: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    init_logging(cli.verbose, format)?;
    tracing::debug!("DispenseKit {} (built {})", VERSION, BUILD_DATE);

    match cli.command {
        Command::Console => run_console(cli.config.as_deref()),
        Command::Print { rows, gui } => run_print(cli.config.as_deref(), cli.simulate, rows, gui),
        Command::Ports => run_ports(),
        Command::InitConfig { path } => run_init_config(path),
    }
}

fn load_settings(path: Option<&std::path::Path>) -> anyhow::Result<SettingsManager> {
    SettingsManager::load_or_default(path).context("loading configuration")
}

fn run_console(config_path: Option<&std::path::Path>) -> anyhow::Result<()> {
    let settings = load_settings(config_path)?;
    let config = settings.config();
    let controller = Arc::new(app::motion_controller(&config.motion));

    let stdin = io::stdin();
    let mut session = ConsoleSession::new(controller, io::stdout())
        .with_program_task(config.motion.program_task);
    session.run(stdin.lock())?;
    Ok(())
}

fn run_print(
    config_path: Option<&std::path::Path>,
    simulate: bool,
    rows: Option<u32>,
    gui: bool,
) -> anyhow::Result<()> {
    let mut settings = load_settings(config_path)?;
    if let Some(rows) = rows {
        settings.config_mut().raster.rows = rows;
    }

    let rig = Rig::open(settings.config(), simulate)?;
    let driver = rig.driver.clone();
    let handle = PrintOrchestrator::new(rig.controller.clone(), driver.clone(), rig.job).spawn();
    let handle = match handle {
        Ok(handle) => handle,
        Err(e) => {
            shutdown_link(&driver);
            return Err(e.into());
        }
    };
    tracing::info!("Print job {} started", handle.id());

    let remote = handle.remote();
    install_interrupt_cleanup(driver.clone(), remote.clone());

    let stop_job = remote.clone();
    let surface = ControlSurface::new(driver.clone()).with_close_hook(move || {
        stop_job.stop(STOP_TIMEOUT);
    });

    let ui_result = run_surface(surface, remote, gui);

    handle.cancel();
    let outcome = handle.join();
    shutdown_link(&driver);
    ui_result?;

    match outcome {
        Ok(report) => {
            tracing::info!(
                "Print job {} {} after {} rows in {:.1}s",
                report.id,
                report.state,
                report.rows_completed,
                report.elapsed().num_milliseconds() as f64 / 1000.0
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(PrintError::Panicked) => anyhow::bail!("print thread panicked"),
        Err(e) => Err(e).context("print job failed"),
    }
}

fn run_surface(surface: ControlSurface, remote: JobRemote, gui: bool) -> anyhow::Result<()> {
    if gui {
        return run_window(surface);
    }

    let stdin = io::stdin();
    let mut terminal = TerminalSurface::new(surface, io::stdout())
        .with_job_status(move || format!("Print job: {}", remote.state()));
    terminal.run(stdin.lock())?;
    Ok(())
}

#[cfg(feature = "gtk")]
fn run_window(surface: ControlSurface) -> anyhow::Result<()> {
    dispensekit_ui::gtk_app::run_window(surface);
    Ok(())
}

#[cfg(not(feature = "gtk"))]
fn run_window(surface: ControlSurface) -> anyhow::Result<()> {
    surface.close()?;
    anyhow::bail!("built without the `gtk` feature; rebuild with --features gtk or drop --gui")
}

/// Idempotent; the first call performs the vent/close/release sequence
fn shutdown_link(driver: &PneumaticDriver) {
    if let Err(e) = driver.shutdown() {
        tracing::warn!("Pneumatic cleanup incomplete: {}", e);
    }
}

/// On Ctrl-C: stop the job, run cleanup, exit
fn install_interrupt_cleanup(driver: Arc<PneumaticDriver>, remote: JobRemote) {
    let spawned = std::thread::Builder::new()
        .name("interrupt".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    tracing::warn!("Interrupt handler unavailable: {}", e);
                    return;
                }
            };
            if let Err(e) = runtime.block_on(tokio::signal::ctrl_c()) {
                tracing::warn!("Interrupt handler unavailable: {}", e);
                return;
            }

            tracing::warn!("Interrupted, closing valves");
            let state = remote.stop(STOP_TIMEOUT);
            if state != JobState::Cancelled {
                tracing::debug!("Job ended in state {}", state);
            }
            shutdown_link(&driver);
            std::process::exit(130);
        });

    if let Err(e) = spawned {
        tracing::warn!("Interrupt handler unavailable: {}", e);
    }
}

fn run_ports() -> anyhow::Result<()> {
    let ports = list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
        return Ok(());
    }
    for port in ports {
        println!("{}", port);
    }
    Ok(())
}

fn run_init_config(path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = match path {
        Some(path) => path,
        None => SettingsManager::config_file_path()?,
    };
    let manager = SettingsManager::init(&path)?;
    println!("Wrote default configuration to {}", manager.path().display());
    Ok(())
}
