use dispensekit_communication::{PneumaticDriver, RecordingCommunicator, SentLog};
use dispensekit_core::{Channel, ChannelBank};
use dispensekit_ui::{ControlSurface, TerminalSurface};
use std::io::Cursor;
use std::sync::Arc;

fn terminal() -> (TerminalSurface<Vec<u8>>, Arc<PneumaticDriver>, SentLog) {
    let comm = RecordingCommunicator::connected();
    let log = comm.sent_log();
    let driver = Arc::new(PneumaticDriver::new(
        Box::new(comm),
        Arc::new(ChannelBank::default()),
    ));
    let surface = ControlSurface::new(driver.clone());
    (TerminalSurface::new(surface, Vec::new()), driver, log)
}

#[test]
fn test_session_toggles_sets_and_cleans_up() {
    let (mut term, driver, log) = terminal();
    term.run(Cursor::new("toggle 2\npressure 1 30\nstatus\nquit\ntoggle 1\n"))
        .unwrap();

    let output = String::from_utf8(term.into_inner()).unwrap();
    assert!(output.contains("Valve 2 open [Close Valve 2]"));
    assert!(output.contains("Updated desired pressure for channel 1 to: 30 PSI"));
    assert!(output.contains("Channel 1: 30 PSI, valve closed"));
    assert!(output.contains("Channel 2: 15 PSI, valve open"));
    assert!(output.contains("Cleaned up and closed valves."));

    assert_eq!(log.lines(), vec!["2,-1", "1,0", "2,0", "1,-2", "2,-2"]);
    assert!(!driver.is_connected());
}

#[test]
fn test_bad_input_is_reported_and_ignored() {
    let (mut term, driver, log) = terminal();
    for line in ["pressure 1 abc", "pressure 2 101", "toggle 3", "jump"] {
        assert!(term.execute_line(line).unwrap());
    }

    let output = String::from_utf8(term.into_inner()).unwrap();
    assert!(output.contains("Invalid input for pressure 1: 'abc'"));
    assert!(output.contains("Pressure out of range for channel 2: 101 PSI"));
    assert!(output.contains("Unknown pneumatic channel: 3"));
    assert!(output.contains("Unknown command: jump"));
    assert!(log.is_empty());
    assert_eq!(driver.channels().desired(Channel::Two).value(), 15);
}

#[test]
fn test_end_of_input_runs_cleanup() {
    let (mut term, driver, log) = terminal();
    term.run(Cursor::new("")).unwrap();
    assert_eq!(log.len(), 4);
    assert!(!driver.is_connected());
}

#[test]
fn test_job_status_line() {
    let (term, _, _) = terminal();
    let mut term = term.with_job_status(|| "Print job: dispensing".to_string());
    term.execute_line("status").unwrap();
    let output = String::from_utf8(term.into_inner()).unwrap();
    assert!(output.contains("Print job: dispensing"));
}
