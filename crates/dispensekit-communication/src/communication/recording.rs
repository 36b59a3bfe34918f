//! In-memory communicator
//!
//! Records every line written and serves scripted replies. Used by the
//! `--simulate` mode and by tests that need to observe the exact byte
//! stream sent to the pneumatic controller.

use super::{Communicator, ConnectionParams};
use dispensekit_core::{ConnectionError, Result, ThreadSafe, ThreadSafeVec};
use std::collections::VecDeque;

/// Shared view of the lines a [`RecordingCommunicator`] has written
#[derive(Debug, Clone, Default)]
pub struct SentLog {
    lines: ThreadSafeVec<String>,
}

impl SentLog {
    /// Every line written so far, terminators stripped
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Number of lines written
    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    /// Whether nothing has been written
    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    /// Forget everything recorded so far
    pub fn clear(&self) {
        self.lines.lock().clear();
    }

    fn push(&self, line: String) {
        self.lines.lock().push(line);
    }
}

#[derive(Debug, Default)]
struct Script {
    replies: VecDeque<Vec<u8>>,
    auto_ack: bool,
    fail_after: Option<usize>,
}

/// Communicator that keeps all traffic in memory
#[derive(Debug, Default)]
pub struct RecordingCommunicator {
    connected: bool,
    params: Option<ConnectionParams>,
    sent: SentLog,
    partial: Vec<u8>,
    writes: usize,
    script: ThreadSafe<Script>,
}

impl RecordingCommunicator {
    /// Create a disconnected recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a recorder that is already open
    pub fn connected() -> Self {
        Self {
            connected: true,
            params: Some(ConnectionParams::recording()),
            ..Self::default()
        }
    }

    /// Handle to the sent-lines log; stays valid after the recorder is boxed
    pub fn sent_log(&self) -> SentLog {
        self.sent.clone()
    }

    /// Queue bytes to be returned by the next `receive`
    pub fn push_reply(&self, reply: impl Into<Vec<u8>>) {
        self.script.lock().replies.push_back(reply.into());
    }

    /// Reply `ACK` to every completed line
    pub fn with_auto_ack(self) -> Self {
        self.script.lock().auto_ack = true;
        self
    }

    /// Make every write after the first `writes` fail with a serial error
    pub fn fail_after(self, writes: usize) -> Self {
        self.script.lock().fail_after = Some(writes);
        self
    }
}

impl Communicator for RecordingCommunicator {
    fn connect(&mut self, params: &ConnectionParams) -> Result<()> {
        self.connected = true;
        self.params = Some(params.clone());
        tracing::debug!("Recording communicator opened as {}", params.port);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn send(&mut self, data: &[u8]) -> Result<usize> {
        if !self.connected {
            return Err(ConnectionError::NotConnected.into());
        }
        {
            let script = self.script.lock();
            if script.fail_after.is_some_and(|limit| self.writes >= limit) {
                return Err(ConnectionError::SerialError {
                    reason: "write failed".to_string(),
                }
                .into());
            }
        }
        self.writes += 1;

        self.partial.extend_from_slice(data);
        while let Some(pos) = self.partial.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.partial.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line).trim_end().to_string();
            tracing::trace!("recorded: {}", text);
            self.sent.push(text);

            let mut script = self.script.lock();
            if script.auto_ack {
                script.replies.push_back(b"ACK\n".to_vec());
            }
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(ConnectionError::NotConnected.into())
        }
    }

    fn receive(&mut self) -> Result<Vec<u8>> {
        if !self.connected {
            return Err(ConnectionError::NotConnected.into());
        }
        Ok(self.script.lock().replies.pop_front().unwrap_or_default())
    }

    fn connection_params(&self) -> Option<&ConnectionParams> {
        self.params.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_complete_lines_only() {
        let mut comm = RecordingCommunicator::connected();
        let log = comm.sent_log();

        comm.send(b"1,").unwrap();
        assert!(log.is_empty());
        comm.send(b"15\n2,-1\n").unwrap();

        assert_eq!(log.lines(), vec!["1,15".to_string(), "2,-1".to_string()]);
    }

    #[test]
    fn test_rejects_writes_when_closed() {
        let mut comm = RecordingCommunicator::new();
        assert!(comm.send(b"1,-2\n").is_err());

        comm.connect(&ConnectionParams::recording()).unwrap();
        assert!(comm.send(b"1,-2\n").is_ok());

        comm.disconnect().unwrap();
        assert!(comm.send(b"1,-2\n").is_err());
    }

    #[test]
    fn test_auto_ack_and_scripted_replies() {
        let mut comm = RecordingCommunicator::connected().with_auto_ack();
        comm.push_reply("READY\n");
        comm.send(b"1,20\n").unwrap();

        assert_eq!(comm.receive().unwrap(), b"READY\n".to_vec());
        assert_eq!(comm.receive().unwrap(), b"ACK\n".to_vec());
        assert!(comm.receive().unwrap().is_empty());
    }

    #[test]
    fn test_fail_after() {
        let mut comm = RecordingCommunicator::connected().fail_after(1);
        assert!(comm.send(b"1,15\n").is_ok());
        assert!(comm.send(b"2,15\n").is_err());
        assert_eq!(comm.sent_log().len(), 1);
    }
}
