use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use crate::{Error, Result};

use super::Transport;

/// One scripted step, consumed per `pending_bytes` poll. The script is what
/// makes tick-based deadlines deterministic in tests: one poll, one step.
pub enum FakeStep {
    /// Bytes arrive on the link before this poll.
    Feed(Vec<u8>),
    /// Nothing arrives.
    Idle,
    /// The far end hangs up.
    Eof,
}

impl FakeStep {
    pub fn feed(bytes: &[u8]) -> FakeStep {
        FakeStep::Feed(bytes.to_vec())
    }
}

#[derive(Default)]
struct FakeState {
    script: VecDeque<FakeStep>,
    connect_results: VecDeque<std::result::Result<(), String>>,
    buffer: Vec<u8>,
    writes: Vec<Vec<u8>>,
    connected: bool,
    eof: bool,
    connect_calls: u32,
    polls: u32,
}

impl FakeState {
    fn advance(&mut self) {
        match self.script.pop_front() {
            Some(FakeStep::Feed(bytes)) => self.buffer.extend_from_slice(&bytes),
            Some(FakeStep::Eof) => self.eof = true,
            Some(FakeStep::Idle) | None => {}
        }
    }

    fn exhausted(&self) -> bool {
        self.eof && self.buffer.is_empty()
    }
}

/// Scripted test double for `Transport`. Keep a `FakeHandle` around to
/// inspect writes and poll counts after a `Session` has taken ownership.
pub struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
    open_attempts: u32,
    needs_login: bool,
}

impl FakeTransport {
    pub fn new() -> FakeTransport {
        Self::with_script(Vec::new())
    }

    pub fn with_script(script: Vec<FakeStep>) -> FakeTransport {
        FakeTransport {
            state: Arc::new(Mutex::new(FakeState {
                script: script.into(),
                ..FakeState::default()
            })),
            open_attempts: 10,
            needs_login: false,
        }
    }

    pub fn open_attempts(mut self, attempts: u32) -> FakeTransport {
        self.open_attempts = attempts;
        self
    }

    pub fn needs_login(mut self) -> FakeTransport {
        self.needs_login = true;
        self
    }

    /// Queue a connect outcome; once the queue is empty connects succeed.
    pub fn queue_connect_failure(&self, message: &str) {
        self.state
            .lock()
            .unwrap()
            .connect_results
            .push_back(Err(message.to_string()));
    }

    pub fn handle(&self) -> FakeHandle {
        FakeHandle {
            state: self.state.clone(),
        }
    }
}

impl Transport for FakeTransport {
    fn describe(&self) -> String {
        "fake".to_string()
    }

    fn connect(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.connect_calls += 1;

        match state.connect_results.pop_front() {
            Some(Err(message)) => Err(Error::Connection(message)),
            _ => {
                state.connected = true;
                state.eof = false;
                state.buffer.clear();
                Ok(())
            }
        }
    }

    fn disconnect(&mut self) {
        self.state.lock().unwrap().connected = false;
    }

    fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.state.lock().unwrap().writes.push(data.to_vec());

        Ok(())
    }

    fn pending_bytes(&mut self) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        state.polls += 1;
        state.advance();

        if state.exhausted() {
            return Err(Error::EndOfStream);
        }

        Ok(state.buffer.len())
    }

    fn drain(&mut self) -> Result<Vec<u8>> {
        let mut state = self.state.lock().unwrap();

        if state.exhausted() {
            return Err(Error::EndOfStream);
        }

        Ok(std::mem::take(&mut state.buffer))
    }

    fn discard_pending(&mut self) -> Result<()> {
        self.state.lock().unwrap().buffer.clear();

        Ok(())
    }

    fn open_attempts(&self) -> u32 {
        self.open_attempts
    }

    fn needs_login(&self) -> bool {
        self.needs_login
    }
}

/// Shared view into a `FakeTransport` that outlives the transport's move
/// into a session.
#[derive(Clone)]
pub struct FakeHandle {
    state: Arc<Mutex<FakeState>>,
}

impl FakeHandle {
    pub fn writes(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .writes
            .iter()
            .map(|w| super::decode(w))
            .collect()
    }

    pub fn polls(&self) -> u32 {
        self.state.lock().unwrap().polls
    }

    pub fn connect_calls(&self) -> u32 {
        self.state.lock().unwrap().connect_calls
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_steps_advance_per_poll() {
        let mut fake = FakeTransport::with_script(vec![
            FakeStep::feed(b"abc"),
            FakeStep::Idle,
            FakeStep::feed(b"de"),
        ]);
        fake.connect().unwrap();

        assert_eq!(fake.pending_bytes().unwrap(), 3);
        assert_eq!(fake.pending_bytes().unwrap(), 3);
        assert_eq!(fake.pending_bytes().unwrap(), 5);
        assert_eq!(fake.drain().unwrap(), b"abcde".to_vec());
        assert_eq!(fake.pending_bytes().unwrap(), 0);
    }

    #[test]
    fn eof_fails_reads_once_buffer_is_empty() {
        let mut fake = FakeTransport::with_script(vec![FakeStep::feed(b"x"), FakeStep::Eof]);
        fake.connect().unwrap();

        assert_eq!(fake.pending_bytes().unwrap(), 1);
        // Eof lands, but the buffered byte is still readable.
        assert_eq!(fake.pending_bytes().unwrap(), 1);
        assert_eq!(fake.drain().unwrap(), b"x".to_vec());
        assert!(matches!(fake.pending_bytes(), Err(Error::EndOfStream)));
        assert!(matches!(fake.drain(), Err(Error::EndOfStream)));
    }

    #[test]
    fn handle_sees_writes_after_move() {
        let mut fake = FakeTransport::new();
        let handle = fake.handle();

        fake.connect().unwrap();
        fake.write_all(b"uptime\n").unwrap();

        assert_eq!(handle.writes(), vec!["uptime\n".to_string()]);
        assert_eq!(handle.connect_calls(), 1);
    }

    #[test]
    fn queued_connect_failures_pop_in_order() {
        let mut fake = FakeTransport::new();
        fake.queue_connect_failure("busy");

        assert!(matches!(fake.connect(), Err(Error::Connection(_))));
        assert!(fake.connect().is_ok());
        assert!(fake.is_connected());
    }
}
