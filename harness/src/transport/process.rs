use std::{
    io::{Read, Write},
    process,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread,
};

use crate::{Error, Result};

use super::Transport;

const REMOTE_OPEN_ATTEMPTS: u32 = 5;
const LOCAL_OPEN_ATTEMPTS: u32 = 10;

/// Console reached through a spawned child process: either a local shell, or
/// a remote console client such as `telnet`/`ssh` (the remote flavor drives a
/// login handshake on open).
///
/// A reader thread per output pipe pumps the child's bytes into a shared
/// buffer so `pending_bytes` can be polled without blocking. When the child
/// hangs up, the buffer is drained to its end and then reads fail with
/// `Error::EndOfStream` — for a remote console that usually means another
/// client holds the session.
pub struct ProcessTransport {
    command: String,
    remote: bool,
    child: Option<process::Child>,
    stdin: Option<process::ChildStdin>,
    buffer: Arc<Mutex<Vec<u8>>>,
    eof: Arc<AtomicBool>,
    readers: Vec<thread::JoinHandle<()>>,
}

impl ProcessTransport {
    pub fn local(command: &str) -> ProcessTransport {
        Self::spawn_config(command, false)
    }

    pub fn remote(command: &str) -> ProcessTransport {
        Self::spawn_config(command, true)
    }

    fn spawn_config(command: &str, remote: bool) -> ProcessTransport {
        ProcessTransport {
            command: command.to_string(),
            remote,
            child: None,
            stdin: None,
            buffer: Arc::new(Mutex::new(Vec::new())),
            eof: Arc::new(AtomicBool::new(false)),
            readers: Vec::new(),
        }
    }

    fn pump<R: Read + Send + 'static>(
        &mut self,
        mut pipe: R,
        signal_eof: bool,
    ) {
        let buffer = self.buffer.clone();
        let eof = self.eof.clone();

        self.readers.push(thread::spawn(move || {
            let mut chunk = [0u8; 256];

            loop {
                match pipe.read(&mut chunk) {
                    Ok(0) | Err(_) => {
                        if signal_eof {
                            eof.store(true, Ordering::SeqCst);
                        }
                        break;
                    }
                    Ok(bytes_read) => {
                        buffer.lock().unwrap().extend_from_slice(&chunk[..bytes_read]);
                    }
                }
            }
        }));
    }

    fn exhausted(&self) -> bool {
        self.eof.load(Ordering::SeqCst) && self.buffer.lock().unwrap().is_empty()
    }
}

impl Transport for ProcessTransport {
    fn describe(&self) -> String {
        if self.remote {
            format!("remote `{}`", self.command)
        } else {
            format!("process `{}`", self.command)
        }
    }

    fn connect(&mut self) -> Result<()> {
        if self.child.is_some() {
            return Ok(());
        }

        let mut parts = self.command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| Error::Connection("no console command configured".to_string()))?;

        let mut child = process::Command::new(program)
            .args(parts)
            .stdin(process::Stdio::piped())
            .stdout(process::Stdio::piped())
            .stderr(process::Stdio::piped())
            .spawn()
            .map_err(|e| Error::Connection(format!("could not spawn `{}`: {}", program, e)))?;

        self.buffer.lock().unwrap().clear();
        self.eof.store(false, Ordering::SeqCst);

        let stdout = child.stdout.take().unwrap();
        let stderr = child.stderr.take().unwrap();
        self.pump(stdout, true);
        self.pump(stderr, false);

        self.stdin = child.stdin.take();
        self.child = Some(child);

        Ok(())
    }

    fn disconnect(&mut self) {
        // Close stdin first so a cooperative child can exit on its own.
        self.stdin = None;

        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }

        for reader in self.readers.drain(..) {
            let _ = reader.join();
        }

        self.buffer.lock().unwrap().clear();
        self.eof.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.child.is_some()
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| Error::Connection(format!("`{}` is not running", self.command)))?;

        stdin.write_all(data)?;
        stdin.flush()?;

        Ok(())
    }

    fn pending_bytes(&mut self) -> Result<usize> {
        if self.exhausted() {
            return Err(Error::EndOfStream);
        }

        Ok(self.buffer.lock().unwrap().len())
    }

    fn drain(&mut self) -> Result<Vec<u8>> {
        if self.exhausted() {
            return Err(Error::EndOfStream);
        }

        Ok(std::mem::take(&mut *self.buffer.lock().unwrap()))
    }

    fn discard_pending(&mut self) -> Result<()> {
        self.buffer.lock().unwrap().clear();

        Ok(())
    }

    fn open_attempts(&self) -> u32 {
        if self.remote {
            REMOTE_OPEN_ATTEMPTS
        } else {
            LOCAL_OPEN_ATTEMPTS
        }
    }

    fn needs_login(&self) -> bool {
        self.remote
    }
}

impl Drop for ProcessTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}
