use crate::Result;

pub mod fake;
pub mod process;
pub mod serial;

pub use fake::{FakeHandle, FakeStep, FakeTransport};
pub use process::ProcessTransport;
pub use serial::SerialTransport;

/// Raw byte-stream endpoint behind a console session: a serial device, a
/// spawned local process, or a remote console client process. A transport is
/// exclusively owned by one `Session`.
pub trait Transport: Send {
    /// Short human-readable endpoint identifier for log lines.
    fn describe(&self) -> String;

    fn connect(&mut self) -> Result<()>;

    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Number of received bytes waiting to be drained. The quiet-period
    /// detector polls this.
    fn pending_bytes(&mut self) -> Result<usize>;

    /// Take everything received so far.
    fn drain(&mut self) -> Result<Vec<u8>>;

    fn discard_pending(&mut self) -> Result<()>;

    fn line_sep(&self) -> &str {
        "\n"
    }

    /// Connect attempts `Session::open` may spend on this endpoint.
    fn open_attempts(&self) -> u32 {
        10
    }

    /// Whether `Session::open` must drive a login handshake after connect.
    fn needs_login(&self) -> bool {
        false
    }
}

pub fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .to_string()
        .replace('\u{0000}', "")
}
