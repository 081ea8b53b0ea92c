use std::{fmt, io};

pub type Result<T> = std::result::Result<T, Error>;

/// Failure taxonomy for console sessions and the rigs built on them.
///
/// `Connection` means an `open` exhausted its retry budget and the caller may
/// retry at a higher level (power-cycle, re-cable). The two timeout variants
/// split "nothing ever arrived" from "data never settled" so recovery policy
/// can differ. `PromptNotFound` leaves the session open.
#[derive(Debug)]
pub enum Error {
    Connection(String),
    TimeoutNoReceive,
    TimeoutNoReceiveStop,
    PromptNotFound(String),
    CapabilityNotFound(&'static str),
    EndOfStream,
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(msg) => write!(f, "could not open console: {}", msg),
            Error::TimeoutNoReceive => {
                write!(f, "timed out waiting for console output: nothing received")
            }
            Error::TimeoutNoReceiveStop => {
                write!(f, "timed out waiting for console output to settle: still streaming")
            }
            Error::PromptNotFound(cmd) => {
                write!(f, "prompt did not appear after sending `{}`", cmd)
            }
            Error::CapabilityNotFound(what) => {
                write!(f, "no installed capability provides `{}`", what)
            }
            Error::EndOfStream => write!(f, "console closed the stream"),
            Error::Io(e) => write!(f, "io error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e)
    }
}
