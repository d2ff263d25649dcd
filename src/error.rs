//! The error type returned by this crate's fallible operations.

use std::{error, fmt, io};

/// Everything that can go wrong while setting up or using an endpoint or connection.
///
/// Setup failures ([`PipeCreate`](Error::PipeCreate), [`PipeDial`](Error::PipeDial),
/// [`PipeMode`](Error::PipeMode), [`PipeBusyTimeout`](Error::PipeBusyTimeout),
/// [`ConnectFailed`](Error::ConnectFailed)) end the endpoint's I/O thread. Everything else is
/// scoped to a single connection or a single call and never takes the endpoint down.
#[derive(Debug)]
pub enum Error {
    /// `CreateNamedPipeW` failed while preparing a fresh listening instance.
    PipeCreate(io::Error),
    /// `CreateFileW` failed while dialing a server.
    PipeDial(io::Error),
    /// `SetNamedPipeHandleState` failed while switching a freshly dialed pipe into message mode.
    PipeMode(io::Error),
    /// The server did not accept the connection within the requested timeout
    /// (`ERROR_PIPE_BUSY` persisted past `WaitNamedPipeW`).
    PipeBusyTimeout,
    /// The connect handshake itself failed (the overlapped `ConnectNamedPipe` completed with an
    /// error other than the ones that mean "already connected").
    ConnectFailed(io::Error),
    /// Submitting an overlapped read or write to the kernel failed synchronously.
    IoSubmit(io::Error),
    /// A caller tried to send a message longer than the fixed pipe buffer size.
    MessageTooLarge {
        /// The length of the message the caller tried to send.
        len: usize,
        /// The largest message this crate will submit in one write.
        max: usize,
    },
    /// `transact_message` did not receive a reply within its fixed timeout.
    TransactTimeout,
    /// An endpoint name was empty or contained an embedded NUL.
    InvalidName,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PipeCreate(e) => write!(f, "failed to create named pipe instance: {e}"),
            Self::PipeDial(e) => write!(f, "failed to open named pipe: {e}"),
            Self::PipeMode(e) => write!(f, "failed to set named pipe to message mode: {e}"),
            Self::PipeBusyTimeout => write!(f, "timed out waiting for a free pipe instance"),
            Self::ConnectFailed(e) => write!(f, "connection handshake failed: {e}"),
            Self::IoSubmit(e) => write!(f, "failed to submit overlapped I/O: {e}"),
            Self::MessageTooLarge { len, max } => {
                write!(f, "message of {len} bytes exceeds the {max}-byte limit")
            }
            Self::TransactTimeout => write!(f, "transaction did not complete in time"),
            Self::InvalidName => write!(f, "endpoint name must be non-empty and NUL-free"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::PipeCreate(e)
            | Self::PipeDial(e)
            | Self::PipeMode(e)
            | Self::ConnectFailed(e)
            | Self::IoSubmit(e) => Some(e),
            Self::PipeBusyTimeout
            | Self::MessageTooLarge { .. }
            | Self::TransactTimeout
            | Self::InvalidName => None,
        }
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        let msg = e.to_string();
        match e {
            Error::PipeCreate(e)
            | Error::PipeDial(e)
            | Error::PipeMode(e)
            | Error::ConnectFailed(e)
            | Error::IoSubmit(e) => e,
            Error::PipeBusyTimeout | Error::TransactTimeout => {
                io::Error::new(io::ErrorKind::TimedOut, msg)
            }
            Error::MessageTooLarge { .. } | Error::InvalidName => {
                io::Error::new(io::ErrorKind::InvalidInput, msg)
            }
        }
    }
}
