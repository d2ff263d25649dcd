//! Windows named-pipe I/O engine: pipe primitive, event/scope-guard helpers, and the
//! acceptor/connector endpoint loops that drive the per-connection state machine.

mod acceptor;
mod connection;
mod connector;
mod event;
mod overlapped;
mod pipe;

pub(crate) use acceptor::Acceptor;
pub(crate) use connection::{Connection, ConnectionState};
pub(crate) use connector::Connector;
pub(crate) use event::Event;
pub(crate) use pipe::PipeOps;

pub(crate) mod winprelude {
    pub(crate) use {
        std::os::windows::prelude::*,
        windows_sys::Win32::Foundation::{HANDLE, INVALID_HANDLE_VALUE},
    };
}

use std::os::windows::io::{AsRawHandle, OwnedHandle};
use winprelude::HANDLE;

/// Takes ownership of a raw `HANDLE` returned by a Win32 creation call.
///
/// # Safety
/// `handle` must be a valid, currently-unowned handle (fresh from `CreateFileW`,
/// `CreateNamedPipeW`, or similar).
#[allow(clippy::as_conversions)]
pub(crate) unsafe fn owned_from_handle(handle: HANDLE) -> OwnedHandle {
    unsafe { OwnedHandle::from_raw_handle(handle as std::os::windows::io::RawHandle) }
}
