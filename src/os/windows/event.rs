use super::winprelude::*;
use crate::misc::{HandleOrErrno, OrErrno};
use std::{io, os::windows::io::OwnedHandle, ptr};
use windows_sys::Win32::System::Threading::{CreateEventW, ResetEvent, SetEvent};

/// An anonymous, unnamed Win32 event object used purely as a wakeup signal for an alertable
/// wait. Never shared across processes, so it never needs a name or security descriptor beyond
/// the default.
pub(crate) struct Event(OwnedHandle);
impl Event {
    /// Creates an auto-reset event (returns to the non-signalled state as soon as one waiter has
    /// observed it), starting non-signalled.
    pub fn new_auto_reset() -> io::Result<Self> {
        Self::create(false, false)
    }

    /// Creates a manual-reset event (stays signalled until explicitly [`reset`](Self::reset)),
    /// with the given initial state.
    pub fn new_manual_reset(initial_state: bool) -> io::Result<Self> {
        Self::create(true, initial_state)
    }

    #[allow(clippy::as_conversions)]
    fn create(manual_reset: bool, initial_state: bool) -> io::Result<Self> {
        let handle = unsafe {
            CreateEventW(
                ptr::null(),
                i32::from(manual_reset),
                i32::from(initial_state),
                ptr::null(),
            )
        };
        let handle = handle.handle_or_errno()?;
        Ok(Self(unsafe {
            OwnedHandle::from_raw_handle(handle as std::os::windows::io::RawHandle)
        }))
    }

    pub fn set(&self) -> io::Result<()> {
        let ok = unsafe { SetEvent(self.as_handle_raw()) };
        (ok != 0).true_or_errno(|| ())
    }

    pub fn reset(&self) -> io::Result<()> {
        let ok = unsafe { ResetEvent(self.as_handle_raw()) };
        (ok != 0).true_or_errno(|| ())
    }

    #[allow(clippy::as_conversions)]
    pub fn as_handle_raw(&self) -> HANDLE {
        self.0.as_raw_handle() as HANDLE
    }
}
