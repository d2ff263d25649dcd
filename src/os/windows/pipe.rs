use super::{event::Event, owned_from_handle, winprelude::*};
use crate::misc::{HandleOrErrno, OrErrno};
use crate::name::EndpointName;
use std::{
    io, ptr,
    os::windows::io::OwnedHandle,
    time::{Duration, Instant},
};
use windows_sys::Win32::{
    Foundation::{
        ERROR_IO_PENDING, ERROR_PIPE_BUSY, ERROR_PIPE_CONNECTED, GENERIC_READ, GENERIC_WRITE,
    },
    Storage::FileSystem::{
        CancelIo, CreateFileW, ReadFileEx, WriteFileEx, FILE_FLAG_OVERLAPPED, FILE_SHARE_READ,
        FILE_SHARE_WRITE, OPEN_EXISTING, PIPE_ACCESS_DUPLEX,
    },
    System::IO::{GetOverlappedResult, OVERLAPPED},
    System::Pipes::{
        ConnectNamedPipe, CreateNamedPipeW, DisconnectNamedPipe, SetNamedPipeHandleState,
        WaitNamedPipeW, PIPE_READMODE_MESSAGE, PIPE_TYPE_MESSAGE, PIPE_UNLIMITED_INSTANCES,
        PIPE_WAIT,
    },
};

/// Size, in bytes, of a single message and of the fixed read/write buffers backing it. Matches
/// the original engine's buffer size; messages larger than this are rejected synchronously
/// rather than split across multiple writes.
pub(crate) const BUFFER_SIZE: usize = 4096;
/// Default client-connect timeout, and the per-pipe-instance timeout handed to
/// `CreateNamedPipeW`.
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// The function pointer type the kernel calls back into at the end of an alertable wait that
/// picked up a completed overlapped read or write.
pub(crate) type CompletionRoutine =
    unsafe extern "system" fn(dw_error: u32, bytes_transferred: u32, overlapped: *mut OVERLAPPED);

/// An owned, overlapped-capable named-pipe handle, duplex and message-framed.
pub(crate) struct PipeOps(OwnedHandle);

impl PipeOps {
    /// Prepares a fresh listening instance of `name`, ready for an overlapped `ConnectNamedPipe`.
    pub fn create_server_instance(name: &EndpointName) -> io::Result<Self> {
        let wide = name.to_wide();
        let handle = unsafe {
            CreateNamedPipeW(
                wide.as_ptr(),
                PIPE_ACCESS_DUPLEX | FILE_FLAG_OVERLAPPED,
                PIPE_TYPE_MESSAGE | PIPE_READMODE_MESSAGE | PIPE_WAIT,
                PIPE_UNLIMITED_INSTANCES,
                BUFFER_SIZE as u32,
                BUFFER_SIZE as u32,
                u32::try_from(DEFAULT_TIMEOUT.as_millis()).unwrap_or(u32::MAX),
                ptr::null(),
            )
        };
        let handle = handle.handle_or_errno()?;
        Ok(Self(unsafe { owned_from_handle(handle) }))
    }

    /// Dials an existing server instance of `name`, retrying once via `WaitNamedPipeW` if every
    /// instance is currently busy, then switches the handle into message-read mode.
    pub fn dial_client_instance(
        name: &EndpointName,
        timeout: Duration,
    ) -> Result<Self, crate::Error> {
        let wide = name.to_wide();
        let deadline = Instant::now() + timeout;
        loop {
            let handle = unsafe {
                CreateFileW(
                    wide.as_ptr(),
                    GENERIC_READ | GENERIC_WRITE,
                    FILE_SHARE_READ | FILE_SHARE_WRITE,
                    ptr::null(),
                    OPEN_EXISTING,
                    FILE_FLAG_OVERLAPPED,
                    0,
                )
            };
            match handle.handle_or_errno() {
                Ok(handle) => {
                    let pipe = Self(unsafe { owned_from_handle(handle) });
                    pipe.set_message_read_mode().map_err(crate::Error::PipeMode)?;
                    return Ok(pipe);
                }
                Err(e) if e.raw_os_error() == Some(ERROR_PIPE_BUSY as i32) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(crate::Error::PipeBusyTimeout);
                    }
                    let waited = unsafe {
                        WaitNamedPipeW(
                            wide.as_ptr(),
                            u32::try_from(remaining.as_millis()).unwrap_or(u32::MAX),
                        )
                    };
                    if waited == 0 {
                        return Err(crate::Error::PipeBusyTimeout);
                    }
                }
                Err(e) => return Err(crate::Error::PipeDial(e)),
            }
        }
    }

    fn set_message_read_mode(&self) -> io::Result<()> {
        let mode: u32 = PIPE_READMODE_MESSAGE;
        let ok =
            unsafe { SetNamedPipeHandleState(self.as_handle_raw(), &mode, ptr::null(), ptr::null()) };
        (ok != 0).true_or_errno(|| ())
    }

    /// Begins an overlapped connect wait for a client. Returns `Ok(true)` if a client was
    /// already waiting (the caller must signal completion itself, since no I/O completion
    /// routine will fire for this case), `Ok(false)` if the connect is now pending and will
    /// complete asynchronously.
    pub fn connect_overlapped(&self, overlapped: *mut OVERLAPPED) -> io::Result<bool> {
        let ok = unsafe { ConnectNamedPipe(self.as_handle_raw(), overlapped) };
        if ok != 0 {
            // Documented as "should not happen for overlapped handles", but tolerate it.
            return Ok(true);
        }
        match io::Error::last_os_error().raw_os_error() {
            Some(e) if e == ERROR_PIPE_CONNECTED as i32 => Ok(true),
            Some(e) if e == ERROR_IO_PENDING as i32 => Ok(false),
            _ => Err(io::Error::last_os_error()),
        }
    }

    /// Submits an overlapped read. `buf` must remain valid and exclusively borrowed by the
    /// kernel until `routine` fires or the read is cancelled.
    ///
    /// # Safety
    /// `buf` and `overlapped` must stay valid and live for the duration of the operation; the
    /// caller is responsible for keeping the owning `Connection` alive until `routine` runs.
    pub unsafe fn async_read(
        &self,
        buf: *mut u8,
        len: u32,
        overlapped: *mut OVERLAPPED,
        routine: CompletionRoutine,
    ) -> io::Result<()> {
        let ok = unsafe { ReadFileEx(self.as_handle_raw(), buf.cast(), len, overlapped, Some(routine)) };
        (ok != 0).true_or_errno(|| ())
    }

    /// Submits an overlapped write. Same safety contract as [`async_read`](Self::async_read).
    ///
    /// # Safety
    /// `buf` and `overlapped` must stay valid and live for the duration of the operation; the
    /// caller is responsible for keeping the owning `Connection` alive until `routine` runs.
    pub unsafe fn async_write(
        &self,
        buf: *const u8,
        len: u32,
        overlapped: *mut OVERLAPPED,
        routine: CompletionRoutine,
    ) -> io::Result<()> {
        let ok =
            unsafe { WriteFileEx(self.as_handle_raw(), buf.cast(), len, overlapped, Some(routine)) };
        (ok != 0).true_or_errno(|| ())
    }

    /// Retrieves the result of a completed (non-pending) overlapped operation on this pipe,
    /// e.g. to check whether a connect that signalled its event actually succeeded.
    pub fn overlapped_result(&self, overlapped: *mut OVERLAPPED) -> io::Result<()> {
        let mut transferred: u32 = 0;
        let ok =
            unsafe { GetOverlappedResult(self.as_handle_raw(), overlapped, &mut transferred, 0) };
        (ok != 0).true_or_errno(|| ())
    }

    /// Cancels any outstanding overlapped I/O issued by the calling thread on this pipe.
    pub fn cancel_io(&self) -> io::Result<()> {
        let ok = unsafe { CancelIo(self.as_handle_raw()) };
        (ok != 0).true_or_errno(|| ())
    }

    pub fn disconnect(&self) -> io::Result<()> {
        let ok = unsafe { DisconnectNamedPipe(self.as_handle_raw()) };
        (ok != 0).true_or_errno(|| ())
    }

    #[allow(clippy::as_conversions)]
    pub fn as_handle_raw(&self) -> HANDLE {
        self.0.as_raw_handle() as HANDLE
    }

    /// A stable-for-the-lifetime-of-the-handle integer uniquely identifying this pipe instance
    /// within the process, used to derive a unique connection name.
    #[allow(clippy::as_conversions)]
    pub fn identity(&self) -> usize {
        self.0.as_raw_handle() as usize
    }
}

/// A manual-reset event dedicated to one pending `ConnectNamedPipe`/`ReadFileEx` call, wrapped so
/// its `HANDLE` can be embedded directly in an `OVERLAPPED`.
pub(crate) fn new_overlapped_with_event(event: &Event) -> OVERLAPPED {
    let mut ov: OVERLAPPED = unsafe { std::mem::zeroed() };
    ov.hEvent = event.as_handle_raw();
    ov
}
