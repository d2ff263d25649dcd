//! The server-side endpoint loop: repeatedly prepares a fresh listening pipe instance and hands
//! accepted connections to the caller.

use super::{event::Event, pipe::PipeOps};
use crate::{name::EndpointName, Error};
use std::{io, sync::Arc, thread::JoinHandle};
use windows_sys::Win32::{
    Foundation::HANDLE,
    System::{
        IO::OVERLAPPED,
        Threading::{WaitForMultipleObjectsEx, INFINITE, WAIT_IO_COMPLETION, WAIT_OBJECT_0},
    },
};

/// A prepared-but-not-yet-accepted listening instance. The `OVERLAPPED` is boxed so its address
/// stays fixed across the overlapped `ConnectNamedPipe` call even as this value itself is moved
/// in and out of the accept loop's `pending` slot.
struct PendingAccept {
    pipe: PipeOps,
    overlapped: Box<OVERLAPPED>,
}

/// Drives `CreateNamedPipeW` + `ConnectNamedPipe` on a dedicated thread, handing each accepted
/// pipe instance to `on_accept` and waking on `write_event` to let the caller service queued
/// sends across every connection it's tracking.
pub(crate) struct Acceptor {
    thread: Option<JoinHandle<()>>,
    close_event: Arc<Event>,
}

impl Acceptor {
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        name: EndpointName,
        write_event: Arc<Event>,
        close_event: Arc<Event>,
        on_accept: impl Fn(PipeOps) + Send + Sync + 'static,
        on_write_wakeup: impl Fn() + Send + Sync + 'static,
        on_exception: impl Fn(&Error) + Send + Sync + 'static,
    ) -> io::Result<Self> {
        let thread_name = format!("{}-io", name.as_str());
        let close_event_thread = Arc::clone(&close_event);
        let thread = std::thread::Builder::new().name(thread_name).spawn(move || {
            Self::run(name, write_event, close_event_thread, on_accept, on_write_wakeup, on_exception);
        })?;
        Ok(Self { thread: Some(thread), close_event })
    }

    pub fn stop(&mut self) {
        let _ = self.close_event.set();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    fn run(
        name: EndpointName,
        write_event: Arc<Event>,
        close_event: Arc<Event>,
        on_accept: impl Fn(PipeOps),
        on_write_wakeup: impl Fn(),
        on_exception: impl Fn(&Error),
    ) {
        let connect_event = match Event::new_manual_reset(false) {
            Ok(e) => e,
            Err(e) => {
                on_exception(&Error::PipeCreate(e));
                return;
            }
        };
        let events: [HANDLE; 3] =
            [connect_event.as_handle_raw(), write_event.as_handle_raw(), close_event.as_handle_raw()];
        let mut pending: Option<PendingAccept> = None;

        loop {
            if pending.is_none() {
                match Self::prepare_instance(&name, &connect_event) {
                    Ok(p) => pending = Some(p),
                    Err(e) => {
                        on_exception(&Error::PipeCreate(e));
                        return;
                    }
                }
            }

            let rc = unsafe {
                WaitForMultipleObjectsEx(events.len() as u32, events.as_ptr(), 0, INFINITE, 1)
            };
            match rc {
                WAIT_IO_COMPLETION => continue,
                r if r == WAIT_OBJECT_0 => {
                    let _ = connect_event.reset();
                    if let Some(mut p) = pending.take() {
                        match p.pipe.overlapped_result(p.overlapped.as_mut()) {
                            Ok(()) => on_accept(p.pipe),
                            Err(e) => on_exception(&Error::ConnectFailed(e)),
                        }
                    }
                }
                r if r == WAIT_OBJECT_0 + 1 => on_write_wakeup(),
                r if r == WAIT_OBJECT_0 + 2 => return,
                _ => {
                    on_exception(&Error::ConnectFailed(io::Error::last_os_error()));
                    return;
                }
            }
        }
    }

    /// Creates a fresh listening instance and starts an overlapped `ConnectNamedPipe` on it,
    /// synchronously marking `connect_event` signalled if a client was already waiting (the only
    /// case in which the kernel will not do so itself).
    fn prepare_instance(name: &EndpointName, connect_event: &Event) -> io::Result<PendingAccept> {
        let pipe = PipeOps::create_server_instance(name)?;
        let mut overlapped = Box::new(super::pipe::new_overlapped_with_event(connect_event));
        match pipe.connect_overlapped(overlapped.as_mut()) {
            Ok(true) => {
                let _ = connect_event.set();
            }
            Ok(false) => {}
            Err(e) => return Err(e),
        }
        Ok(PendingAccept { pipe, overlapped })
    }
}

impl Drop for Acceptor {
    fn drop(&mut self) {
        self.stop();
    }
}
