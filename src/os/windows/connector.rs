//! The client-side endpoint loop: dials a server instance once, then keeps its I/O thread alive
//! to service the resulting connection's writes.

use super::{event::Event, pipe::PipeOps};
use crate::{name::EndpointName, Error};
use std::{sync::Arc, thread::JoinHandle, time::Duration};
use windows_sys::Win32::{
    Foundation::HANDLE,
    System::Threading::{WaitForMultipleObjectsEx, INFINITE, WAIT_IO_COMPLETION, WAIT_OBJECT_0},
};

/// Dials `CreateFileW` synchronously on a dedicated thread and, once connected, drives the same
/// alertable-wait loop an [`Acceptor`](super::Acceptor) uses to service queued writes — minus the
/// repeated listen/accept step, since a client dials exactly once.
pub(crate) struct Connector {
    thread: Option<JoinHandle<()>>,
    close_event: Arc<Event>,
}

impl Connector {
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        name: EndpointName,
        timeout: Duration,
        write_event: Arc<Event>,
        close_event: Arc<Event>,
        on_connect: impl Fn(PipeOps) + Send + Sync + 'static,
        on_write_wakeup: impl Fn() + Send + Sync + 'static,
        on_exception: impl Fn(&Error) + Send + Sync + 'static,
    ) -> std::io::Result<Self> {
        let thread_name = format!("{}-io", name.as_str());
        let close_event_thread = Arc::clone(&close_event);
        let thread = std::thread::Builder::new().name(thread_name).spawn(move || {
            Self::run(
                name,
                timeout,
                write_event,
                close_event_thread,
                on_connect,
                on_write_wakeup,
                on_exception,
            );
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
        timeout: Duration,
        write_event: Arc<Event>,
        close_event: Arc<Event>,
        on_connect: impl Fn(PipeOps),
        on_write_wakeup: impl Fn(),
        on_exception: impl Fn(&Error),
    ) {
        match PipeOps::dial_client_instance(&name, timeout) {
            Ok(pipe) => on_connect(pipe),
            Err(e) => {
                on_exception(&e);
                return;
            }
        }

        let events: [HANDLE; 2] = [write_event.as_handle_raw(), close_event.as_handle_raw()];
        loop {
            let rc = unsafe {
                WaitForMultipleObjectsEx(events.len() as u32, events.as_ptr(), 0, INFINITE, 1)
            };
            match rc {
                WAIT_IO_COMPLETION => continue,
                r if r == WAIT_OBJECT_0 => on_write_wakeup(),
                r if r == WAIT_OBJECT_0 + 1 => return,
                _ => {
                    on_exception(&Error::ConnectFailed(std::io::Error::last_os_error()));
                    return;
                }
            }
        }
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        self.stop();
    }
}
