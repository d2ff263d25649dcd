//! The per-pipe-instance state machine: read/write cycling, the send queue, and the
//! `transact_message` rendezvous.

use super::{
    event::Event,
    overlapped::IoContext,
    pipe::{CompletionRoutine, PipeOps, BUFFER_SIZE},
};
use crate::Error;
use std::{
    cell::{Cell, UnsafeCell},
    collections::VecDeque,
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex, MutexGuard,
    },
    thread::ThreadId,
    time::Duration,
};
use windows_sys::Win32::{
    Foundation::ERROR_OPERATION_ABORTED,
    System::{
        IO::OVERLAPPED,
        Threading::{WaitForSingleObjectEx, INFINITE, WAIT_IO_COMPLETION, WAIT_OBJECT_0},
    },
};

/// How long a `transact_message` call waits for a reply before giving up.
const TRANSACT_TIMEOUT: Duration = Duration::from_secs(2);

/// Where a [`Connection`] is in its read/write cycle.
///
/// `SendPending` holds regardless of whether the pending work is a queued [`post`](Connection::post)
/// message or a `transact_message` request — the only thing either fact changes is which
/// completion routine the next write is submitted with.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ConnectionState {
    /// Constructed but the first read has not been armed yet. Never observed outside the
    /// constructor.
    Unknown,
    /// A write is queued or in flight.
    SendPending,
    /// Idle, with a read outstanding.
    Connected,
}

#[derive(Default)]
struct TransactSlot {
    outgoing: Option<Vec<u8>>,
    reply: Option<Vec<u8>>,
    closed: bool,
}

pub(crate) type OnMessage = Box<dyn Fn(&Arc<Connection>, &[u8]) + Send + Sync>;
pub(crate) type OnClose = Box<dyn Fn(&Arc<Connection>) + Send + Sync>;

/// One accepted-or-dialed named pipe and all state needed to drive it.
///
/// Every field except the ones wrapped in `Mutex`/`Cell`/atomics is touched only from the
/// endpoint I/O thread recorded in `io_thread_id`; the wrapped ones are the handful that `post`,
/// `transact_message` and `close` (callable from any thread) also need to reach.
pub(crate) struct Connection {
    name: Arc<str>,
    pipe: PipeOps,
    /// Shared with every other connection on the same endpoint; signalled by `post` and
    /// `transact_message` to wake the I/O thread's alertable wait.
    write_event: Arc<Event>,
    cancel_io_event: Event,
    read_buf: UnsafeCell<[u8; BUFFER_SIZE]>,
    write_buf: UnsafeCell<[u8; BUFFER_SIZE]>,
    write_size: Cell<u32>,
    send_queue: Mutex<VecDeque<Vec<u8>>>,
    transact: Mutex<TransactSlot>,
    transact_cond: Condvar,
    state: Mutex<ConnectionState>,
    io_thread_id: ThreadId,
    disconnecting: AtomicBool,
    on_message: OnMessage,
    on_close: OnClose,
    io_ctx: UnsafeCell<IoContext<Connection>>,
}

// SAFETY: `read_buf`, `write_buf` and `io_ctx` are only ever touched from `io_thread_id`, which
// every method that touches them asserts via `debug_assert_eq!`. The cross-thread-callable
// methods (`post`, `transact_message`, `close`) only touch the `Mutex`/`Cell`/atomic fields.
unsafe impl Sync for Connection {}
unsafe impl Send for Connection {}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl Connection {
    pub fn new(
        name: Arc<str>,
        pipe: PipeOps,
        write_event: Arc<Event>,
        on_message: OnMessage,
        on_close: OnClose,
    ) -> io::Result<Arc<Self>> {
        let this = Arc::new(Self {
            name,
            pipe,
            write_event,
            cancel_io_event: Event::new_auto_reset()?,
            read_buf: UnsafeCell::new([0; BUFFER_SIZE]),
            write_buf: UnsafeCell::new([0; BUFFER_SIZE]),
            write_size: Cell::new(0),
            send_queue: Mutex::new(VecDeque::new()),
            transact: Mutex::new(TransactSlot::default()),
            transact_cond: Condvar::new(),
            state: Mutex::new(ConnectionState::Unknown),
            io_thread_id: std::thread::current().id(),
            disconnecting: AtomicBool::new(false),
            on_message,
            on_close,
            io_ctx: UnsafeCell::new(IoContext::new()),
        });
        this.start_read()?;
        Ok(this)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    /// Enqueues `msg` for delivery and wakes the I/O thread. Returns as soon as the message is
    /// queued — delivery itself happens asynchronously.
    pub fn post(self: &Arc<Self>, msg: &[u8]) -> Result<(), Error> {
        if msg.len() >= BUFFER_SIZE {
            return Err(Error::MessageTooLarge { len: msg.len(), max: BUFFER_SIZE });
        }
        if self.disconnecting.load(Ordering::Acquire) {
            return Err(Error::IoSubmit(io::Error::from(io::ErrorKind::BrokenPipe)));
        }
        lock(&self.send_queue).push_back(msg.to_vec());
        *lock(&self.state) = ConnectionState::SendPending;
        self.write_event.set().map_err(Error::IoSubmit)?;
        Ok(())
    }

    /// Sends `msg` and blocks until a reply arrives or [`TRANSACT_TIMEOUT`] elapses.
    ///
    /// Must not be called from the endpoint's I/O thread — that thread is the one that would
    /// have to deliver the reply, so calling from it would deadlock until the timeout.
    pub fn transact_message(self: &Arc<Self>, msg: &[u8]) -> Result<Vec<u8>, Error> {
        debug_assert_ne!(
            std::thread::current().id(),
            self.io_thread_id,
            "transact_message must not be called from the connection's own I/O thread"
        );
        if msg.len() >= BUFFER_SIZE {
            return Err(Error::MessageTooLarge { len: msg.len(), max: BUFFER_SIZE });
        }
        {
            let mut slot = lock(&self.transact);
            if slot.closed {
                return Err(Error::IoSubmit(io::Error::from(io::ErrorKind::BrokenPipe)));
            }
            slot.outgoing = Some(msg.to_vec());
            slot.reply = None;
        }
        *lock(&self.state) = ConnectionState::SendPending;
        self.write_event.set().map_err(Error::IoSubmit)?;

        let guard = lock(&self.transact);
        let (mut guard, timeout_result) = self
            .transact_cond
            .wait_timeout_while(guard, TRANSACT_TIMEOUT, |slot| {
                slot.reply.is_none() && !slot.closed
            })
            .unwrap_or_else(|e| e.into_inner());
        if timeout_result.timed_out() && guard.reply.is_none() {
            return Err(Error::TransactTimeout);
        }
        guard.reply.take().ok_or(Error::IoSubmit(io::Error::from(io::ErrorKind::BrokenPipe)))
    }

    /// Closes the connection. Called from the I/O thread, this asks the connection to stop
    /// after any in-flight send drains; called from any other thread, it tears the connection
    /// down immediately.
    pub fn close(self: &Arc<Self>) {
        if std::thread::current().id() == self.io_thread_id {
            self.disconnecting.store(true, Ordering::Release);
        } else {
            self.shutdown();
        }
    }

    /// Invoked by the endpoint loop on its I/O thread when `write_event` fires, once per
    /// connection it manages. A no-op unless this connection actually has something queued.
    pub fn service_pending_write(self: &Arc<Self>) {
        debug_assert_eq!(std::thread::current().id(), self.io_thread_id);
        if *lock(&self.state) != ConnectionState::SendPending {
            return;
        }
        let transact_msg = lock(&self.transact).outgoing.take();
        let result = if let Some(msg) = transact_msg {
            self.submit_write(&msg, Self::completed_write_transact_trampoline)
        } else {
            let next = lock(&self.send_queue).pop_front();
            match next {
                Some(msg) => self.submit_write(&msg, Self::completed_write_trampoline),
                None => {
                    *lock(&self.state) = ConnectionState::Connected;
                    Ok(())
                }
            }
        };
        if result.is_err() {
            self.shutdown();
        }
    }

    fn start_read(self: &Arc<Self>) -> io::Result<()> {
        debug_assert_eq!(std::thread::current().id(), self.io_thread_id);
        *lock(&self.state) = ConnectionState::Connected;
        unsafe {
            (*self.io_ctx.get()).arm(self);
            let buf = (*self.read_buf.get()).as_mut_ptr();
            self.pipe.async_read(
                buf,
                BUFFER_SIZE as u32,
                std::ptr::addr_of_mut!((*self.io_ctx.get()).overlapped),
                Self::completed_read_trampoline,
            )
        }
    }

    /// Cancels the outstanding read (the "one I/O at a time" invariant) and submits `msg` as the
    /// next write, to complete via `routine`. Only valid when a read is actually outstanding —
    /// i.e. on the idle-to-sending transition driven by `service_pending_write`.
    fn submit_write(self: &Arc<Self>, msg: &[u8], routine: CompletionRoutine) -> io::Result<()> {
        debug_assert_eq!(std::thread::current().id(), self.io_thread_id);
        if let Err(e) = self.pipe.cancel_io() {
            if e.kind() != io::ErrorKind::NotFound {
                return Err(e);
            }
        }
        self.drain_cancel_completion();
        self.write_raw(msg, routine)
    }

    /// Submits `msg` as the next write without touching cancellation. Used to drain the next
    /// queued message straight out of a just-finished write's completion routine — no read is
    /// outstanding at that point, so there is nothing to cancel, and calling `cancel_io` anyway
    /// would wait on a `cancel_io_event` that no completion routine will ever signal.
    fn write_raw(self: &Arc<Self>, msg: &[u8], routine: CompletionRoutine) -> io::Result<()> {
        debug_assert_eq!(std::thread::current().id(), self.io_thread_id);
        let len = u32::try_from(msg.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "message too large"))?;
        unsafe {
            let buf = (*self.write_buf.get()).as_mut_ptr();
            std::ptr::copy_nonoverlapping(msg.as_ptr(), buf, msg.len());
        }
        self.write_size.set(len);
        *lock(&self.state) = ConnectionState::SendPending;
        unsafe {
            (*self.io_ctx.get()).arm(self);
            let buf = (*self.write_buf.get()).as_ptr();
            self.pipe.async_write(
                buf,
                len,
                std::ptr::addr_of_mut!((*self.io_ctx.get()).overlapped),
                routine,
            )
        }
    }

    /// Pumps the alertable wait until the cancelled read's completion routine has run and set
    /// `cancel_io_event`, so a fresh write never races the old read's completion.
    fn drain_cancel_completion(&self) {
        loop {
            let rc = unsafe {
                WaitForSingleObjectEx(self.cancel_io_event.as_handle_raw(), INFINITE, 1)
            };
            match rc {
                WAIT_IO_COMPLETION => continue,
                WAIT_OBJECT_0 => break,
                _ => break,
            }
        }
    }

    fn shutdown(self: &Arc<Self>) {
        if self.disconnecting.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.pipe.disconnect();
        {
            let mut slot = lock(&self.transact);
            slot.closed = true;
        }
        self.transact_cond.notify_all();
        (self.on_close)(self);
    }

    fn on_message_received(self: &Arc<Self>, data: &[u8]) {
        (self.on_message)(self, data);
    }

    // --- completion routines -------------------------------------------------------------

    unsafe extern "system" fn completed_read_trampoline(
        error: u32,
        bytes_transferred: u32,
        overlapped: *mut OVERLAPPED,
    ) {
        let conn = unsafe { IoContext::<Self>::disarm(overlapped) };
        conn.on_read_completed(error, bytes_transferred);
    }

    fn on_read_completed(self: Arc<Self>, error: u32, bytes_transferred: u32) {
        if error == ERROR_OPERATION_ABORTED {
            let _ = self.cancel_io_event.set();
            return;
        }
        if error == 0 && bytes_transferred != 0 {
            let data = unsafe {
                std::slice::from_raw_parts((*self.read_buf.get()).as_ptr(), bytes_transferred as usize)
            }
            .to_vec();
            let keep_reading =
                !(self.disconnecting.load(Ordering::Acquire) && lock(&self.send_queue).is_empty());
            if keep_reading {
                if self.start_read().is_err() {
                    self.shutdown();
                    return;
                }
            }
            self.on_message_received(&data);
            if !keep_reading {
                self.shutdown();
            }
        } else {
            self.shutdown();
        }
    }

    unsafe extern "system" fn completed_write_trampoline(
        error: u32,
        bytes_transferred: u32,
        overlapped: *mut OVERLAPPED,
    ) {
        let conn = unsafe { IoContext::<Self>::disarm(overlapped) };
        conn.on_write_completed(error, bytes_transferred);
    }

    fn on_write_completed(self: Arc<Self>, error: u32, bytes_transferred: u32) {
        debug_assert_ne!(error, ERROR_OPERATION_ABORTED, "writes are never cancelled");
        if error == 0 && bytes_transferred == self.write_size.get() {
            let next = lock(&self.send_queue).pop_front();
            let result = match next {
                Some(msg) => self.write_raw(&msg, Self::completed_write_trampoline),
                None => {
                    *lock(&self.state) = ConnectionState::Connected;
                    self.start_read()
                }
            };
            if result.is_err() {
                self.shutdown();
            }
        } else {
            self.shutdown();
        }
    }

    unsafe extern "system" fn completed_write_transact_trampoline(
        error: u32,
        bytes_transferred: u32,
        overlapped: *mut OVERLAPPED,
    ) {
        let conn = unsafe { IoContext::<Self>::disarm(overlapped) };
        conn.on_write_transact_completed(error, bytes_transferred);
    }

    fn on_write_transact_completed(self: Arc<Self>, error: u32, bytes_transferred: u32) {
        debug_assert_ne!(error, ERROR_OPERATION_ABORTED, "writes are never cancelled");
        if error == 0 && bytes_transferred == self.write_size.get() {
            let result = unsafe {
                (*self.io_ctx.get()).arm(&self);
                let buf = (*self.read_buf.get()).as_mut_ptr();
                self.pipe.async_read(
                    buf,
                    BUFFER_SIZE as u32,
                    std::ptr::addr_of_mut!((*self.io_ctx.get()).overlapped),
                    Self::completed_read_transact_trampoline,
                )
            };
            if result.is_err() {
                self.shutdown();
            }
        } else {
            self.shutdown();
        }
    }

    unsafe extern "system" fn completed_read_transact_trampoline(
        error: u32,
        bytes_transferred: u32,
        overlapped: *mut OVERLAPPED,
    ) {
        let conn = unsafe { IoContext::<Self>::disarm(overlapped) };
        conn.on_read_transact_completed(error, bytes_transferred);
    }

    fn on_read_transact_completed(self: Arc<Self>, error: u32, bytes_transferred: u32) {
        if error == ERROR_OPERATION_ABORTED {
            let _ = self.cancel_io_event.set();
            return;
        }
        if error == 0 && bytes_transferred != 0 {
            let reply = unsafe {
                std::slice::from_raw_parts((*self.read_buf.get()).as_ptr(), bytes_transferred as usize)
            }
            .to_vec();
            {
                let mut slot = lock(&self.transact);
                slot.reply = Some(reply);
            }
            self.transact_cond.notify_all();
            if self.start_read().is_err() {
                self.shutdown();
            }
        } else {
            self.shutdown();
        }
    }
}
