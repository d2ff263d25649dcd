//! The embedded-`OVERLAPPED` self-reference pattern binding an in-flight overlapped read or
//! write back to the [`Connection`](super::Connection) that issued it.

use std::{mem, ptr, sync::Arc};
use windows_sys::Win32::System::IO::OVERLAPPED;

/// An `OVERLAPPED` followed by a raw pointer back to its owner.
///
/// `overlapped` must be the first field: a `*mut OVERLAPPED` handed back to a completion routine
/// by the kernel is the address of this field, and completion routines cast it straight back
/// into a `*mut IoContext<T>` to recover `owner`.
#[repr(C)]
pub(crate) struct IoContext<T> {
    pub overlapped: OVERLAPPED,
    owner: *const T,
}

impl<T> IoContext<T> {
    pub fn new() -> Self {
        Self { overlapped: unsafe { mem::zeroed() }, owner: ptr::null() }
    }

    /// Arms this context with `owner` and bumps its `Arc` strong count by one, keeping `owner`
    /// alive for as long as the kernel holds a pointer into this context. Exactly one of
    /// [`disarm`](Self::disarm) must be called per `arm` call, from the completion routine the
    /// armed I/O was submitted with.
    ///
    /// # Safety
    /// The `IoContext` must not move and must outlive the in-flight I/O; in practice this means
    /// it lives embedded in `*owner` itself, so the refcount bump this takes is what keeps it
    /// alive.
    pub unsafe fn arm(&mut self, owner: &Arc<T>) {
        self.owner = Arc::as_ptr(owner);
        unsafe { Arc::increment_strong_count(self.owner) };
    }

    /// Recovers the `Arc<T>` an `IoContext` embedded at `*overlapped` was armed with, consuming
    /// the strong-count bump [`arm`](Self::arm) took.
    ///
    /// # Safety
    /// `overlapped` must be the pointer the kernel passed to a completion routine that was
    /// registered via a prior, matching call to [`arm`](Self::arm) on this same context.
    pub unsafe fn disarm(overlapped: *mut OVERLAPPED) -> Arc<T> {
        let ctx = overlapped.cast::<Self>();
        let owner = unsafe { (*ctx).owner };
        unsafe { Arc::from_raw(owner) }
    }
}

// SAFETY: the embedded `owner` pointer is only ever dereferenced through `Arc`'s own refcounted
// accessors (`arm`/`disarm`), never read or written directly across threads; `OVERLAPPED` itself
// is plain-old-data that the kernel reads and writes according to its own thread-safe protocol.
unsafe impl<T: Send + Sync> Send for IoContext<T> {}
unsafe impl<T: Send + Sync> Sync for IoContext<T> {}
