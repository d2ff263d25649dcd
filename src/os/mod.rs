//! Platform-specific functionality.
//!
//! This crate currently supports Windows only — the wire primitive is the Windows named pipe
//! and the I/O engine is built on Windows' alertable-wait / completion-routine model, neither of
//! which has a portable equivalent worth abstracting over here.

#[cfg(windows)]
pub(crate) mod windows;
