//! Shared test utilities: a collision-resistant name generator for pipe endpoints, a watchdog
//! that fails a test instead of letting it hang, and `color-eyre`-backed assertions.
#![allow(dead_code, unused_macros)]

#[macro_use]
mod eyre;
#[macro_use]
mod namegen;
mod wdt;
mod xorshift;

pub use {eyre::*, namegen::*, wdt::*, xorshift::*};

use std::time::{Duration, Instant};

pub fn test_wrapper(f: impl (FnOnce() -> TestResult) + Send + 'static) -> TestResult {
    eyre::install();
    self::wdt::run_under_watchdog(f)
}

/// Polls `f` every few milliseconds until it returns `Some` or `timeout` elapses.
pub fn poll_until<T>(timeout: Duration, mut f: impl FnMut() -> Option<T>) -> Option<T> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(v) = f() {
            return Some(v);
        }
        if Instant::now() >= deadline {
            return None;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}
