use super::TestResult;
use color_eyre::eyre::eyre;
use std::{sync::mpsc, thread, time::Duration};

/// How long a single test body is given before it's considered hung. Generous: the engine's own
/// internal timeouts (`TransactTimeout` at 2s, the default connect timeout at 5s) both fit
/// comfortably inside it with room for a retry.
const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(15);

/// Runs `f` on its own thread and fails the test if it doesn't return within
/// [`WATCHDOG_TIMEOUT`], instead of hanging the test runner forever on a stuck connection.
pub fn run_under_watchdog(f: impl FnOnce() -> TestResult + Send + 'static) -> TestResult {
    let (tx, rx) = mpsc::channel();
    let handle = thread::Builder::new()
        .name("test-watchdog-body".to_string())
        .spawn(move || {
            let result = f();
            let _ = tx.send(result);
        })
        .expect("failed to spawn test body thread");

    match rx.recv_timeout(WATCHDOG_TIMEOUT) {
        Ok(result) => {
            let _ = handle.join();
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            Err(eyre!("test body did not complete within {WATCHDOG_TIMEOUT:?}"))
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(eyre!("test body thread died without a panic message"))
        }
    }
}
