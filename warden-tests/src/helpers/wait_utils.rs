//! Polling helpers for conditions that settle asynchronously.

use std::path::Path;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Poll `predicate` until it holds or `timeout` expires. Returns whether
/// the condition was observed.
pub async fn wait_for<F>(mut predicate: F, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    predicate()
}

/// Wait until a file exists.
pub async fn wait_for_file(path: &Path, timeout: Duration) -> bool {
    wait_for(|| path.exists(), timeout).await
}

/// Wait until a pid is no longer alive.
#[cfg(unix)]
pub async fn wait_for_death(pid: u32, timeout: Duration) -> bool {
    wait_for(|| !warden_unix::process::process_alive(pid), timeout).await
}
