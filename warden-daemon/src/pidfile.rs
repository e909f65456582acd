//! Readiness synchronization with double-forking daemons.
//!
//! A daemon that detaches from its launcher communicates its real worker
//! pid only by writing it to a well-known file, some time after the
//! launcher's own child has already exited. There is no synchronous channel
//! between the daemon and the supervisor, so the publish race is resolved
//! by polling the file.

use std::io::ErrorKind;
use std::path::Path;
use std::process::ExitStatus;
use std::time::Duration;

use tracing::debug;

use crate::errors::{DaemonError, Result};

/// Fixed backoff between polls of a not-yet-present pid file.
pub const RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Resolve the authoritative pid of a daemon that publishes it via `path`.
///
/// The launcher child must have exited successfully; a non-zero status
/// means the daemon never started and the file is not consulted at all.
/// A missing file is the expected steady state during the race window and
/// is retried forever on a fixed one-second backoff. There is no retry
/// limit: a daemon that never publishes its pid will block its start until
/// the caller's own supervision timeout intervenes. Any other read
/// failure, including unparseable content, is fatal immediately.
///
/// The returned pid supersedes the launcher child handle for all later
/// signalling; that child is already gone.
pub async fn resolve_pid(service: &str, path: &Path, launch_status: ExitStatus) -> Result<u32> {
    if !launch_status.success() {
        return Err(DaemonError::LaunchFailed {
            service: service.to_string(),
            code: launch_status.code(),
        });
    }

    loop {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let trimmed = content.trim();
                return trimmed.parse::<u32>().map_err(|_| DaemonError::PidFileMalformed {
                    service: service.to_string(),
                    path: path.to_path_buf(),
                    content: trimmed.to_string(),
                });
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(service, path = %path.display(), "pid file not present yet, retrying");
                tokio::time::sleep(RETRY_INTERVAL).await;
            }
            Err(e) => {
                return Err(DaemonError::PidFileRead {
                    service: service.to_string(),
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        }
    }
}
