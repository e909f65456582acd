//! Lifecycle actions, one variant per service kind.
//!
//! Descriptors select behavior through tagged variants rather than opaque
//! callbacks: a `daemon` start launches and then waits for the published
//! pid, a `supervised` start keeps the child handle, a `oneshot` start runs
//! to completion. Stop and activate actions follow the same pattern.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{DaemonError, Result};
use crate::launcher::{self, ProcessHandle};
use crate::pidfile;

/// How a service comes up.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StartAction {
    /// Long-lived child supervised directly through its process handle.
    Supervised { command: Vec<String> },
    /// Double-forking daemon that publishes its real pid to a file after
    /// the launcher child exits.
    Daemon { command: Vec<String>, pid_file: PathBuf },
    /// Runs to completion; exit 0 brings the service up with no process
    /// attached (static network setup and similar marker services).
    Oneshot { command: Vec<String> },
}

/// How a service is torn down.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StopAction {
    /// SIGTERM the recorded pid, escalating to SIGKILL when the grace
    /// window expires. Confirms the process is gone before reporting
    /// stopped.
    Signal {
        #[serde(default = "default_grace_secs")]
        grace_secs: u64,
    },
    /// Run a command; exit 0 confirms the service stopped.
    Exec { command: Vec<String> },
    /// Nothing to terminate.
    None,
}

fn default_grace_secs() -> u64 {
    10
}

impl Default for StopAction {
    fn default() -> Self {
        StopAction::Signal {
            grace_secs: default_grace_secs(),
        }
    }
}

/// Pre-start preparation. Must be safe to run repeatedly; every variant is
/// a no-op on an already-correct state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ActivateAction {
    /// Ensure directories exist, optionally owned by a named account.
    EnsureDirs {
        paths: Vec<PathBuf>,
        #[serde(default)]
        owner: Option<String>,
    },
    /// Idempotent external preparation command; exit 0 is success.
    Exec { command: Vec<String> },
}

/// Outcome of a successful start action.
#[derive(Debug)]
pub struct StartedProcess {
    /// Authoritative pid, `None` for marker services with no process.
    pub pid: Option<u32>,
    /// Retained child handle for directly supervised services. Daemons
    /// have none: their launcher child has already been reaped.
    pub handle: Option<ProcessHandle>,
}

/// Poll interval while confirming a signalled daemon has died.
#[cfg(unix)]
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long to wait for a SIGKILLed process to disappear before giving up.
#[cfg(unix)]
const KILL_CONFIRM_WINDOW: Duration = Duration::from_secs(2);

pub async fn run_start(service: &str, action: &StartAction) -> Result<StartedProcess> {
    match action {
        StartAction::Supervised { command } => {
            let mut handle = launcher::launch(service, command, false)?;
            // Catch children that die on their feet (bad arguments, missing
            // state) instead of recording them as running.
            if let Some(status) = handle.try_wait().map_err(|e| DaemonError::ProcessSpawn {
                service: service.to_string(),
                source: e,
            })? {
                return Err(DaemonError::StartFailed {
                    service: service.to_string(),
                    code: status.code(),
                });
            }
            Ok(StartedProcess {
                pid: handle.pid(),
                handle: Some(handle),
            })
        }
        StartAction::Daemon { command, pid_file } => {
            let mut launcher_child = launcher::launch(service, command, true)?;
            let status = launcher_child
                .wait()
                .await
                .map_err(|e| DaemonError::ProcessSpawn {
                    service: service.to_string(),
                    source: e,
                })?;
            let pid = pidfile::resolve_pid(service, pid_file, status).await?;
            info!(service, pid, "daemon published its pid");
            Ok(StartedProcess {
                pid: Some(pid),
                handle: None,
            })
        }
        StartAction::Oneshot { command } => {
            let mut handle = launcher::launch(service, command, false)?;
            let status = handle.wait().await.map_err(|e| DaemonError::ProcessSpawn {
                service: service.to_string(),
                source: e,
            })?;
            if status.success() {
                Ok(StartedProcess {
                    pid: None,
                    handle: None,
                })
            } else {
                Err(DaemonError::StartFailed {
                    service: service.to_string(),
                    code: status.code(),
                })
            }
        }
    }
}

/// Run a stop action. Returns `true` once the service is confirmed
/// stopped; a stop never hangs past its grace window.
pub async fn run_stop(
    service: &str,
    action: &StopAction,
    pid: Option<u32>,
    handle: Option<ProcessHandle>,
) -> Result<bool> {
    match action {
        StopAction::None => Ok(true),
        StopAction::Exec { command } => {
            let mut child = launcher::launch(service, command, false)?;
            let status = child.wait().await.map_err(|e| DaemonError::ProcessSpawn {
                service: service.to_string(),
                source: e,
            })?;
            Ok(status.success())
        }
        StopAction::Signal { grace_secs } => {
            let grace = Duration::from_secs(*grace_secs);
            match handle {
                Some(child) => stop_supervised(service, child, grace).await,
                None => {
                    let pid = pid.ok_or_else(|| DaemonError::NoRecordedPid(service.to_string()))?;
                    stop_daemon(service, pid, grace).await
                }
            }
        }
    }
}

/// Graceful-then-forced termination of a directly supervised child.
async fn stop_supervised(service: &str, mut child: ProcessHandle, grace: Duration) -> Result<bool> {
    if let Some(pid) = child.pid() {
        debug!(service, pid, "sending SIGTERM");
        launcher::terminate(service, pid)?;
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            debug!(service, ?status, "service stopped");
            Ok(true)
        }
        Ok(Err(e)) => Err(DaemonError::ProcessSpawn {
            service: service.to_string(),
            source: e,
        }),
        Err(_) => {
            warn!(service, "did not stop within grace window, force killing");
            child.kill().await.map_err(|e| DaemonError::ProcessSpawn {
                service: service.to_string(),
                source: e,
            })?;
            Ok(true)
        }
    }
}

/// Termination of a detached daemon known only by its published pid.
/// The daemon is not our child, so death is confirmed by probing rather
/// than reaping.
#[cfg(unix)]
async fn stop_daemon(service: &str, pid: u32, grace: Duration) -> Result<bool> {
    use warden_unix::process;

    if !process::process_alive(pid) {
        debug!(service, pid, "daemon already gone");
        return Ok(true);
    }

    debug!(service, pid, "sending SIGTERM");
    if let Err(e) = process::terminate(pid) {
        // Exited between the probe and the signal.
        if process::no_such_process(&e) {
            return Ok(true);
        }
        return Err(DaemonError::StopSignal {
            service: service.to_string(),
            pid,
            source: e,
        });
    }

    let deadline = tokio::time::Instant::now() + grace;
    while tokio::time::Instant::now() < deadline {
        if !process::process_alive(pid) {
            debug!(service, pid, "daemon stopped");
            return Ok(true);
        }
        tokio::time::sleep(STOP_POLL_INTERVAL).await;
    }

    warn!(service, pid, "did not stop within grace window, force killing");
    let _ = process::kill_hard(pid);

    let deadline = tokio::time::Instant::now() + KILL_CONFIRM_WINDOW;
    while tokio::time::Instant::now() < deadline {
        if !process::process_alive(pid) {
            return Ok(true);
        }
        tokio::time::sleep(STOP_POLL_INTERVAL).await;
    }

    Err(DaemonError::StopFailed {
        service: service.to_string(),
    })
}

#[cfg(not(unix))]
async fn stop_daemon(service: &str, _pid: u32, _grace: Duration) -> Result<bool> {
    Err(DaemonError::Internal(format!(
        "cannot stop detached daemon {service} on this platform"
    )))
}

pub async fn run_activate(service: &str, action: &ActivateAction) -> Result<()> {
    match action {
        ActivateAction::EnsureDirs { paths, owner } => {
            for path in paths {
                std::fs::create_dir_all(path).map_err(|e| DaemonError::ActivateFailed {
                    service: service.to_string(),
                    message: format!("creating {}: {}", path.display(), e),
                })?;
                #[cfg(unix)]
                if let Some(owner) = owner {
                    warden_unix::accounts::chown_to_user(path, owner).map_err(|e| {
                        DaemonError::ActivateFailed {
                            service: service.to_string(),
                            message: format!("assigning {} to {}: {}", path.display(), owner, e),
                        }
                    })?;
                }
                #[cfg(not(unix))]
                let _ = owner;
            }
            Ok(())
        }
        ActivateAction::Exec { command } => {
            let mut child = launcher::launch(service, command, false)?;
            let status = child.wait().await.map_err(|e| DaemonError::ProcessSpawn {
                service: service.to_string(),
                source: e,
            })?;
            if status.success() {
                Ok(())
            } else {
                Err(DaemonError::ActivateFailed {
                    service: service.to_string(),
                    message: format!("command exited with code {:?}", status.code()),
                })
            }
        }
    }
}
