use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, Command};
use tracing::debug;

use crate::errors::{DaemonError, Result};

/// A child process created by [`launch`].
///
/// Dropping the handle does not kill the child; daemons launched detached
/// are expected to outlive the supervisor.
pub struct ProcessHandle {
    child: Child,
}

impl ProcessHandle {
    /// The OS pid, `None` once the child has been reaped.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Block (within the supervising task) until the child exits.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Non-blocking exit probe.
    pub fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// SIGKILL the child and reap it.
    pub async fn kill(&mut self) -> std::io::Result<()> {
        self.child.kill().await
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.child.id())
            .finish()
    }
}

/// Spawn one OS process for a service. No retries at this layer; retry
/// policy belongs to the supervisor.
///
/// With `detach` the child starts in its own session with null stdio, so a
/// daemon that forks away from it survives supervisor restarts.
pub fn launch(service: &str, command: &[String], detach: bool) -> Result<ProcessHandle> {
    let program = command
        .first()
        .ok_or_else(|| DaemonError::EmptyCommand(service.to_string()))?;
    let args = &command[1..];

    debug!(service, program = %program, ?args, detach, "launching process");

    let mut cmd = std::process::Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    if detach {
        #[cfg(unix)]
        warden_unix::process::new_session(&mut cmd);
    }

    let child = Command::from(cmd)
        .spawn()
        .map_err(|e| DaemonError::ProcessSpawn {
            service: service.to_string(),
            source: e,
        })?;

    debug!(service, pid = ?child.id(), "process spawned");

    Ok(ProcessHandle { child })
}

/// Deliver SIGTERM to a resolved pid. Used for daemons whose launcher
/// child is long gone and only the published pid remains.
pub fn terminate(service: &str, pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        warden_unix::process::terminate(pid).map_err(|e| DaemonError::StopSignal {
            service: service.to_string(),
            pid,
            source: e,
        })
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        Err(DaemonError::Internal(format!(
            "cannot signal service {service} on this platform"
        )))
    }
}
