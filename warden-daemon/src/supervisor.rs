//! Per-service lifecycle state machine and the sequencing of whole-registry
//! start and stop.
//!
//! One supervising task drives every transition; no two services' actions
//! ever run concurrently. The long blocking points (pid-file polling, child
//! waits) live inside a single service's start and are awaited in place.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::actions;
use crate::deps::{self, SkipReason, SkippedService};
use crate::descriptor::{Registry, ServiceDescriptor};
use crate::errors::{DaemonError, Result};
use crate::launcher::ProcessHandle;
use crate::state::{
    new_shared_state, ServiceInfo, ServiceState, ServiceStatus, SharedState,
};

/// Delay before a respawn re-enters the start path. Allows OS resources
/// (ports, file handles) to be fully released.
const RESPAWN_DELAY: Duration = Duration::from_millis(500);

/// Outcome of a whole-registry start. Partial start state is left as-is;
/// everything that happened is reported and remains queryable.
#[derive(Debug)]
pub struct StartReport {
    pub started: Vec<String>,
    pub failed: Vec<(String, DaemonError)>,
    pub skipped: Vec<SkippedService>,
}

impl StartReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

#[derive(Debug)]
pub struct StopReport {
    pub stopped: Vec<String>,
    pub failed: Vec<(String, DaemonError)>,
}

/// Drives service lifecycles for one registry.
///
/// Owns the runtime state table and the retained child handles. External
/// status readers share the state through [`Supervisor::shared_state`];
/// only the supervisor mutates it.
pub struct Supervisor {
    registry: Registry,
    state: SharedState,
    handles: HashMap<String, ProcessHandle>,
}

impl Supervisor {
    pub fn new(registry: Registry) -> Self {
        let state = new_shared_state();
        {
            let mut table = state.write();
            for descriptor in registry.descriptors() {
                table
                    .services
                    .insert(descriptor.name.clone(), ServiceState::default());
            }
        }
        Self {
            registry,
            state,
            handles: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Cloneable handle for concurrent status queries.
    pub fn shared_state(&self) -> SharedState {
        self.state.clone()
    }

    /// Consistent snapshot of every service, in declaration order.
    pub fn status(&self) -> Vec<ServiceInfo> {
        let table = self.state.read();
        self.registry
            .descriptors()
            .iter()
            .filter_map(|d| {
                table.get(&d.name).map(|s| ServiceInfo {
                    name: d.name.clone(),
                    status: s.status,
                    pid: s.pid,
                    started_at: s.started_at,
                    exit_code: s.exit_code,
                    restart_count: s.restart_count,
                    last_error: s.last_error.clone(),
                })
            })
            .collect()
    }

    pub fn service_state(&self, name: &str) -> Option<ServiceState> {
        self.state.read().get(name).cloned()
    }

    /// Start every startable service in dependency order.
    ///
    /// Structural cycles fail the whole sequence before anything spawns.
    /// Services with unsatisfiable requirements are reported skipped while
    /// independent branches proceed. A failure marks the service failed and
    /// propagates: its requirers are skipped, not started.
    pub async fn start_all(&mut self) -> Result<StartReport> {
        let plan = deps::plan(&self.registry)?;

        let mut report = StartReport {
            started: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
        };

        for skip in &plan.skipped {
            warn!(service = %skip.service, reason = %skip.reason, "service cannot start");
            let mut table = self.state.write();
            if let Some(state) = table.get_mut(&skip.service) {
                state.last_error = Some(skip.reason.to_string());
            }
        }
        report.skipped.extend(plan.skipped.iter().cloned());

        for name in &plan.order {
            // Start is only safe on a stopped service; running services
            // are left alone and failed ones stay sticky.
            let startable = self
                .state
                .read()
                .get(name)
                .map(|s| s.status == ServiceStatus::Stopped)
                .unwrap_or(false);
            if !startable {
                debug!(service = %name, "not in a startable state, leaving as-is");
                continue;
            }

            match self.requirements_live(name) {
                Ok(()) => {}
                Err(reason) => {
                    warn!(service = %name, reason = %reason, "skipping service");
                    {
                        let mut table = self.state.write();
                        if let Some(state) = table.get_mut(name) {
                            state.last_error = Some(reason.to_string());
                        }
                    }
                    report.skipped.push(SkippedService {
                        service: name.clone(),
                        reason,
                    });
                    continue;
                }
            }

            match self.start_service_inner(name).await {
                Ok(()) => report.started.push(name.clone()),
                Err(e) => {
                    error!(service = %name, error = %e, "service failed to start");
                    report.failed.push((name.clone(), e));
                }
            }
        }

        Ok(report)
    }

    /// Start one service. Its requirements must already be live.
    pub async fn start_service(&mut self, name: &str) -> Result<()> {
        let status = self
            .state
            .read()
            .get(name)
            .ok_or_else(|| DaemonError::ServiceNotFound(name.to_string()))?
            .status;

        match status {
            ServiceStatus::Running => return Err(DaemonError::AlreadyRunning(name.to_string())),
            ServiceStatus::Failed => return Err(DaemonError::FailedSticky(name.to_string())),
            s if s.in_transition() => return Err(DaemonError::AlreadyRunning(name.to_string())),
            _ => {}
        }

        if let Err(reason) = self.requirements_live(name) {
            let tag = match &reason {
                SkipReason::UnresolvedRequirement { tag }
                | SkipReason::ProviderUnavailable { tag, .. }
                | SkipReason::ProviderFailed { tag, .. } => tag.clone(),
            };
            return Err(DaemonError::RequirementNotLive {
                service: name.to_string(),
                tag,
            });
        }

        self.start_service_inner(name).await
    }

    /// The stopped → activating → starting → running path. Any failure
    /// lands the service in the sticky failed state.
    ///
    /// The state machine, not the start action, guarantees a start only
    /// happens on a stopped service.
    async fn start_service_inner(&mut self, name: &str) -> Result<()> {
        let descriptor = self
            .registry
            .get(name)
            .ok_or_else(|| DaemonError::ServiceNotFound(name.to_string()))?
            .clone();

        match self.state.read().get(name).map(|s| s.status) {
            Some(ServiceStatus::Stopped) => {}
            Some(ServiceStatus::Failed) => {
                return Err(DaemonError::FailedSticky(name.to_string()));
            }
            _ => return Err(DaemonError::AlreadyRunning(name.to_string())),
        }

        if let Err(e) = self.activate(&descriptor).await {
            self.mark_failed(name, &e);
            return Err(e);
        }

        self.set_status(name, ServiceStatus::Starting);
        info!(service = %name, "starting");

        let started = match actions::run_start(name, &descriptor.start).await {
            Ok(started) => started,
            Err(e) => {
                self.mark_failed(name, &e);
                return Err(e);
            }
        };

        {
            let mut table = self.state.write();
            if let Some(state) = table.get_mut(name) {
                state.status = ServiceStatus::Running;
                state.pid = started.pid;
                state.started_at = Some(Utc::now());
                state.exit_code = None;
                state.last_error = None;
            }
            if !table.started_order.iter().any(|n| n == name) {
                table.started_order.push(name.to_string());
            }
        }
        if let Some(handle) = started.handle {
            self.handles.insert(name.to_string(), handle);
        }

        info!(service = %name, pid = ?started.pid, "running");
        Ok(())
    }

    /// The activating phase: principal preflight plus the descriptor's
    /// activate action, when present.
    async fn activate(&mut self, descriptor: &ServiceDescriptor) -> Result<()> {
        let name = descriptor.name.as_str();

        if descriptor.activate.is_none()
            && descriptor.user_accounts.is_empty()
            && descriptor.user_groups.is_empty()
        {
            return Ok(());
        }

        self.set_status(name, ServiceStatus::Activating);
        debug!(service = %name, "activating");

        #[cfg(unix)]
        {
            for account in &descriptor.user_accounts {
                if !warden_unix::accounts::user_exists(account) {
                    return Err(DaemonError::AccountMissing {
                        service: name.to_string(),
                        account: account.clone(),
                    });
                }
            }
            for group in &descriptor.user_groups {
                if !warden_unix::accounts::group_exists(group) {
                    return Err(DaemonError::GroupMissing {
                        service: name.to_string(),
                        group: group.clone(),
                    });
                }
            }
        }

        if let Some(action) = &descriptor.activate {
            actions::run_activate(name, action).await?;
        }

        Ok(())
    }

    /// Stop every running service, in the exact reverse of start order.
    pub async fn stop_all(&mut self) -> StopReport {
        let mut order: Vec<String> = self.state.read().started_order.clone();
        order.reverse();

        let mut report = StopReport {
            stopped: Vec::new(),
            failed: Vec::new(),
        };

        for name in order {
            let running = self
                .state
                .read()
                .get(&name)
                .map(|s| s.status.is_running())
                .unwrap_or(false);
            if !running {
                continue;
            }
            match self.stop_service(&name).await {
                Ok(()) => report.stopped.push(name),
                Err(e) => {
                    error!(service = %name, error = %e, "service failed to stop");
                    report.failed.push((name, e));
                }
            }
        }

        report
    }

    /// The running → stopping → stopped path. A stop action that errors or
    /// reports the service still running lands it in failed.
    pub async fn stop_service(&mut self, name: &str) -> Result<()> {
        let descriptor = self
            .registry
            .get(name)
            .ok_or_else(|| DaemonError::ServiceNotFound(name.to_string()))?
            .clone();

        let (status, pid) = {
            let table = self.state.read();
            let state = table
                .get(name)
                .ok_or_else(|| DaemonError::ServiceNotFound(name.to_string()))?;
            (state.status, state.pid)
        };

        if !status.is_running() {
            debug!(service = %name, status = %status, "stop requested but not running");
            return Ok(());
        }

        self.set_status(name, ServiceStatus::Stopping);
        info!(service = %name, "stopping");

        let handle = self.handles.remove(name);

        match actions::run_stop(name, &descriptor.stop, pid, handle).await {
            Ok(true) => {
                let mut table = self.state.write();
                if let Some(state) = table.get_mut(name) {
                    state.status = ServiceStatus::Stopped;
                    state.pid = None;
                    state.started_at = None;
                }
                table.started_order.retain(|n| n != name);
                info!(service = %name, "stopped");
                Ok(())
            }
            Ok(false) => {
                let e = DaemonError::StopFailed {
                    service: name.to_string(),
                };
                self.mark_failed(name, &e);
                Err(e)
            }
            Err(e) => {
                self.mark_failed(name, &e);
                Err(e)
            }
        }
    }

    /// Entry point for the external process monitor: a running service's
    /// process died. Respawn services re-enter the start path; everything
    /// else lands in stopped (clean exit) or failed.
    pub async fn notify_exit(&mut self, name: &str, exit_code: Option<i32>) -> Result<()> {
        let descriptor = self
            .registry
            .get(name)
            .ok_or_else(|| DaemonError::ServiceNotFound(name.to_string()))?
            .clone();

        let was_running = {
            let mut table = self.state.write();
            let state = table
                .get_mut(name)
                .ok_or_else(|| DaemonError::ServiceNotFound(name.to_string()))?;
            let was_running = state.status.is_running();
            if was_running {
                state.pid = None;
                state.exit_code = exit_code;
                table.started_order.retain(|n| n != name);
            }
            was_running
        };
        self.handles.remove(name);

        if !was_running {
            debug!(service = %name, "exit notification for a service not running, ignoring");
            return Ok(());
        }

        if descriptor.respawn {
            info!(service = %name, ?exit_code, "respawning");
            {
                let mut table = self.state.write();
                if let Some(state) = table.get_mut(name) {
                    state.status = ServiceStatus::Stopped;
                    state.restart_count += 1;
                }
            }
            tokio::time::sleep(RESPAWN_DELAY).await;
            return self.start_service_inner(name).await;
        }

        let mut table = self.state.write();
        if let Some(state) = table.get_mut(name) {
            state.status = if exit_code == Some(0) {
                ServiceStatus::Stopped
            } else {
                ServiceStatus::Failed
            };
            if state.status == ServiceStatus::Failed {
                state.last_error = Some(format!("exited unexpectedly with code {:?}", exit_code));
            }
        }
        Ok(())
    }

    /// Return a failed service to stopped so it may be started again.
    pub fn clear_failed(&mut self, name: &str) -> Result<()> {
        let mut table = self.state.write();
        let state = table
            .get_mut(name)
            .ok_or_else(|| DaemonError::ServiceNotFound(name.to_string()))?;
        if state.status == ServiceStatus::Failed {
            *state = ServiceState {
                restart_count: state.restart_count,
                ..ServiceState::default()
            };
            info!(service = %name, "failed state cleared");
        }
        Ok(())
    }

    /// Check every requirement of `name` is live right now. Bootstrap tags
    /// are always satisfied; otherwise at least one provider must be
    /// running.
    fn requirements_live(&self, name: &str) -> std::result::Result<(), SkipReason> {
        let Some(descriptor) = self.registry.get(name) else {
            return Ok(());
        };
        let table = self.state.read();
        for tag in &descriptor.requirement {
            if self.registry.is_bootstrap(tag) {
                continue;
            }
            let providers: Vec<&str> = self
                .registry
                .providers_of(tag)
                .into_iter()
                .filter(|p| *p != name)
                .collect();
            if providers.is_empty() {
                return Err(SkipReason::UnresolvedRequirement { tag: tag.clone() });
            }
            let live = providers
                .iter()
                .any(|p| table.get(p).map(|s| s.status.is_running()).unwrap_or(false));
            if !live {
                // Blame the first provider that failed, or the first one
                // otherwise.
                let blamed = providers
                    .iter()
                    .find(|p| {
                        table
                            .get(**p)
                            .map(|s| s.status == ServiceStatus::Failed)
                            .unwrap_or(false)
                    })
                    .unwrap_or(&providers[0]);
                return Err(SkipReason::ProviderFailed {
                    tag: tag.clone(),
                    provider: blamed.to_string(),
                });
            }
        }
        Ok(())
    }

    fn set_status(&self, name: &str, status: ServiceStatus) {
        let mut table = self.state.write();
        if let Some(state) = table.get_mut(name) {
            state.status = status;
        }
    }

    fn mark_failed(&self, name: &str, error: &DaemonError) {
        let mut table = self.state.write();
        if let Some(state) = table.get_mut(name) {
            state.status = ServiceStatus::Failed;
            state.pid = None;
            state.last_error = Some(error.to_string());
        }
    }
}

#[cfg(test)]
mod tests;
