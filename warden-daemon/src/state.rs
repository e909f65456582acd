use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

/// Lifecycle state of a service.
///
/// `Failed` is sticky: a failed service stays visible for diagnostics and
/// is not restartable until explicitly cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Stopped,
    Activating,
    Starting,
    Running,
    Stopping,
    Failed,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Stopped => "stopped",
            ServiceStatus::Activating => "activating",
            ServiceStatus::Starting => "starting",
            ServiceStatus::Running => "running",
            ServiceStatus::Stopping => "stopping",
            ServiceStatus::Failed => "failed",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ServiceStatus::Running)
    }

    /// Mid-transition states during which a second start/stop request
    /// must be refused.
    pub fn in_transition(&self) -> bool {
        matches!(
            self,
            ServiceStatus::Activating | ServiceStatus::Starting | ServiceStatus::Stopping
        )
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime state of a single service, owned by the supervisor.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceState {
    pub status: ServiceStatus,
    /// Authoritative pid while running; for daemons this is the published
    /// pid, not the long-gone launcher child.
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub restart_count: u32,
    /// Human-readable reason the service is failed or was skipped.
    pub last_error: Option<String>,
}

impl Default for ServiceState {
    fn default() -> Self {
        Self {
            status: ServiceStatus::Stopped,
            pid: None,
            started_at: None,
            exit_code: None,
            restart_count: 0,
            last_error: None,
        }
    }
}

/// One entry of the observable status surface.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub status: ServiceStatus,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub restart_count: u32,
    pub last_error: Option<String>,
}

/// The supervisor's mutable state table.
#[derive(Debug, Default)]
pub struct SupervisorState {
    pub services: HashMap<String, ServiceState>,
    /// Services that reached running, in start order. Shutdown walks this
    /// in reverse.
    pub started_order: Vec<String>,
}

impl SupervisorState {
    pub fn get(&self, name: &str) -> Option<&ServiceState> {
        self.services.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ServiceState> {
        self.services.get_mut(name)
    }
}

/// Shared handle for concurrent status readers. Writers (the supervisor)
/// hold the write lock across a whole transition, so readers always
/// observe a consistent snapshot, never a service mid-transition.
pub type SharedState = Arc<RwLock<SupervisorState>>;

pub fn new_shared_state() -> SharedState {
    Arc::new(RwLock::new(SupervisorState::default()))
}
