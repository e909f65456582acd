use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Duplicate service name: {0}")]
    DuplicateService(String),

    #[error("Service {0} has an empty command")]
    EmptyCommand(String),

    #[error("Dependency cycle detected involving: {}", services.join(", "))]
    DependencyCycle { services: Vec<String> },

    #[error("Service {service} requires `{tag}`, which no registered service provides")]
    UnresolvedDependency { service: String, tag: String },

    #[error("Cannot start {service}: required capability `{tag}` is not live")]
    RequirementNotLive { service: String, tag: String },

    #[error("Service {0} is already running")]
    AlreadyRunning(String),

    #[error("Service {0} is in the failed state; clear it before starting again")]
    FailedSticky(String),

    #[error("Failed to spawn process for service {service}: {source}")]
    ProcessSpawn {
        service: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Launcher for service {service} exited with code {code:?} before publishing a pid")]
    LaunchFailed { service: String, code: Option<i32> },

    #[error("Failed to read pid file {path} for service {service}: {source}")]
    PidFileRead {
        service: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Pid file {path} for service {service} does not contain a pid: {content:?}")]
    PidFileMalformed {
        service: String,
        path: PathBuf,
        content: String,
    },

    #[error("{service} activate step failed ({message})")]
    ActivateFailed { service: String, message: String },

    #[error("Missing OS user account for service {service}: {account}")]
    AccountMissing { service: String, account: String },

    #[error("Missing OS group for service {service}: {group}")]
    GroupMissing { service: String, group: String },

    #[error("Start action for service {service} reported failure (exit code {code:?})")]
    StartFailed { service: String, code: Option<i32> },

    #[error("Failed to deliver stop signal to service {service} (pid {pid}): {source}")]
    StopSignal {
        service: String,
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Stop action for service {service} reported the service still running")]
    StopFailed { service: String },

    #[error("Service {0} has no recorded pid to signal")]
    NoRecordedPid(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, DaemonError>;
