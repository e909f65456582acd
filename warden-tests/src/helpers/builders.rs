//! Descriptor builders for integration tests.

use std::path::Path;

use warden_daemon::actions::{StartAction, StopAction};
use warden_daemon::descriptor::ServiceDescriptor;

/// A `sh -c` command vector.
pub fn sh(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

/// A bare descriptor with no dependencies and a trivial oneshot start.
pub fn base_descriptor(name: &str) -> ServiceDescriptor {
    ServiceDescriptor {
        name: name.to_string(),
        provision: Default::default(),
        requirement: Default::default(),
        start: StartAction::Oneshot { command: sh("exit 0") },
        stop: StopAction::None,
        activate: None,
        respawn: false,
        user_accounts: Vec::new(),
        user_groups: Vec::new(),
        documentation: None,
    }
}

/// A oneshot service running `script`, providing `provision` and
/// requiring `requirement`.
pub fn oneshot(
    name: &str,
    script: &str,
    provision: &[&str],
    requirement: &[&str],
) -> ServiceDescriptor {
    ServiceDescriptor {
        provision: provision.iter().map(|s| s.to_string()).collect(),
        requirement: requirement.iter().map(|s| s.to_string()).collect(),
        start: StartAction::Oneshot { command: sh(script) },
        ..base_descriptor(name)
    }
}

/// A directly supervised long-lived service.
pub fn supervised(name: &str, script: &str) -> ServiceDescriptor {
    ServiceDescriptor {
        start: StartAction::Supervised { command: sh(script) },
        stop: StopAction::Signal { grace_secs: 5 },
        ..base_descriptor(name)
    }
}

/// A double-forking daemon: backgrounds a worker, publishes the worker's
/// pid to `pid_file` after `publish_delay_secs`, and exits 0 immediately.
/// Reproduces the readiness race the pid-file synchronizer exists for.
pub fn forking_daemon(name: &str, pid_file: &Path, publish_delay_secs: u32) -> ServiceDescriptor {
    // Publish via rename so the supervisor never observes a half-written
    // file.
    let script = format!(
        "sleep 60 & pid=$!; (sleep {delay}; echo $pid > '{path}.tmp' && mv '{path}.tmp' '{path}') & exit 0",
        delay = publish_delay_secs,
        path = pid_file.display()
    );
    ServiceDescriptor {
        start: StartAction::Daemon {
            command: sh(&script),
            pid_file: pid_file.to_path_buf(),
        },
        stop: StopAction::Signal { grace_secs: 5 },
        ..base_descriptor(name)
    }
}
