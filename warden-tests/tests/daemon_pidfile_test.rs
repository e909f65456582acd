//! End-to-end coverage of the double-fork readiness protocol with a real
//! detaching daemon.

#![cfg(unix)]

use std::time::Duration;

use warden_daemon::descriptor::Registry;
use warden_daemon::state::ServiceStatus;
use warden_daemon::supervisor::Supervisor;
use warden_tests::helpers::builders::forking_daemon;
use warden_tests::helpers::wait_utils::wait_for_death;

#[tokio::test]
async fn daemon_pid_is_resolved_from_the_published_file() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("workerd.pid");

    let mut registry = Registry::new();
    registry
        .register(forking_daemon("workerd", &pid_file, 1))
        .unwrap();
    let mut supervisor = Supervisor::new(registry);

    // start_service blocks through the publish race: the launcher child
    // exits immediately, the pid file appears about a second later.
    supervisor.start_service("workerd").await.unwrap();

    let state = supervisor.service_state("workerd").unwrap();
    assert_eq!(state.status, ServiceStatus::Running);

    let published: u32 = std::fs::read_to_string(&pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert_eq!(state.pid, Some(published));
    assert!(warden_unix::process::process_alive(published));

    supervisor.stop_service("workerd").await.unwrap();
    assert!(wait_for_death(published, Duration::from_secs(5)).await);
    assert_eq!(
        supervisor.service_state("workerd").unwrap().status,
        ServiceStatus::Stopped
    );
}

#[tokio::test]
async fn daemon_whose_launcher_fails_never_reaches_running() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("brokend.pid");

    let mut descriptor = forking_daemon("brokend", &pid_file, 1);
    if let warden_daemon::actions::StartAction::Daemon { command, .. } = &mut descriptor.start {
        *command = warden_tests::helpers::builders::sh("exit 1");
    }

    let mut registry = Registry::new();
    registry.register(descriptor).unwrap();
    let mut supervisor = Supervisor::new(registry);

    let err = supervisor.start_service("brokend").await.unwrap_err();
    assert!(matches!(
        err,
        warden_daemon::errors::DaemonError::LaunchFailed { code: Some(1), .. }
    ));
    assert_eq!(
        supervisor.service_state("brokend").unwrap().status,
        ServiceStatus::Failed
    );
    assert!(!pid_file.exists());
}
