use super::*;
use crate::actions::{ActivateAction, StartAction, StopAction};
use crate::state::ServiceStatus;

fn sh(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

fn marker(name: &str, provision: &[&str], requirement: &[&str]) -> ServiceDescriptor {
    ServiceDescriptor {
        name: name.to_string(),
        provision: provision.iter().map(|s| s.to_string()).collect(),
        requirement: requirement.iter().map(|s| s.to_string()).collect(),
        start: StartAction::Oneshot { command: sh("exit 0") },
        stop: StopAction::None,
        activate: None,
        respawn: false,
        user_accounts: Vec::new(),
        user_groups: Vec::new(),
        documentation: None,
    }
}

fn sleeper(name: &str, provision: &[&str], requirement: &[&str]) -> ServiceDescriptor {
    ServiceDescriptor {
        start: StartAction::Supervised { command: sh("sleep 30") },
        stop: StopAction::Signal { grace_secs: 5 },
        ..marker(name, provision, requirement)
    }
}

fn supervisor(descriptors: Vec<ServiceDescriptor>) -> Supervisor {
    let mut registry = Registry::new();
    registry.register_all(descriptors).unwrap();
    Supervisor::new(registry)
}

fn status_of(supervisor: &Supervisor, name: &str) -> ServiceStatus {
    supervisor.service_state(name).unwrap().status
}

#[tokio::test]
async fn chain_starts_in_dependency_order() {
    let mut supervisor = supervisor(vec![
        marker("web", &[], &["db"]),
        marker("db", &["db"], &[]),
    ]);

    let report = supervisor.start_all().await.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.started, vec!["db", "web"]);
    assert_eq!(status_of(&supervisor, "db"), ServiceStatus::Running);
    assert_eq!(status_of(&supervisor, "web"), ServiceStatus::Running);
}

#[tokio::test]
async fn activate_failure_fails_the_service_and_skips_requirers() {
    let mut base = marker("base", &["storage"], &[]);
    base.activate = Some(ActivateAction::Exec { command: sh("exit 1") });

    let mut supervisor = supervisor(vec![base, marker("db", &[], &["storage"])]);

    let report = supervisor.start_all().await.unwrap();
    assert!(report.started.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "base");
    assert!(matches!(
        report.failed[0].1,
        DaemonError::ActivateFailed { .. }
    ));
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].service, "db");
    assert_eq!(
        report.skipped[0].reason,
        SkipReason::ProviderFailed {
            tag: "storage".to_string(),
            provider: "base".to_string()
        }
    );

    // The failed provider is diagnosable; the requirer never left stopped.
    assert_eq!(status_of(&supervisor, "base"), ServiceStatus::Failed);
    assert_eq!(status_of(&supervisor, "db"), ServiceStatus::Stopped);
    assert!(supervisor.service_state("base").unwrap().last_error.is_some());
}

#[tokio::test]
async fn running_service_stops_cleanly_and_reports_not_running() {
    let mut supervisor = supervisor(vec![sleeper("sleeper", &[], &[])]);

    supervisor.start_service("sleeper").await.unwrap();
    let running = supervisor.service_state("sleeper").unwrap();
    assert_eq!(running.status, ServiceStatus::Running);
    assert!(running.pid.is_some());
    assert!(running.started_at.is_some());

    supervisor.stop_service("sleeper").await.unwrap();
    let stopped = supervisor.service_state("sleeper").unwrap();
    assert_eq!(stopped.status, ServiceStatus::Stopped);
    assert_eq!(stopped.pid, None);
    assert!(!stopped.status.is_running());
}

#[tokio::test]
async fn stop_all_walks_the_reverse_of_start_order() {
    let mut supervisor = supervisor(vec![
        sleeper("net", &["networking"], &[]),
        sleeper("sshd", &[], &["networking"]),
    ]);

    let report = supervisor.start_all().await.unwrap();
    assert_eq!(report.started, vec!["net", "sshd"]);

    let stop = supervisor.stop_all().await;
    assert!(stop.failed.is_empty());
    assert_eq!(stop.stopped, vec!["sshd", "net"]);
    assert_eq!(status_of(&supervisor, "net"), ServiceStatus::Stopped);
    assert_eq!(status_of(&supervisor, "sshd"), ServiceStatus::Stopped);
}

#[tokio::test]
async fn failed_is_sticky_until_explicitly_cleared() {
    let mut broken = marker("broken", &[], &[]);
    broken.start = StartAction::Oneshot { command: sh("exit 9") };
    let mut supervisor = supervisor(vec![broken]);

    let err = supervisor.start_service("broken").await.unwrap_err();
    assert!(matches!(err, DaemonError::StartFailed { code: Some(9), .. }));
    assert_eq!(status_of(&supervisor, "broken"), ServiceStatus::Failed);

    let err = supervisor.start_service("broken").await.unwrap_err();
    assert!(matches!(err, DaemonError::FailedSticky(_)));

    supervisor.clear_failed("broken").unwrap();
    assert_eq!(status_of(&supervisor, "broken"), ServiceStatus::Stopped);

    // The start path is reachable again; it fails on its own merits now.
    let err = supervisor.start_service("broken").await.unwrap_err();
    assert!(matches!(err, DaemonError::StartFailed { .. }));
}

#[tokio::test]
async fn starting_a_running_service_is_refused() {
    let mut supervisor = supervisor(vec![marker("markerd", &[], &[])]);
    supervisor.start_service("markerd").await.unwrap();

    let err = supervisor.start_service("markerd").await.unwrap_err();
    assert!(matches!(err, DaemonError::AlreadyRunning(_)));
}

#[tokio::test]
async fn cycle_aborts_the_whole_sequence_before_anything_spawns() {
    let mut supervisor = supervisor(vec![
        marker("a", &["ta"], &["tb"]),
        marker("b", &["tb"], &["ta"]),
    ]);

    let err = supervisor.start_all().await.unwrap_err();
    assert!(matches!(err, DaemonError::DependencyCycle { .. }));
    assert_eq!(status_of(&supervisor, "a"), ServiceStatus::Stopped);
    assert_eq!(status_of(&supervisor, "b"), ServiceStatus::Stopped);
}

#[tokio::test]
async fn requirement_must_be_live_for_a_single_service_start() {
    let mut supervisor = supervisor(vec![
        sleeper("db", &["db"], &[]),
        marker("web", &[], &["db"]),
    ]);

    let err = supervisor.start_service("web").await.unwrap_err();
    assert!(matches!(
        err,
        DaemonError::RequirementNotLive { ref tag, .. } if tag == "db"
    ));

    supervisor.start_service("db").await.unwrap();
    supervisor.start_service("web").await.unwrap();
    supervisor.stop_all().await;
}

#[tokio::test]
async fn respawn_service_reenters_the_start_path_on_unexpected_exit() {
    let mut daemon = sleeper("flaky", &[], &[]);
    daemon.respawn = true;
    let mut supervisor = supervisor(vec![daemon]);

    supervisor.start_service("flaky").await.unwrap();
    let first_pid = supervisor.service_state("flaky").unwrap().pid.unwrap();

    // Play the external process monitor: kill it, then report the death.
    #[cfg(unix)]
    warden_unix::process::kill_hard(first_pid).unwrap();
    supervisor.notify_exit("flaky", Some(137)).await.unwrap();

    let state = supervisor.service_state("flaky").unwrap();
    assert_eq!(state.status, ServiceStatus::Running);
    assert_eq!(state.restart_count, 1);
    assert_ne!(state.pid.unwrap(), first_pid);

    supervisor.stop_service("flaky").await.unwrap();
}

#[tokio::test]
async fn unexpected_exit_without_respawn_is_failed_or_stopped_by_exit_code() {
    let mut supervisor = supervisor(vec![
        sleeper("crashy", &[], &[]),
        sleeper("tidy", &[], &[]),
    ]);
    supervisor.start_all().await.unwrap();

    let crashy_pid = supervisor.service_state("crashy").unwrap().pid.unwrap();
    let tidy_pid = supervisor.service_state("tidy").unwrap().pid.unwrap();
    #[cfg(unix)]
    {
        warden_unix::process::kill_hard(crashy_pid).unwrap();
        warden_unix::process::kill_hard(tidy_pid).unwrap();
    }

    supervisor.notify_exit("crashy", Some(1)).await.unwrap();
    supervisor.notify_exit("tidy", Some(0)).await.unwrap();

    let crashy = supervisor.service_state("crashy").unwrap();
    assert_eq!(crashy.status, ServiceStatus::Failed);
    assert!(crashy.last_error.is_some());
    assert_eq!(status_of(&supervisor, "tidy"), ServiceStatus::Stopped);
}

#[tokio::test]
async fn unknown_service_is_reported_by_name() {
    let mut supervisor = supervisor(vec![marker("real", &[], &[])]);
    let err = supervisor.start_service("imaginary").await.unwrap_err();
    assert!(matches!(err, DaemonError::ServiceNotFound(name) if name == "imaginary"));
}

#[tokio::test]
#[cfg(unix)]
async fn missing_os_account_fails_activation() {
    let mut svc = marker("account-bound", &[], &[]);
    svc.user_accounts = vec!["warden-no-such-user".to_string()];
    let mut supervisor = supervisor(vec![svc]);

    let err = supervisor.start_service("account-bound").await.unwrap_err();
    match err {
        DaemonError::AccountMissing { service, account } => {
            assert_eq!(service, "account-bound");
            assert_eq!(account, "warden-no-such-user");
        }
        other => panic!("expected AccountMissing, got {:?}", other),
    }
    assert_eq!(status_of(&supervisor, "account-bound"), ServiceStatus::Failed);
}

#[tokio::test]
async fn status_snapshot_lists_every_service_in_declaration_order() {
    let mut supervisor = supervisor(vec![
        marker("zebra", &[], &[]),
        marker("alpha", &[], &[]),
    ]);
    supervisor.start_all().await.unwrap();

    let snapshot = supervisor.status();
    let names: Vec<&str> = snapshot.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["zebra", "alpha"]);
    assert!(snapshot.iter().all(|i| i.status == ServiceStatus::Running));
}
