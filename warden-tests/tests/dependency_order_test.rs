//! Start sequencing observed through real process side effects.

#![cfg(unix)]

use warden_daemon::descriptor::Registry;
use warden_daemon::state::ServiceStatus;
use warden_daemon::supervisor::Supervisor;
use warden_tests::helpers::builders::oneshot;

fn append_to_log(log: &std::path::Path, name: &str) -> String {
    format!("echo {} >> '{}'", name, log.display())
}

#[tokio::test]
async fn services_run_in_dependency_order_regardless_of_declaration() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("order.log");

    // Declared web-first; the tag chain forces net -> dns -> web.
    let mut registry = Registry::new();
    registry
        .register_all(vec![
            oneshot("web", &append_to_log(&log, "web"), &[], &["name-resolution"]),
            oneshot("dns", &append_to_log(&log, "dns"), &["name-resolution"], &["networking"]),
            oneshot("net", &append_to_log(&log, "net"), &["networking"], &[]),
        ])
        .unwrap();
    let mut supervisor = Supervisor::new(registry);

    let report = supervisor.start_all().await.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.started, vec!["net", "dns", "web"]);

    let observed: Vec<String> = std::fs::read_to_string(&log)
        .unwrap()
        .lines()
        .map(|l| l.to_string())
        .collect();
    assert_eq!(observed, vec!["net", "dns", "web"]);
}

#[tokio::test]
async fn unresolved_branch_is_skipped_while_the_rest_starts() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("order.log");

    let mut registry = Registry::new();
    registry
        .register_all(vec![
            oneshot("orphan", &append_to_log(&log, "orphan"), &[], &["no-such-tag"]),
            oneshot("fine", &append_to_log(&log, "fine"), &[], &[]),
        ])
        .unwrap();
    let mut supervisor = Supervisor::new(registry);

    let report = supervisor.start_all().await.unwrap();
    assert_eq!(report.started, vec!["fine"]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].service, "orphan");

    // The orphan's command never ran.
    let observed = std::fs::read_to_string(&log).unwrap();
    assert_eq!(observed.trim(), "fine");
    assert_eq!(
        supervisor.service_state("orphan").unwrap().status,
        ServiceStatus::Stopped
    );
}
