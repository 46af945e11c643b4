//! Installation lifecycle tests against a scripted container runtime.

mod support;

use hostdeck_common::{Error, InstallStatus};
use std::sync::atomic::Ordering;
use std::time::Duration;
use support::{harness, harness_with_timeout, install, wait_for_status};

#[tokio::test]
async fn install_unknown_app_is_not_found() {
    let h = harness();
    let err = install(&h.manager, "definitely-not-an-app").unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
    assert!(h.manager.list().unwrap().is_empty());
}

#[tokio::test]
async fn install_provisions_to_running() {
    let h = harness();

    let record = install(&h.manager, "redis").unwrap();
    assert_eq!(record.status, InstallStatus::Installing);

    // visible immediately, still installing
    let listed = h.manager.list().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].app_id, "redis");

    let running = wait_for_status(&h.manager, &record.id, InstallStatus::Running).await;
    assert_eq!(running.container_id.as_deref(), Some("ctr-hostdeck-redis"));
    assert!(running.error.is_none());
    assert_eq!(h.runtime.count("create"), 1);
    assert_eq!(h.runtime.count("start"), 1);
}

#[tokio::test]
async fn duplicate_install_is_rejected() {
    let h = harness();

    let first = install(&h.manager, "redis").unwrap();
    let err = install(&h.manager, "redis").unwrap_err();
    assert!(matches!(err, Error::AlreadyInstalled { ref app_id } if app_id == "redis"));

    let listed = h.manager.list().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, first.id);
}

#[tokio::test(flavor = "multi_thread")]
async fn racing_installs_of_same_app_commit_once() {
    let h = harness();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let manager = h.manager.clone();
        tasks.push(tokio::spawn(async move { install(&manager, "grafana") }));
    }

    let mut successes = 0;
    for task in tasks {
        if task.await.unwrap().is_ok() {
            successes += 1;
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(h.manager.list().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_ids_are_not_found_and_store_untouched() {
    let h = harness();
    install(&h.manager, "redis").unwrap();

    assert!(matches!(
        h.manager.start("nope").await.unwrap_err(),
        Error::NotFound { .. }
    ));
    assert!(matches!(
        h.manager.stop("nope").await.unwrap_err(),
        Error::NotFound { .. }
    ));
    assert!(matches!(
        h.manager.uninstall("nope").await.unwrap_err(),
        Error::NotFound { .. }
    ));

    assert_eq!(h.manager.list().unwrap().len(), 1);
}

#[tokio::test]
async fn stop_and_start_toggle_status() {
    let h = harness();
    let record = install(&h.manager, "redis").unwrap();
    wait_for_status(&h.manager, &record.id, InstallStatus::Running).await;

    let stopped = h.manager.stop(&record.id).await.unwrap();
    assert_eq!(stopped.status, InstallStatus::Stopped);
    assert_eq!(h.runtime.count("stop"), 1);

    // stop again: no-op, no second runtime command
    let stopped_again = h.manager.stop(&record.id).await.unwrap();
    assert_eq!(stopped_again.status, InstallStatus::Stopped);
    assert_eq!(h.runtime.count("stop"), 1);

    let started = h.manager.start(&record.id).await.unwrap();
    assert_eq!(started.status, InstallStatus::Running);
    assert_eq!(h.runtime.count("start"), 2);

    // start while running: no-op, call count unchanged
    let started_again = h.manager.start(&record.id).await.unwrap();
    assert_eq!(started_again.status, InstallStatus::Running);
    assert_eq!(h.runtime.count("start"), 2);
}

#[tokio::test]
async fn start_failure_marks_error_and_is_retryable() {
    let h = harness();
    let record = install(&h.manager, "redis").unwrap();
    wait_for_status(&h.manager, &record.id, InstallStatus::Running).await;
    h.manager.stop(&record.id).await.unwrap();

    h.runtime.fail_start.store(true, Ordering::SeqCst);
    let err = h.manager.start(&record.id).await.unwrap_err();
    assert!(matches!(err, Error::Runtime(_)));

    let errored = h
        .manager
        .list()
        .unwrap()
        .into_iter()
        .find(|r| r.id == record.id)
        .unwrap();
    assert_eq!(errored.status, InstallStatus::Error);
    assert!(errored.error.as_deref().unwrap().contains("refused"));

    // the errored record stays visible and start retries out of it
    h.runtime.fail_start.store(false, Ordering::SeqCst);
    let running = h.manager.start(&record.id).await.unwrap();
    assert_eq!(running.status, InstallStatus::Running);
}

#[tokio::test]
async fn failed_provisioning_ends_in_error_status() {
    let h = harness();
    h.runtime.fail_create.store(true, Ordering::SeqCst);

    let record = install(&h.manager, "redis").unwrap();
    let errored = wait_for_status(&h.manager, &record.id, InstallStatus::Error).await;
    assert!(errored.error.as_deref().unwrap().contains("pull failed"));

    // retry path: create succeeds now, record comes up
    h.runtime.fail_create.store(false, Ordering::SeqCst);
    let running = h.manager.start(&record.id).await.unwrap();
    assert_eq!(running.status, InstallStatus::Running);
}

#[tokio::test]
async fn slow_runtime_start_times_out_into_error() {
    let h = harness_with_timeout(Duration::from_millis(50));
    *h.runtime.stall_start.lock() = Some(Duration::from_millis(500));

    let record = install(&h.manager, "redis").unwrap();
    let errored = wait_for_status(&h.manager, &record.id, InstallStatus::Error).await;
    assert!(errored.error.as_deref().unwrap().contains("timed out"));
}

#[tokio::test]
async fn uninstall_removes_record_even_when_teardown_fails() {
    let h = harness();
    let record = install(&h.manager, "redis").unwrap();
    wait_for_status(&h.manager, &record.id, InstallStatus::Running).await;

    h.runtime.fail_remove.store(true, Ordering::SeqCst);
    h.manager.uninstall(&record.id).await.unwrap();

    assert!(h.manager.list().unwrap().is_empty());
    assert_eq!(h.runtime.count("remove"), 1);

    // the app can be installed again afterwards
    install(&h.manager, "redis").unwrap();
}

#[tokio::test]
async fn uninstall_during_provisioning_wins() {
    let h = harness();
    *h.runtime.stall_start.lock() = Some(Duration::from_millis(100));

    let record = install(&h.manager, "redis").unwrap();
    // provisioning either stalls inside the runtime start call (uninstall
    // queues on the per-id lock) or has not taken the lock yet (uninstall
    // deletes the record and provisioning finds it gone)
    h.manager.uninstall(&record.id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(h.manager.list().unwrap().is_empty());
}
