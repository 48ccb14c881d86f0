//! Sync worker behavior against the recording store

use std::time::Duration;

use photobooth_sync::worker::WorkerState;
use tokio_util::sync::CancellationToken;

use crate::common::{push, remote_of, Harness, UploadAttempt};

#[tokio::test]
async fn test_drain_pushes_in_order_and_empties_queue() {
    let h = Harness::new();
    let names = ["images/1.png", "images/2.png", "images/3.png", "backgrounds/x.jpg"];
    for name in names {
        h.capture(name);
    }

    let worker = h.worker(CancellationToken::new());
    let report = worker.drain().await;

    assert_eq!(report.pushed, 4);
    assert_eq!(report.failed_attempts, 0);
    let expected: Vec<UploadAttempt> = names.iter().map(|n| UploadAttempt::ok(&remote_of(n))).collect();
    assert_eq!(h.store.uploads(), expected);
    assert_eq!(std::fs::read_to_string(h.queue.path()).unwrap(), "");

    for name in names {
        assert_eq!(h.store.file(&remote_of(name)).unwrap(), name.as_bytes());
    }
}

#[tokio::test]
async fn test_push_creates_missing_remote_directories() {
    let h = Harness::new();
    h.capture("images/a.png");

    let worker = h.worker(CancellationToken::new());
    worker.drain().await;

    assert!(h.store.has_dir("/booth"));
    assert!(h.store.has_dir("/booth/images"));
    assert!(h.store.file("/booth/images/a.png").is_some());
}

#[tokio::test]
async fn test_failed_push_is_retried_before_anything_else() {
    let h = Harness::new();
    h.capture("images/a.png");
    h.capture("images/b.png");
    h.store.fail_uploads(&remote_of("images/a.png"), 1);

    let worker = h.worker(CancellationToken::new());
    let report = worker.drain().await;

    let a = remote_of("images/a.png");
    let b = remote_of("images/b.png");
    assert_eq!(
        h.store.uploads(),
        vec![
            UploadAttempt::failed(&a),
            UploadAttempt::ok(&a),
            UploadAttempt::ok(&b),
        ]
    );
    assert_eq!(report.pushed, 2);
    assert_eq!(report.failed_attempts, 1);
    assert!(report.last_error.unwrap().contains("images/a.png"));
    assert!(h.queue.is_empty().unwrap());
}

#[tokio::test]
async fn test_head_stays_through_repeated_failures() {
    let h = Harness::new();
    h.capture("images/a.png");
    h.capture("images/b.png");
    h.store.fail_uploads(&remote_of("images/a.png"), 4);

    let worker = h.worker(CancellationToken::new());
    worker.drain().await;

    let uploads = h.store.uploads();
    assert_eq!(uploads.len(), 6);
    assert!(uploads[..4]
        .iter()
        .all(|u| *u == UploadAttempt::failed(&remote_of("images/a.png"))));
    assert_eq!(uploads[4], UploadAttempt::ok(&remote_of("images/a.png")));
    assert_eq!(uploads[5], UploadAttempt::ok(&remote_of("images/b.png")));
}

#[tokio::test]
async fn test_stop_signal_during_retry_wait() {
    let h = Harness::new();
    h.capture("images/a.png");
    h.capture("images/b.png");
    h.store.fail_uploads_forever(&remote_of("images/a.png"));

    let mut settings = h.settings();
    settings.retry_interval = Duration::from_secs(3600);
    let cancel = CancellationToken::new();
    let worker = h.worker_with(settings, cancel.clone());
    let mut state = worker.subscribe();

    let handle = tokio::spawn(async move { worker.run().await });

    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == WorkerState::IdleWait),
    )
    .await
    .expect("worker should enter the retry wait")
    .unwrap();

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker should stop promptly")
        .unwrap();

    assert_eq!(*state.borrow(), WorkerState::Stopped);
    assert_eq!(
        h.store.uploads(),
        vec![UploadAttempt::failed(&remote_of("images/a.png"))]
    );
    assert_eq!(
        h.queue.pending().unwrap(),
        vec![push("images/a.png"), push("images/b.png")]
    );
}

#[tokio::test]
async fn test_bounded_cycle_gives_up_on_a_failing_head() {
    let h = Harness::new();
    h.capture("images/a.png");
    h.capture("images/b.png");
    h.store.fail_uploads_forever(&remote_of("images/a.png"));

    let mut settings = h.settings();
    settings.max_attempts = Some(2);
    let worker = h.worker_with(settings, CancellationToken::new());

    let report = tokio::time::timeout(Duration::from_secs(5), worker.run_cycle())
        .await
        .expect("a bounded cycle should finish");

    assert!(report.drain.gave_up);
    assert_eq!(report.drain.failed_attempts, 2);
    assert!(report.reconcile.is_none());
    assert!(!report.stopped());
    assert_eq!(
        h.store.uploads(),
        vec![
            UploadAttempt::failed(&remote_of("images/a.png")),
            UploadAttempt::failed(&remote_of("images/a.png")),
        ]
    );
    assert_eq!(
        h.queue.pending().unwrap(),
        vec![push("images/a.png"), push("images/b.png")]
    );
}

#[tokio::test]
async fn test_missing_remote_root_blocks_push_and_reconcile() {
    let h = Harness::without_remote_root();
    h.capture("images/a.png");

    let mut settings = h.settings();
    settings.max_attempts = Some(1);
    let worker = h.worker_with(settings, CancellationToken::new());

    let drain = worker.drain().await;
    assert!(drain.gave_up);
    assert!(h.store.uploads().is_empty());

    let report = worker.reconcile().await;
    assert_eq!(report.errors.len(), 3);
    assert!(report.deleted.is_empty());
    assert!(h.local_path("images/a.png").exists());
    assert!(!h.store.has_dir("/booth"));
}

#[tokio::test]
async fn test_run_picks_up_operations_enqueued_while_running() {
    let h = Harness::new();
    let cancel = CancellationToken::new();
    let worker = h.worker(cancel.clone());
    let handle = tokio::spawn(async move { worker.run().await });

    for i in 0..5 {
        h.capture(&format!("images/{i}.png"));
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while h.store.uploads().len() < 5 {
        assert!(tokio::time::Instant::now() < deadline, "uploads did not complete");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker should stop promptly")
        .unwrap();

    let uploaded: Vec<String> = h.store.uploads().into_iter().map(|u| u.path).collect();
    let expected: Vec<String> = (0..5).map(|i| remote_of(&format!("images/{i}.png"))).collect();
    assert_eq!(uploaded, expected);
    assert!(h.queue.is_empty().unwrap());
}

#[tokio::test]
async fn test_operation_for_deleted_file_is_dropped() {
    let h = Harness::new();
    let gone = h.capture("images/gone.png");
    h.capture("images/kept.png");
    std::fs::remove_file(gone).unwrap();

    let worker = h.worker(CancellationToken::new());
    let report = worker.drain().await;

    assert_eq!(report.skipped, 1);
    assert_eq!(report.pushed, 1);
    assert_eq!(
        h.store.uploads(),
        vec![UploadAttempt::ok(&remote_of("images/kept.png"))]
    );
}

#[tokio::test]
async fn test_malformed_line_does_not_block_the_queue() {
    let h = Harness::new();
    h.write_local("images/a.png", b"a");
    std::fs::write(h.queue.path(), "upload;images/a.png\npush;images/a.png\n").unwrap();

    let worker = h.worker(CancellationToken::new());
    let report = worker.drain().await;

    assert_eq!(report.rejected, 1);
    assert_eq!(report.pushed, 1);
    assert_eq!(
        std::fs::read_to_string(h.queue.rejected_path()).unwrap(),
        "upload;images/a.png\n"
    );
}

#[tokio::test]
async fn test_reconciliation_failures_do_not_abort_the_cycle() {
    let h = Harness::new();
    h.store.set_fail_listing(true);

    let worker = h.worker(CancellationToken::new());
    let report = worker.run_cycle().await;
    assert!(!report.stopped());

    let reconcile = report.reconcile.expect("reconciliation ran");
    assert!(reconcile.completed);
    assert_eq!(reconcile.errors.len(), 3);

    // The next cycle still drains normally
    h.store.set_fail_listing(false);
    h.capture("images/a.png");
    let report = worker.run_cycle().await;
    assert_eq!(report.drain.pushed, 1);
    assert!(report.reconcile.unwrap().errors.is_empty());
}

#[tokio::test]
async fn test_state_transitions_during_a_cycle() {
    let h = Harness::new();
    h.capture("images/a.png");
    h.store.fail_uploads(&remote_of("images/a.png"), 1);

    let worker = h.worker(CancellationToken::new());
    let mut rx = worker.subscribe();
    let seen = tokio::spawn(async move {
        let mut seen = vec![*rx.borrow_and_update()];
        while rx.changed().await.is_ok() {
            seen.push(*rx.borrow_and_update());
        }
        seen
    });

    worker.run_cycle().await;
    drop(worker);

    let seen = seen.await.unwrap();
    assert_eq!(seen.first(), Some(&WorkerState::Draining));
    assert!(seen.contains(&WorkerState::IdleWait));
    assert_eq!(seen.last(), Some(&WorkerState::Reconciling));
    assert!(!seen.contains(&WorkerState::Stopped));
}
