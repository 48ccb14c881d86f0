//! Obsolete-deletion and pull-missing against the recording store

use std::time::Duration;

use photobooth_sync::reconcile::{pull_missing, remove_obsolete};
use tokio_util::sync::CancellationToken;

use crate::common::{remote, set_age, Harness};

const GRACE: Duration = Duration::from_secs(300);

#[tokio::test]
async fn test_young_and_old_files_absent_remotely() {
    let h = Harness::new();
    h.store.add_dir("/booth/images");
    let x = h.write_local("images/x.png", b"x");
    let y = h.write_local("images/y.png", b"y");
    set_age(&y, Duration::from_secs(10 * 60));

    let report = remove_obsolete(
        h.store.as_ref(),
        &h.local_path("images"),
        &remote("/booth/images"),
        "empty",
        GRACE,
    )
    .await
    .unwrap();

    assert!(x.exists(), "young file must be kept");
    assert!(!y.exists(), "old file absent remotely must be deleted");
    assert_eq!(report.deleted, vec![y]);
}

#[tokio::test]
async fn test_files_present_remotely_are_kept_at_any_age() {
    let h = Harness::new();
    h.store.add_file("/booth/images/a.png", b"a");
    let a = h.write_local("images/a.png", b"a");
    set_age(&a, Duration::from_secs(30 * 24 * 3600));

    let report = remove_obsolete(
        h.store.as_ref(),
        &h.local_path("images"),
        &remote("/booth/images"),
        "empty",
        GRACE,
    )
    .await
    .unwrap();

    assert!(a.exists());
    assert!(report.deleted.is_empty());
}

#[tokio::test]
async fn test_placeholder_is_never_deleted() {
    let h = Harness::new();
    let placeholder = h.write_local("images/empty", b"");
    set_age(&placeholder, Duration::from_secs(3600));

    remove_obsolete(
        h.store.as_ref(),
        &h.local_path("images"),
        &remote("/booth/images"),
        "empty",
        GRACE,
    )
    .await
    .unwrap();

    assert!(placeholder.exists());
    // The missing remote directory was created on the way
    assert!(h.store.has_dir("/booth/images"));
}

#[tokio::test]
async fn test_obsolete_deletion_fails_when_listing_fails() {
    let h = Harness::new();
    let old = h.write_local("images/old.png", b"old");
    set_age(&old, Duration::from_secs(3600));
    h.store.set_fail_listing(true);

    let result = remove_obsolete(
        h.store.as_ref(),
        &h.local_path("images"),
        &remote("/booth/images"),
        "empty",
        GRACE,
    )
    .await;

    assert!(result.is_err());
    assert!(old.exists(), "nothing may be deleted without a remote listing");
}

#[tokio::test]
async fn test_pull_downloads_absent_file_exactly_once() {
    let h = Harness::new();
    h.store.add_file("/booth/backgrounds/beach.jpg", b"beach");

    for _ in 0..3 {
        pull_missing(
            h.store.as_ref(),
            &h.local_path("backgrounds"),
            &remote("/booth/backgrounds"),
            "empty",
        )
        .await
        .unwrap();
    }

    assert_eq!(h.store.downloads(), vec!["/booth/backgrounds/beach.jpg"]);
    assert_eq!(
        std::fs::read(h.local_path("backgrounds/beach.jpg")).unwrap(),
        b"beach"
    );
}

#[tokio::test]
async fn test_pull_leaves_present_files_untouched() {
    let h = Harness::new();
    h.store.add_file("/booth/backgrounds/beach.jpg", b"remote");
    let local = h.write_local("backgrounds/beach.jpg", b"local");

    let report = pull_missing(
        h.store.as_ref(),
        &h.local_path("backgrounds"),
        &remote("/booth/backgrounds"),
        "empty",
    )
    .await
    .unwrap();

    assert!(report.downloaded.is_empty());
    assert!(h.store.downloads().is_empty());
    assert_eq!(std::fs::read(local).unwrap(), b"local");
}

#[tokio::test]
async fn test_pull_with_missing_remote_dir_creates_it() {
    let h = Harness::new();

    let report = pull_missing(
        h.store.as_ref(),
        &h.local_path("backgrounds"),
        &remote("/booth/backgrounds"),
        "empty",
    )
    .await
    .unwrap();

    assert!(report.downloaded.is_empty());
    assert!(h.store.has_dir("/booth/backgrounds"));
    assert!(h.store.downloads().is_empty());
}

#[tokio::test]
async fn test_pull_continues_after_a_failed_download() {
    let h = Harness::new();
    h.store.add_file("/booth/backgrounds/a.jpg", b"a");
    h.store.add_file("/booth/backgrounds/b.jpg", b"b");
    h.store.fail_downloads("/booth/backgrounds/a.jpg");

    let report = pull_missing(
        h.store.as_ref(),
        &h.local_path("backgrounds"),
        &remote("/booth/backgrounds"),
        "empty",
    )
    .await
    .unwrap();

    assert_eq!(report.downloaded, vec![h.local_path("backgrounds/b.jpg")]);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("a.jpg"));
    assert!(!h.local_path("backgrounds/a.jpg").exists());
}

#[tokio::test]
async fn test_worker_reconcile_covers_both_directories() {
    let h = Harness::new();
    h.store.add_dir("/booth/images");
    h.store.add_file("/booth/backgrounds/new.jpg", b"new");

    let stale_capture = h.write_local("images/stale.png", b"s");
    set_age(&stale_capture, Duration::from_secs(3600));
    let stale_background = h.write_local("backgrounds/old.jpg", b"o");
    set_age(&stale_background, Duration::from_secs(3600));
    let fresh_capture = h.write_local("images/fresh.png", b"f");

    let worker = h.worker(CancellationToken::new());
    let report = worker.reconcile().await;

    assert!(report.completed);
    assert!(report.errors.is_empty(), "errors: {:?}", report.errors);
    assert!(!stale_capture.exists());
    assert!(!stale_background.exists());
    assert!(fresh_capture.exists());
    assert_eq!(report.deleted.len(), 2);
    assert_eq!(report.downloaded, vec![h.local_path("backgrounds/new.jpg")]);
    assert_eq!(std::fs::read(h.local_path("backgrounds/new.jpg")).unwrap(), b"new");
}

#[tokio::test]
async fn test_stop_signal_ends_reconciliation_early() {
    let h = Harness::new();
    h.store.add_file("/booth/backgrounds/new.jpg", b"new");

    let cancel = CancellationToken::new();
    cancel.cancel();
    let worker = h.worker(cancel);
    let report = worker.reconcile().await;

    assert!(!report.completed);
    assert!(h.store.downloads().is_empty());
}
