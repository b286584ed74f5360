use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use docqa_core::Error;
use docqa_rag::{DocumentLocks, ResourceLifecycle};

fn lifecycle(tmp: &TempDir) -> ResourceLifecycle {
    ResourceLifecycle::new(tmp.path().join("indexes"), tmp.path().join("uploads"))
}

fn fake_index(lc: &ResourceLifecycle, id: &str) {
    let dir = lc.index_path(id).join("chunks.lance").join("data");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("part-0.lance"), b"rows").unwrap();
    fs::write(lc.index_path(id).join("top.bin"), b"x").unwrap();
}

#[test]
fn store_upload_keeps_only_the_file_name() {
    let tmp = TempDir::new().unwrap();
    let lc = lifecycle(&tmp);
    let path = lc.store_upload("doc1", "../../etc/report.pdf", b"%PDF").unwrap();
    assert_eq!(path, tmp.path().join("uploads").join("doc1").join("report.pdf"));
    assert_eq!(fs::read(&path).unwrap(), b"%PDF");
    assert_eq!(lc.upload_path("doc1", "report.pdf").unwrap(), path);
}

#[test]
fn cleanup_removes_index_and_upload() {
    let tmp = TempDir::new().unwrap();
    let lc = lifecycle(&tmp);
    fake_index(&lc, "doc1");
    lc.store_upload("doc1", "a.pdf", b"data").unwrap();

    let report = lc.cleanup("doc1").unwrap();
    assert!(report.is_complete());
    assert_eq!(report.removed.len(), 2);
    assert!(report.missing.is_empty());
    assert!(!lc.index_path("doc1").exists());
    assert!(!lc.upload_dir("doc1").exists());
    assert!(tmp.path().join("indexes").exists(), "roots are kept");
}

#[test]
fn cleanup_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let lc = lifecycle(&tmp);
    fake_index(&lc, "doc1");
    assert!(lc.cleanup("doc1").unwrap().is_complete());

    let second = lc.cleanup("doc1").unwrap();
    assert!(second.is_complete());
    assert!(second.removed.is_empty());
    assert_eq!(second.missing.len(), 2);
}

#[test]
fn cleanup_tolerates_partial_absence() {
    let tmp = TempDir::new().unwrap();
    let lc = lifecycle(&tmp);
    lc.store_upload("doc2", "only-upload.txt", b"hi").unwrap();

    let report = lc.cleanup("doc2").unwrap();
    assert!(report.is_complete());
    assert_eq!(report.removed, vec![lc.upload_dir("doc2")]);
    assert_eq!(report.missing, vec![lc.index_path("doc2")]);
}

#[test]
fn cleanup_leaves_other_documents_alone() {
    let tmp = TempDir::new().unwrap();
    let lc = lifecycle(&tmp);
    fake_index(&lc, "keep");
    fake_index(&lc, "drop");
    lc.cleanup("drop").unwrap();
    assert!(lc.index_path("keep").join("top.bin").exists());
}

#[cfg(unix)]
#[test]
fn read_only_entries_are_removed() {
    use std::os::unix::fs::PermissionsExt;
    let tmp = TempDir::new().unwrap();
    let lc = lifecycle(&tmp);
    fake_index(&lc, "ro");
    let file = lc.index_path("ro").join("top.bin");
    fs::set_permissions(&file, fs::Permissions::from_mode(0o444)).unwrap();
    let dir = lc.index_path("ro").join("chunks.lance");
    fs::set_permissions(&dir, fs::Permissions::from_mode(0o555)).unwrap();

    let report = lc.cleanup("ro").unwrap();
    assert!(report.is_complete(), "failures: {:?}", report.failed);
    assert!(!lc.index_path("ro").exists());
}

#[test]
fn unsafe_ids_are_rejected() {
    let tmp = TempDir::new().unwrap();
    let lc = lifecycle(&tmp);
    for id in ["", "..", "a/b", ".staging-x"] {
        assert!(matches!(lc.cleanup(id), Err(Error::InvalidDocumentId(_))));
        assert!(matches!(lc.store_upload(id, "f.pdf", b""), Err(Error::InvalidDocumentId(_))));
    }
    assert!(tmp.path().join("indexes").read_dir().is_err(), "nothing was created");
}

#[tokio::test]
async fn same_id_is_serialized_other_ids_are_not() {
    let locks = Arc::new(DocumentLocks::new());
    let held = locks.lock("doc").await;

    let blocked = tokio::time::timeout(Duration::from_millis(50), locks.lock("doc")).await;
    assert!(blocked.is_err(), "second lock on the same id must wait");

    let other = tokio::time::timeout(Duration::from_millis(50), locks.lock("other")).await;
    assert!(other.is_ok(), "a different id is independent");
    drop(other);

    let waiter = {
        let locks = locks.clone();
        tokio::spawn(async move {
            let _g = locks.lock("doc").await;
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!waiter.is_finished());
    drop(held);
    waiter.await.unwrap();
}

#[tokio::test]
async fn idle_lock_entries_are_pruned() {
    let locks = DocumentLocks::new();
    for i in 0..10 {
        let _g = locks.lock(&format!("doc-{i}")).await;
    }
    let _last = locks.lock("final").await;
    assert_eq!(locks.tracked(), 1);
}

#[cfg(unix)]
#[test]
fn upload_is_removed_even_when_index_removal_fails() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = TempDir::new().unwrap();
    let lc = lifecycle(&tmp);
    fake_index(&lc, "stuck");
    lc.store_upload("stuck", "a.pdf", b"data").unwrap();

    let index_root = tmp.path().join("indexes");
    fs::set_permissions(&index_root, fs::Permissions::from_mode(0o555)).unwrap();
    let write_check = index_root.join("write-check");
    if fs::write(&write_check, b"").is_ok() {
        // Privileged users ignore directory permissions.
        let _ = fs::remove_file(&write_check);
        fs::set_permissions(&index_root, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let report = lc.cleanup("stuck").unwrap();
    fs::set_permissions(&index_root, fs::Permissions::from_mode(0o755)).unwrap();

    assert!(!report.is_complete());
    assert!(report.failed.iter().any(|f| f.path == lc.index_path("stuck")), "{:?}", report.failed);
    assert!(!report.removed.contains(&lc.index_path("stuck")));
    assert_eq!(report.removed, vec![lc.upload_dir("stuck")]);
    assert!(!lc.upload_dir("stuck").exists());
    assert!(lc.index_path("stuck").exists());
}
