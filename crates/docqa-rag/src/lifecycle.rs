//! Per-document artifacts on disk and their best-effort removal.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use walkdir::WalkDir;

use docqa_core::types::{validate_document_id, ArtifactFailure, CleanupReport};
use docqa_core::{Error, Result};

/// Owns the `{index_root}/{id}` and `{upload_root}/{id}` layout.
#[derive(Debug, Clone)]
pub struct ResourceLifecycle {
    index_root: PathBuf,
    upload_root: PathBuf,
}

impl ResourceLifecycle {
    pub fn new(index_root: impl Into<PathBuf>, upload_root: impl Into<PathBuf>) -> Self {
        Self { index_root: index_root.into(), upload_root: upload_root.into() }
    }

    pub fn index_path(&self, document_id: &str) -> PathBuf {
        self.index_root.join(document_id)
    }

    pub fn upload_dir(&self, document_id: &str) -> PathBuf {
        self.upload_root.join(document_id)
    }

    /// Where `filename` for `document_id` is stored. Only the final path
    /// component of `filename` is used.
    pub fn upload_path(&self, document_id: &str, filename: &str) -> Result<PathBuf> {
        validate_document_id(document_id)?;
        let name = Path::new(filename)
            .file_name()
            .ok_or_else(|| Error::io("store upload", io::Error::new(io::ErrorKind::InvalidInput, format!("bad filename '{filename}'"))))?;
        Ok(self.upload_dir(document_id).join(name))
    }

    pub fn store_upload(&self, document_id: &str, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.upload_path(document_id, filename)?;
        fs::create_dir_all(self.upload_dir(document_id)).map_err(|e| Error::io("create upload directory", e))?;
        fs::write(&path, bytes).map_err(|e| Error::io(format!("write {}", path.display()), e))?;
        info!(document_id, path = %path.display(), bytes = bytes.len(), "stored upload");
        Ok(path)
    }

    /// Remove every artifact of `document_id`. Never fails on I/O: each
    /// failure is logged and recorded in the report. Running it twice is
    /// harmless.
    pub fn cleanup(&self, document_id: &str) -> Result<CleanupReport> {
        validate_document_id(document_id)?;
        let mut report = CleanupReport { document_id: document_id.to_string(), ..Default::default() };
        for root in [self.index_path(document_id), self.upload_dir(document_id)] {
            remove_artifact(&root, &mut report);
        }
        info!(
            document_id,
            removed = report.removed.len(),
            missing = report.missing.len(),
            failed = report.failed.len(),
            "cleanup finished"
        );
        Ok(report)
    }
}

fn remove_artifact(root: &Path, report: &mut CleanupReport) {
    match fs::symlink_metadata(root) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            report.missing.push(root.to_path_buf());
            return;
        }
        Err(e) => {
            record_failure(report, root, &e);
            return;
        }
        Ok(_) => {}
    }

    // Directories must be writable before their children can be unlinked.
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_dir() {
            make_writable(entry.path());
        }
    }

    let failures_before = report.failed.len();
    for entry in WalkDir::new(root).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                record_failure(report, &path, &e);
                continue;
            }
        };
        let path = entry.path();
        make_writable(path);
        let removed = if entry.file_type().is_dir() { fs::remove_dir(path) } else { fs::remove_file(path) };
        if let Err(e) = removed {
            // Only the root is expected to fail after a failed child.
            if !(path == root && report.failed.len() > failures_before) {
                record_failure(report, path, &e);
            }
        }
    }
    if report.failed.len() == failures_before {
        report.removed.push(root.to_path_buf());
    }
}

fn record_failure(report: &mut CleanupReport, path: &Path, err: &dyn std::fmt::Display) {
    error!(document_id = %report.document_id, path = %path.display(), error = %err, "failed to remove artifact");
    report.failed.push(ArtifactFailure { path: path.to_path_buf(), error: err.to_string() });
}

/// Best effort: clears read-only bits so removal can proceed.
fn make_writable(path: &Path) {
    let Ok(meta) = fs::symlink_metadata(path) else { return };
    if meta.file_type().is_symlink() {
        return;
    }
    let mut perms = meta.permissions();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let extra = if meta.is_dir() { 0o700 } else { 0o200 };
        perms.set_mode(perms.mode() | extra);
    }
    #[cfg(not(unix))]
    {
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
    }
    let _ = fs::set_permissions(path, perms);
}
