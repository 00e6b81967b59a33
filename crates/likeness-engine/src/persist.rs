//! Enrollment store persistence as a JSON document on disk.

use likeness_core::EnrollmentStore;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("store I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("store encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Load the store at `path`, degrading to an empty store.
///
/// A missing file is a fresh install. An unreadable or malformed file is
/// logged and ignored; the next successful commit overwrites it.
pub async fn load_or_empty(path: &Path) -> EnrollmentStore {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "no enrollment store yet; starting empty");
            return EnrollmentStore::new();
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot read enrollment store; starting empty");
            return EnrollmentStore::new();
        }
    };

    match EnrollmentStore::from_json(&text) {
        Ok(store) => {
            tracing::info!(
                path = %path.display(),
                identities = store.len(),
                descriptors = store.descriptor_count(),
                "enrollment store loaded"
            );
            store
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "malformed enrollment store; starting empty");
            EnrollmentStore::new()
        }
    }
}

/// Write `store` to `path` via a sibling temp file and rename.
pub async fn save(path: &Path, store: &EnrollmentStore) -> Result<(), PersistError> {
    let io_err = |source: std::io::Error| PersistError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }

    let text = store.to_json_pretty()?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let written = match tokio::fs::write(&tmp, text.as_bytes()).await {
        Ok(()) => tokio::fs::rename(&tmp, path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(io_err(e));
    }

    tracing::debug!(
        path = %path.display(),
        identities = store.len(),
        "enrollment store saved"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use likeness_core::{Descriptor, Label, DESCRIPTOR_DIM};

    fn sample_store() -> EnrollmentStore {
        let d = Descriptor::new(vec![0.25; DESCRIPTOR_DIM]).unwrap();
        EnrollmentStore::new().commit(&Label::new("Ana").unwrap(), [d])
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = load_or_empty(&dir.path().join("faces.json")).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faces.json");
        tokio::fs::write(&path, r#"{"bad": "notanarray"}"#).await.unwrap();
        assert!(load_or_empty(&path).await.is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/faces.json");
        let store = sample_store();

        save(&path, &store).await.unwrap();
        assert_eq!(load_or_empty(&path).await, store);
        assert!(!dir.path().join("nested/dir/faces.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_failed_rename_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faces.json");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("occupied"), b"x").unwrap();

        let err = save(&path, &sample_store()).await.unwrap_err();
        assert!(matches!(err, PersistError::Io { .. }));
        assert!(!dir.path().join("faces.json.tmp").exists());
        assert!(path.join("occupied").exists());
    }
}
