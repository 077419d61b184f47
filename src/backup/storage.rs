//! Capability-scoped artifact directory.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use std::io::Write;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Errors raised while reading or writing artifacts.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// A filesystem operation failed.
    #[error("backup storage I/O on {path} failed: {source}")]
    Io {
        /// Artifact path relative to the storage root.
        path: String,
        /// Underlying error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The artifact path has no file name.
    #[error("invalid artifact path: {0:?}")]
    InvalidPath(String),

    /// The blocking worker running the operation failed.
    #[error("backup storage worker failed: {0}")]
    Worker(Arc<tokio::task::JoinError>),
}

impl StorageError {
    fn io(path: &Utf8Path, err: std::io::Error) -> Self {
        Self::Io {
            path: path.to_string(),
            source: Arc::new(err),
        }
    }
}

/// Artifact directory rooted at a fixed path.
#[derive(Debug, Clone)]
pub struct BackupStorage {
    root: Arc<Dir>,
    root_path: Utf8PathBuf,
}

impl BackupStorage {
    /// Opens the artifact directory, creating it when missing.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] when the directory cannot be created or
    /// opened.
    pub fn open(root_path: impl Into<Utf8PathBuf>) -> Result<Self, StorageError> {
        let path = root_path.into();
        Dir::create_ambient_dir_all(&path, ambient_authority())
            .map_err(|err| StorageError::io(&path, err))?;
        let root = Dir::open_ambient_dir(&path, ambient_authority())
            .map_err(|err| StorageError::io(&path, err))?;
        Ok(Self {
            root: Arc::new(root),
            root_path: path,
        })
    }

    /// Returns the directory all artifact paths are relative to.
    #[must_use]
    pub fn root_path(&self) -> &Utf8Path {
        &self.root_path
    }

    /// Writes an artifact and publishes it atomically under `path`.
    ///
    /// Parent directories are created as needed. An existing artifact at
    /// `path` is replaced only once the new contents are fully on disk.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] when any write step fails. The previous
    /// artifact, if any, is left intact.
    pub async fn publish(&self, path: &str, contents: String) -> Result<(), StorageError> {
        let root = Arc::clone(&self.root);
        let target = Utf8PathBuf::from(path);
        tokio::task::spawn_blocking(move || publish_blocking(&root, &target, &contents))
            .await
            .map_err(|err| StorageError::Worker(Arc::new(err)))?
    }

    /// Reads an artifact.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] when the artifact is missing or
    /// unreadable.
    pub async fn read(&self, path: &str) -> Result<String, StorageError> {
        let root = Arc::clone(&self.root);
        let target = Utf8PathBuf::from(path);
        tokio::task::spawn_blocking(move || {
            root.read_to_string(&target)
                .map_err(|err| StorageError::io(&target, err))
        })
        .await
        .map_err(|err| StorageError::Worker(Arc::new(err)))?
    }
}

fn publish_blocking(root: &Dir, target: &Utf8Path, contents: &str) -> Result<(), StorageError> {
    let file_name = target
        .file_name()
        .ok_or_else(|| StorageError::InvalidPath(target.to_string()))?;
    if let Some(parent) = target.parent().filter(|parent| !parent.as_str().is_empty()) {
        root.create_dir_all(parent)
            .map_err(|err| StorageError::io(parent, err))?;
    }

    let partial = target.with_file_name(format!("{file_name}.partial-{}", Uuid::new_v4()));
    if let Err(err) = write_synced(root, &partial, contents) {
        discard(root, &partial);
        return Err(StorageError::io(&partial, err));
    }
    if let Err(err) = root.rename(&partial, root, target) {
        discard(root, &partial);
        return Err(StorageError::io(target, err));
    }
    debug!(artifact = %target, bytes = contents.len(), "published backup artifact");
    Ok(())
}

fn write_synced(root: &Dir, path: &Utf8Path, contents: &str) -> std::io::Result<()> {
    let mut file = root.create(path)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()
}

fn discard(root: &Dir, path: &Utf8Path) {
    match root.remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(artifact = %path, error = %err, "failed to remove partial artifact"),
    }
}
