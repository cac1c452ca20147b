//! The local storage handle and its CRUD surface.
//!
//! Reading lives in [`crate::read`], writing in [`crate::write`] and listing in
//! [`crate::listing`]; this module owns the shared state and everything that
//! treats stored bytes as opaque (stat, delete, copy, rename).

use crate::builder::LocalStorageBuilder;
use crate::config::StorageConfig;
use crate::error::{StorageError, StorageErrorExt};
use crate::security;
use crate::staging::StagingArea;
use futures::future::join_all;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use stowage_envelope::FileEncryptor;
use tokio::fs;
use tracing::debug;

/// The internal shared state of a [`LocalStorage`] instance.
#[derive(Debug)]
pub struct LocalStorageInner {
    /// Canonical `<root_path>/<bucket>`; every key resolves below it.
    pub(crate) root: PathBuf,
    pub(crate) bucket: String,
    pub(crate) encryptor: FileEncryptor,
    pub(crate) delete_file_on_error: bool,
    pub(crate) per_page: usize,
    pub(crate) staging: StagingArea,
}

/// A thread-safe handle to a sandboxed storage directory.
///
/// Cloning is cheap; clones share configuration and the staging area.
///
/// ```rust
/// use stowage_storage::{LocalStorage, StorageError};
///
/// #[tokio::main]
/// async fn main() -> Result<(), StorageError> {
///     # let tmp = tempfile::tempdir().unwrap();
///     let storage = LocalStorage::builder()
///         .root(tmp.path())
///         .bucket("docs")
///         .temp_dir(tmp.path().join("staging"))
///         .connect()
///         .await?;
///
///     storage.write("notes/today.txt", "hello").await?;
///     assert!(storage.exists("notes/today.txt")?);
///
///     let stats = storage.stats("notes/today.txt").await?;
///     assert_eq!(stats.size, 5);
///     # storage.shutdown().await;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct LocalStorage {
    pub(crate) inner: Arc<LocalStorageInner>,
}

impl Deref for LocalStorage {
    type Target = LocalStorageInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Metadata of a stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStats {
    pub key: String,
    pub file_name: String,
    pub absolute_path: PathBuf,
    pub bucket: String,
    /// Bytes on disk; includes the trailer of encrypted files.
    pub size: u64,
    pub modified: Option<SystemTime>,
    /// Extension of the file name.
    pub extension: Option<String>,
    /// Content type sniffed from the first plaintext bytes, if recognized.
    pub mime_type: Option<String>,
    /// Extension matching [`FileStats::mime_type`].
    pub detected_extension: Option<String>,
}

/// A source/destination key pair for the batch operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPair {
    pub from: String,
    pub to: String,
}

impl PathPair {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self { from: from.into(), to: to.into() }
    }
}

impl<A: Into<String>, B: Into<String>> From<(A, B)> for PathPair {
    fn from((from, to): (A, B)) -> Self {
        Self::new(from, to)
    }
}

impl LocalStorage {
    #[must_use = "The storage is not initialized until you call .connect()"]
    pub fn builder() -> LocalStorageBuilder {
        LocalStorageBuilder::new()
    }

    /// Connects a storage described by `config`.
    ///
    /// # Errors
    /// * [`StorageError::Envelope`] if the encryption key is malformed.
    /// * [`StorageError::InvalidInput`] on an invalid bucket or page size.
    /// * [`StorageError::FileNotFound`] if the storage path is missing and `create` is off.
    pub async fn from_config(config: &StorageConfig) -> Result<Self, StorageError> {
        let mut builder = Self::builder()
            .root(&config.root_path)
            .bucket(config.bucket.clone())
            .create(config.create)
            .delete_file_on_error(config.delete_file_on_error)
            .per_page(config.per_page);

        if let Some(encryption) = &config.encryption {
            builder = builder.encryption(encryption.codec()?);
        }
        if let Some(temp_dir) = &config.temp_dir {
            builder = builder.temp_dir(temp_dir);
        }

        builder.connect().await
    }

    /// Canonical storage path (`<root>/<bucket>`).
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    #[must_use]
    pub fn encryptor(&self) -> &FileEncryptor {
        &self.encryptor
    }

    #[must_use]
    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    /// Maps `key` onto a physical path confined to the storage path.
    ///
    /// # Errors
    /// * [`StorageError::PathTraversalAttempt`] for absolute keys, `..` escapes and
    ///   symlinks leading outside.
    /// * [`StorageError::InvalidInput`] if the key names no file.
    pub fn resolve(&self, key: impl AsRef<Path>) -> Result<PathBuf, StorageError> {
        security::resolve_key(&self.root, key)
    }

    pub(crate) fn key_for(&self, path: &Path) -> String {
        security::key_of(&self.root, path).unwrap_or_else(|| path.display().to_string())
    }

    /// # Errors
    /// Returns [`StorageError::FileNotFound`] unless `key` names a regular file.
    pub async fn stats(&self, key: impl AsRef<Path>) -> Result<FileStats, StorageError> {
        let path = self.resolve(key)?;
        self.stats_of(path).await
    }

    pub(crate) async fn stats_of(&self, path: PathBuf) -> Result<FileStats, StorageError> {
        let meta =
            fs::metadata(&path).await.map_err(|e| StorageError::from_fs(e, &path, "Reading metadata"))?;
        if !meta.is_file() {
            return Err(StorageError::not_found(&path));
        }
        let kind = self.sniff(&path, meta.len()).await?;

        Ok(FileStats {
            key: self.key_for(&path),
            file_name: path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
            extension: path.extension().map(|e| e.to_string_lossy().into_owned()),
            bucket: self.bucket.clone(),
            size: meta.len(),
            modified: meta.modified().ok(),
            mime_type: kind.map(|k| k.mime_type().to_owned()),
            detected_extension: kind.map(|k| k.extension().to_owned()),
            absolute_path: path,
        })
    }

    /// `Ok(false)` for missing keys and for keys naming a directory.
    ///
    /// # Errors
    /// Fails only when `key` itself is rejected by [`LocalStorage::resolve`].
    pub fn exists(&self, key: impl AsRef<Path>) -> Result<bool, StorageError> {
        Ok(self.resolve(key)?.is_file())
    }

    pub fn exists_many<K: AsRef<Path>>(
        &self,
        keys: impl IntoIterator<Item = K>,
    ) -> Vec<Result<bool, StorageError>> {
        keys.into_iter().map(|key| self.exists(key)).collect()
    }

    /// # Errors
    /// * [`StorageError::FileNotFound`] if nothing is stored under `key`.
    /// * [`StorageError::Io`] if the file cannot be removed.
    pub async fn delete(&self, key: impl AsRef<Path>) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        fs::remove_file(&path).await.map_err(|e| StorageError::from_fs(e, &path, "Deleting file"))?;
        debug!(path = %path.display(), "File deleted");
        Ok(())
    }

    pub async fn delete_many<K: AsRef<Path>>(
        &self,
        keys: impl IntoIterator<Item = K>,
    ) -> Vec<Result<(), StorageError>> {
        join_all(keys.into_iter().map(|key| async move { self.delete(key).await })).await
    }

    /// Copies the stored bytes as-is; an envelope travels with the file.
    ///
    /// Returns the destination path. An existing destination is overwritten.
    ///
    /// # Errors
    /// * [`StorageError::FileNotFound`] unless `from` names a regular file.
    /// * [`StorageError::PathTraversalAttempt`] if either key escapes the storage path.
    pub async fn copy(
        &self,
        from: impl AsRef<Path>,
        to: impl AsRef<Path>,
    ) -> Result<PathBuf, StorageError> {
        let (source, destination) = self.prepare_pair(from.as_ref(), to.as_ref()).await?;
        fs::copy(&source, &destination)
            .await
            .map_err(|e| StorageError::from_fs(e, &source, "Copying file"))?;
        debug!(from = %source.display(), to = %destination.display(), "File copied");
        Ok(destination)
    }

    pub async fn copy_many<P: Into<PathPair>>(
        &self,
        pairs: impl IntoIterator<Item = P>,
    ) -> Vec<Result<PathBuf, StorageError>> {
        join_all(pairs.into_iter().map(Into::into).map(|pair: PathPair| async move {
            self.copy(&pair.from, &pair.to).await
        }))
        .await
    }

    /// Moves a file within the storage path. Returns the destination path.
    ///
    /// # Errors
    /// Same as [`LocalStorage::copy`].
    pub async fn rename(
        &self,
        from: impl AsRef<Path>,
        to: impl AsRef<Path>,
    ) -> Result<PathBuf, StorageError> {
        let (source, destination) = self.prepare_pair(from.as_ref(), to.as_ref()).await?;
        fs::rename(&source, &destination)
            .await
            .context(format!("Moving {} to {}", source.display(), destination.display()))?;
        debug!(from = %source.display(), to = %destination.display(), "File moved");
        Ok(destination)
    }

    pub async fn rename_many<P: Into<PathPair>>(
        &self,
        pairs: impl IntoIterator<Item = P>,
    ) -> Vec<Result<PathBuf, StorageError>> {
        join_all(pairs.into_iter().map(Into::into).map(|pair: PathPair| async move {
            self.rename(&pair.from, &pair.to).await
        }))
        .await
    }

    /// Removes this instance's staging directory. Call once, when the host shuts down.
    pub async fn shutdown(&self) {
        self.staging.shutdown().await;
    }

    async fn prepare_pair(&self, from: &Path, to: &Path) -> Result<(PathBuf, PathBuf), StorageError> {
        let source = self.resolve(from)?;
        let destination = self.resolve(to)?;

        let meta = fs::metadata(&source)
            .await
            .map_err(|e| StorageError::from_fs(e, &source, "Reading source metadata"))?;
        if !meta.is_file() {
            return Err(StorageError::not_found(&source));
        }

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .await
                .context(format!("Failed to create directories for {}", destination.display()))?;
        }
        Ok((source, destination))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn storage(temp: &TempDir) -> LocalStorage {
        LocalStorage::builder()
            .root(temp.path())
            .temp_dir(temp.path().join("staging"))
            .connect()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn stats_describe_the_file() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp).await;
        storage.write("a/b/report.pdf", "12345").await.unwrap();

        let stats = storage.stats("a/b/report.pdf").await.unwrap();
        assert_eq!(stats.key, "a/b/report.pdf");
        assert_eq!(stats.file_name, "report.pdf");
        assert_eq!(stats.extension.as_deref(), Some("pdf"));
        assert_eq!(stats.bucket, "storage");
        assert_eq!(stats.size, 5);
        assert_eq!(stats.mime_type, None);
        assert!(stats.absolute_path.starts_with(storage.path()));
    }

    #[tokio::test]
    async fn stats_sniff_the_content_type() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp).await;
        storage.write("upload.bin", b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR".to_vec()).await.unwrap();

        let stats = storage.stats("upload.bin").await.unwrap();
        assert_eq!(stats.extension.as_deref(), Some("bin"));
        assert_eq!(stats.mime_type.as_deref(), Some("image/png"));
        assert_eq!(stats.detected_extension.as_deref(), Some("png"));
    }

    #[tokio::test]
    async fn directories_are_not_files() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp).await;
        storage.write("dir/file", "x").await.unwrap();

        assert!(!storage.exists("dir").unwrap());
        assert!(storage.stats("dir").await.unwrap_err().is_not_found());
        assert!(storage.copy("dir", "elsewhere").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn batch_operations_report_per_item() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp).await;
        storage.write("one", "1").await.unwrap();
        storage.write("two", "2").await.unwrap();

        let copied = storage.copy_many([("one", "copies/one"), ("missing", "copies/x")]).await;
        assert!(copied[0].is_ok());
        assert!(copied[1].as_ref().unwrap_err().is_not_found());

        let moved = storage.rename_many([PathPair::new("two", "moved/two")]).await;
        assert!(moved[0].is_ok());
        let present: Vec<bool> =
            storage.exists_many(["two", "moved/two"]).into_iter().map(Result::unwrap).collect();
        assert_eq!(present, [false, true]);

        let deleted = storage.delete_many(["one", "one"]).await;
        assert!(deleted[0].is_ok() ^ deleted[1].is_ok());
    }
}
