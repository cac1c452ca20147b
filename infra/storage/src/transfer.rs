//! Cross-backend copy and move.
//!
//! Every pairing pipes a plaintext read stream from the source into the write path
//! of the destination, so local encryption settings apply on each side independently.

use crate::engine::LocalStorage;
use crate::error::StorageError;
use crate::remote::ObjectStore;
use crate::write::FileSource;
use std::sync::Arc;
use tracing::debug;

/// Either side of a transfer.
#[derive(Debug, Clone)]
pub enum Backend {
    Local(LocalStorage),
    Remote(Arc<dyn ObjectStore>),
}

impl Backend {
    #[must_use]
    pub fn bucket(&self) -> &str {
        match self {
            Self::Local(storage) => storage.bucket(),
            Self::Remote(store) => store.bucket(),
        }
    }

    /// # Errors
    /// Returns [`StorageError::FileNotFound`] if nothing is stored under `key`.
    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        match self {
            Self::Local(storage) => storage.delete(key).await,
            Self::Remote(store) => store.delete(key).await,
        }
    }

    const fn kind(&self) -> &'static str {
        match self {
            Self::Local(_) => "local",
            Self::Remote(_) => "remote",
        }
    }
}

impl From<LocalStorage> for Backend {
    fn from(storage: LocalStorage) -> Self {
        Self::Local(storage)
    }
}

impl From<Arc<dyn ObjectStore>> for Backend {
    fn from(store: Arc<dyn ObjectStore>) -> Self {
        Self::Remote(store)
    }
}

/// Where a transferred file ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub key: String,
    pub bucket: String,
    /// Bytes stored at the destination; includes the trailer when it encrypts.
    pub size: u64,
}

/// Stateless dispatcher over the backend pairings.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileManager;

impl FileManager {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Copies `from_key` on `source` to `to_key` on `destination`.
    ///
    /// * local → local: raw byte copy on the same instance, otherwise the file is
    ///   staged (and so verified) and the staged copy feeds the destination write path.
    /// * local → remote: the file is staged (and so verified) before upload.
    /// * remote → local: the object body feeds the destination write path.
    /// * remote → remote: server-side copy on the same store, otherwise get then put.
    ///
    /// # Errors
    /// Any error of the read or write side. An integrity failure on a local source
    /// aborts the transfer before the destination sees a byte.
    pub async fn copy(
        &self,
        source: &Backend,
        destination: &Backend,
        from_key: &str,
        to_key: &str,
    ) -> Result<TransferReceipt, StorageError> {
        let receipt = match (source, destination) {
            (Backend::Local(src), Backend::Local(dst)) if Arc::ptr_eq(&src.inner, &dst.inner) => {
                let path = src.copy(from_key, to_key).await?;
                let stats = dst.stats_of(path).await?;
                TransferReceipt { key: stats.key, bucket: stats.bucket, size: stats.size }
            },
            (Backend::Local(src), Backend::Local(dst)) => {
                let staged = src.stage(from_key).await?;
                let written = dst.write(to_key, FileSource::Path(staged.path().to_path_buf())).await;
                let removed = staged.remove().await;
                let receipt = written?;
                removed?;
                TransferReceipt { key: receipt.key, bucket: receipt.bucket, size: receipt.size }
            },
            (Backend::Local(src), Backend::Remote(dst)) => {
                let staged = src.stage(from_key).await?;
                let file = staged.open().await?;
                let uploaded = dst.put(to_key, Box::new(file)).await;
                let removed = staged.remove().await;
                let meta = uploaded?;
                removed?;
                TransferReceipt { key: meta.key, bucket: dst.bucket().to_owned(), size: meta.size }
            },
            (Backend::Remote(src), Backend::Local(dst)) => {
                let body = src.get(from_key).await?;
                let receipt = dst.write(to_key, FileSource::Reader(body)).await?;
                TransferReceipt { key: receipt.key, bucket: receipt.bucket, size: receipt.size }
            },
            (Backend::Remote(src), Backend::Remote(dst)) if Arc::ptr_eq(src, dst) => {
                let meta = src.copy(from_key, to_key).await?;
                TransferReceipt { key: meta.key, bucket: dst.bucket().to_owned(), size: meta.size }
            },
            (Backend::Remote(src), Backend::Remote(dst)) => {
                let body = src.get(from_key).await?;
                let meta = dst.put(to_key, body).await?;
                TransferReceipt { key: meta.key, bucket: dst.bucket().to_owned(), size: meta.size }
            },
        };

        debug!(
            from = source.kind(),
            to = destination.kind(),
            from_key,
            to_key = %receipt.key,
            "File transferred"
        );
        Ok(receipt)
    }

    /// Moves a file: copy, then delete the source. Same-instance local moves are renames.
    ///
    /// # Errors
    /// See [`FileManager::copy`]. If the copy fails the source is left untouched.
    pub async fn relocate(
        &self,
        source: &Backend,
        destination: &Backend,
        from_key: &str,
        to_key: &str,
    ) -> Result<TransferReceipt, StorageError> {
        if let (Backend::Local(src), Backend::Local(dst)) = (source, destination)
            && Arc::ptr_eq(&src.inner, &dst.inner)
        {
            let path = src.rename(from_key, to_key).await?;
            let stats = dst.stats_of(path).await?;
            return Ok(TransferReceipt { key: stats.key, bucket: stats.bucket, size: stats.size });
        }

        let receipt = self.copy(source, destination, from_key, to_key).await?;
        source.delete(from_key).await?;
        debug!(from_key, to_key = %receipt.key, "Source removed after transfer");
        Ok(receipt)
    }
}
