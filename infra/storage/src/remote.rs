//! Interface to S3-compatible object stores.
//!
//! No SDK binding lives here; hosts implement [`ObjectStore`] over the client of
//! their choice. Objects are stored as-is: at-rest encryption is a local-storage
//! concern and never applies to remote bodies.

use crate::error::StorageError;
use crate::pipeline::ByteStream;
use async_trait::async_trait;
use std::fmt::Debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
}

/// One page of a listing. `next` is the continuation token for the following page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPage {
    pub objects: Vec<ObjectMeta>,
    pub next: Option<String>,
}

/// A remote bucket addressed by key.
///
/// Missing keys are reported as [`StorageError::FileNotFound`]; transport and
/// service failures as [`StorageError::Remote`].
#[async_trait]
pub trait ObjectStore: Send + Sync + Debug {
    fn bucket(&self) -> &str;

    /// Uploads the whole stream under `key`, replacing any existing object.
    async fn put(&self, key: &str, body: ByteStream) -> Result<ObjectMeta, StorageError>;

    async fn get(&self, key: &str) -> Result<ByteStream, StorageError>;

    async fn head(&self, key: &str) -> Result<ObjectMeta, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Server-side copy within this bucket.
    async fn copy(&self, from: &str, to: &str) -> Result<ObjectMeta, StorageError>;

    async fn list(
        &self,
        prefix: Option<&str>,
        continuation: Option<String>,
    ) -> Result<ObjectPage, StorageError>;
}
