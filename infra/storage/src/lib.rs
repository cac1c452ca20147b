//! Sandboxed local file storage with transparent at-rest encryption.
//!
//! Files are addressed by `/`-separated keys that resolve below a canonical storage
//! path (`<root>/<bucket>`). When a codec is configured, every write streams the
//! content through it and appends an authentication trailer; every read detects the
//! trailer and decrypts on the fly. Files written without encryption stay readable
//! after it is enabled.
//!
//! # Core Features
//!
//! - **Sandbox Security**: Keys are resolved against the physical storage path; `..`
//!   escapes, absolute keys and symlinks pointing outside are rejected.
//! - **Streaming Encryption**: Content is never buffered whole; see
//!   [`stowage_envelope`] for the on-disk format.
//! - **Cleanup on Failure**: Partial files are removed when a write fails (configurable).
//! - **Staging Area**: A per-instance scratch directory for verified decrypt-to-disk.
//! - **Transfers**: [`FileManager`] copies and moves files between local storages and
//!   [`ObjectStore`] implementations.
//!
//! # Examples
//!
//! ```rust
//! use stowage_storage::{LocalStorage, StorageError, UploadOptions};
//! use stowage_envelope::{Algorithm, SecretKey};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), StorageError> {
//!     # let tmp = tempfile::tempdir().unwrap();
//!     let storage = LocalStorage::builder()
//!         .root(tmp.path())
//!         .encryption(Algorithm::ChaCha20Poly1305.codec(SecretKey::generate()?))
//!         .temp_dir(tmp.path().join("staging"))
//!         .connect()
//!         .await?;
//!
//!     let receipt = storage.upload("hello world", &UploadOptions::new().extension("txt")).await?;
//!     assert_eq!(receipt.size, 11 + 37);
//!
//!     let data = storage.read(&receipt.key).await?;
//!     assert_eq!(data, b"hello world");
//!
//!     storage.shutdown().await;
//!     Ok(())
//! }
//! ```

mod builder;
mod config;
mod engine;
mod error;
mod listing;
mod pipeline;
mod read;
mod remote;
mod security;
mod staging;
mod transfer;
mod write;

pub use builder::LocalStorageBuilder;
pub use config::{EncryptionConfig, StorageConfig};
pub use engine::{FileStats, LocalStorage, PathPair};
pub use error::{StorageError, StorageErrorExt};
pub use listing::{FilesCursor, ListOptions};
pub use pipeline::{ByteStream, CHUNK_SIZE, Pipeline};
pub use read::{FileDownload, StagedFile};
pub use remote::{ObjectMeta, ObjectPage, ObjectStore};
pub use staging::StagingArea;
pub use transfer::{Backend, FileManager, TransferReceipt};
pub use write::{FileSource, SubDirectories, UploadOptions, UploadReceipt};

pub mod prelude {
    pub use crate::engine::LocalStorage;
    pub use crate::error::{StorageError, StorageErrorExt};
    pub use crate::remote::ObjectStore;
    pub use crate::transfer::{Backend, FileManager};
    pub use crate::write::{FileSource, UploadOptions};
}
