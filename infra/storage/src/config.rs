use crate::error::StorageError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use stowage_envelope::{Algorithm, EnvelopeCodec, SecretKey};

/// Settings for a [`LocalStorage`](crate::LocalStorage) instance.
///
/// Every field has a default, so an empty document is a valid configuration
/// (plaintext storage under `./storage`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub root_path: PathBuf,
    pub bucket: String,
    pub create: bool,
    pub delete_file_on_error: bool,
    pub per_page: usize,
    /// Parent of the staging area; `<system temp>/stowage` when unset.
    pub temp_dir: Option<PathBuf>,
    pub encryption: Option<EncryptionConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_path: PathBuf::from("."),
            bucket: "storage".into(),
            create: true,
            delete_file_on_error: true,
            per_page: 10,
            temp_dir: None,
            encryption: None,
        }
    }
}

/// Selects the envelope codec. Absent configuration means no encryption.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionConfig {
    #[serde(default)]
    pub algorithm: Algorithm,
    /// Base64 of the 32-byte pre-shared key.
    pub key: String,
}

impl EncryptionConfig {
    /// Decodes the key and builds the codec.
    ///
    /// # Errors
    /// Returns [`StorageError::Envelope`] if the key is not base64 of 32 bytes.
    pub fn codec(&self) -> Result<Arc<dyn EnvelopeCodec>, StorageError> {
        let key = SecretKey::from_base64(&self.key)?;
        Ok(self.algorithm.codec(key))
    }
}

impl fmt::Debug for EncryptionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionConfig")
            .field("algorithm", &self.algorithm)
            .field("key", &"<redacted>")
            .finish()
    }
}
