use crate::engine::{LocalStorage, LocalStorageInner};
use crate::error::{StorageError, StorageErrorExt};
use crate::staging::StagingArea;
use private::Sealed;
use std::path::PathBuf;
use std::sync::Arc;
use stowage_envelope::{EnvelopeCodec, FileEncryptor};
use tokio::fs;
use tracing::info;

#[derive(Debug, Clone)]
struct BuilderConfig {
    bucket: String,
    create: bool,
    delete_file_on_error: bool,
    per_page: usize,
    temp_dir: Option<PathBuf>,
    encryptor: FileEncryptor,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            bucket: "storage".into(),
            create: true,
            delete_file_on_error: true,
            per_page: 10,
            temp_dir: None,
            encryptor: FileEncryptor::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct NoRoot;
#[derive(Debug)]
pub struct WithRoot(PathBuf);

mod private {
    pub(super) trait Sealed {}
}
impl Sealed for NoRoot {}
impl Sealed for WithRoot {}

#[allow(private_bounds)]
#[derive(Debug, Default)]
pub struct LocalStorageBuilder<S: Sealed = NoRoot> {
    state: S,
    config: BuilderConfig,
}

#[allow(private_bounds)]
impl<S: Sealed> LocalStorageBuilder<S> {
    /// Sub-directory of the root holding this storage's files.
    #[must_use = "Sets the bucket directory under the root"]
    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.config.bucket = bucket.into();
        self
    }

    #[must_use = "Sets whether the storage path should be created if it does not exist"]
    pub const fn create(mut self, enable: bool) -> Self {
        self.config.create = enable;
        self
    }

    #[must_use = "Sets whether partially written files are removed on failure"]
    pub const fn delete_file_on_error(mut self, enable: bool) -> Self {
        self.config.delete_file_on_error = enable;
        self
    }

    #[must_use = "Sets the default listing page size"]
    pub const fn per_page(mut self, per_page: usize) -> Self {
        self.config.per_page = per_page;
        self
    }

    #[must_use = "Sets the parent directory of the staging area"]
    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = Some(dir.into());
        self
    }

    #[must_use = "Enables at-rest encryption with the given codec"]
    pub fn encryption(mut self, codec: Arc<dyn EnvelopeCodec>) -> Self {
        self.config.encryptor.configure(codec);
        self
    }

    #[must_use = "Replaces the encryptor"]
    pub fn encryptor(mut self, encryptor: FileEncryptor) -> Self {
        self.config.encryptor = encryptor;
        self
    }

    fn transition<N: Sealed>(self, state: N) -> LocalStorageBuilder<N> {
        LocalStorageBuilder { state, config: self.config }
    }
}

impl LocalStorageBuilder<NoRoot> {
    #[must_use = "Creates a new storage builder with default configuration"]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use = "Sets the root directory; the bucket lives below it"]
    pub fn root(self, path: impl Into<PathBuf>) -> LocalStorageBuilder<WithRoot> {
        self.transition(WithRoot(path.into()))
    }
}

impl LocalStorageBuilder<WithRoot> {
    /// Consumes the configuration and initializes the storage.
    ///
    /// 1. Creates `<root>/<bucket>` if `create(true)` was set.
    /// 2. Canonicalizes it so later path checks compare physical paths.
    /// 3. Initializes the staging area, purging stale leftovers of crashed instances.
    ///
    /// # Errors
    /// * [`StorageError::InvalidInput`] if the bucket is not a single plain segment or
    ///   `per_page` is zero.
    /// * [`StorageError::FileNotFound`] if the storage path is missing and `create` is off.
    /// * [`StorageError::Io`] if a directory cannot be created or resolved.
    pub async fn connect(self) -> Result<LocalStorage, StorageError> {
        let BuilderConfig { bucket, create, delete_file_on_error, per_page, temp_dir, encryptor } =
            self.config;
        validate_bucket(&bucket)?;
        if per_page == 0 {
            return Err(StorageError::InvalidInput {
                message: "per_page must be at least 1".into(),
                context: Some("Connecting storage".into()),
            });
        }

        let path = self.state.0.join(&bucket);
        if create {
            fs::create_dir_all(&path)
                .await
                .context(format!("Failed to bootstrap storage path: {}", path.display()))?;
            info!(path = %path.display(), "Bootstrapped storage directory");
        }

        let root = fs::canonicalize(&path)
            .await
            .map_err(|e| StorageError::from_fs(e, &path, "Resolving storage path"))?;

        let staging =
            StagingArea::init(temp_dir.unwrap_or_else(|| std::env::temp_dir().join("stowage"))).await?;

        info!(
            path = %root.display(),
            bucket = %bucket,
            encrypted = encryptor.is_enabled(),
            "Local storage connected"
        );

        Ok(LocalStorage {
            inner: Arc::new(LocalStorageInner {
                root,
                bucket,
                encryptor,
                delete_file_on_error,
                per_page,
                staging,
            }),
        })
    }
}

fn validate_bucket(bucket: &str) -> Result<(), StorageError> {
    let valid = !bucket.is_empty()
        && bucket != "."
        && bucket != ".."
        && !bucket.contains(['/', '\\'])
        && !bucket.chars().any(char::is_control);

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidInput {
            message: format!("'{bucket}' is not a valid bucket name").into(),
            context: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowage_envelope::{Algorithm, SecretKey};
    use tempfile::TempDir;

    #[test]
    fn bucket_names_are_single_segments() {
        assert!(validate_bucket("uploads").is_ok());
        assert!(validate_bucket("user_1.files").is_ok());
        for bad in ["", ".", "..", "a/b", "a\\b", "tab\there"] {
            assert!(validate_bucket(bad).is_err(), "{bad:?} accepted");
        }
    }

    #[tokio::test]
    async fn connect_creates_bucket_under_root() {
        let temp = TempDir::new().unwrap();
        let storage = LocalStorage::builder()
            .root(temp.path().join("data"))
            .bucket("media")
            .encryption(Algorithm::ChaCha20Poly1305.codec(SecretKey::from_bytes([1; 32])))
            .temp_dir(temp.path().join("staging"))
            .connect()
            .await
            .unwrap();

        assert!(storage.path().ends_with("data/media"));
        assert!(storage.path().is_dir());
        assert!(storage.encryptor().is_enabled());
        assert!(storage.staging().dir().is_dir());
        storage.shutdown().await;
    }

    #[tokio::test]
    async fn missing_path_without_create_is_not_found() {
        let temp = TempDir::new().unwrap();
        let err = LocalStorage::builder()
            .root(temp.path().join("absent"))
            .create(false)
            .temp_dir(temp.path().join("staging"))
            .connect()
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn zero_page_size_is_rejected() {
        let temp = TempDir::new().unwrap();
        let err = LocalStorage::builder().root(temp.path()).per_page(0).connect().await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidInput { .. }));
    }
}
