//! Write path: source → optional encryption → destination file → trailer.

use crate::engine::LocalStorage;
use crate::error::{StorageError, StorageErrorExt};
use crate::pipeline::{ByteStream, Pipeline};
use futures::future::join_all;
use getrandom::fill;
use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use stowage_envelope::StreamTransform;
use tokio::fs;
use tokio::io::AsyncRead;
use tracing::{debug, warn};

const FILE_NAME_ALPHABET: [char; 36] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
    'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

/// Where the bytes of an upload come from.
pub enum FileSource {
    Bytes(Vec<u8>),
    /// A file on the host filesystem, outside the storage path.
    Path(PathBuf),
    Reader(ByteStream),
}

impl FileSource {
    pub fn reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self::Reader(Box::new(reader))
    }

    pub(crate) async fn open(self) -> Result<ByteStream, StorageError> {
        match self {
            Self::Bytes(bytes) => Ok(Box::new(Cursor::new(bytes))),
            Self::Path(path) => {
                let file = fs::File::open(&path)
                    .await
                    .map_err(|e| StorageError::from_fs(e, &path, "Opening upload source"))?;
                Ok(Box::new(file))
            },
            Self::Reader(reader) => Ok(reader),
        }
    }
}

impl fmt::Debug for FileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

impl From<Vec<u8>> for FileSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&[u8]> for FileSource {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

impl From<&str> for FileSource {
    fn from(text: &str) -> Self {
        Self::Bytes(text.as_bytes().to_vec())
    }
}

impl From<String> for FileSource {
    fn from(text: String) -> Self {
        Self::Bytes(text.into_bytes())
    }
}

impl From<PathBuf> for FileSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<ByteStream> for FileSource {
    fn from(reader: ByteStream) -> Self {
        Self::Reader(reader)
    }
}

/// Directory prefix for generated keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SubDirectories {
    /// Store directly under the storage path.
    None,
    /// Eight single hex-digit directories drawn from 4 random bytes (`a/3/f/0/9/c/1/e`).
    #[default]
    Random,
    Fixed(String),
}

/// How [`LocalStorage::upload`] names and guards a new file.
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub sub_directories: SubDirectories,
    /// Fixed file name; a unique one is generated when unset.
    pub file_name: Option<String>,
    /// Appended to generated names, without the dot.
    pub extension: Option<String>,
    /// Overrides the storage-wide delete-on-error setting.
    pub delete_file_on_error: Option<bool>,
}

impl UploadOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn sub_directories(mut self, sub_directories: SubDirectories) -> Self {
        self.sub_directories = sub_directories;
        self
    }

    #[must_use]
    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into().trim_start_matches('.').to_owned());
        self
    }

    #[must_use]
    pub const fn delete_file_on_error(mut self, enabled: bool) -> Self {
        self.delete_file_on_error = Some(enabled);
        self
    }

    fn generate_key(&self) -> Result<String, StorageError> {
        let mut segments = match &self.sub_directories {
            SubDirectories::None => Vec::new(),
            SubDirectories::Random => random_directories()?,
            SubDirectories::Fixed(prefix) => vec![prefix.trim_matches('/').to_owned()],
        };

        let name = match (&self.file_name, &self.extension) {
            (Some(name), _) => name.clone(),
            (None, Some(ext)) if !ext.is_empty() => format!("{}.{ext}", unique_name()),
            (None, _) => unique_name(),
        };
        segments.push(name);
        segments.retain(|s| !s.is_empty());
        Ok(segments.join("/"))
    }
}

fn unique_name() -> String {
    nanoid::nanoid!(21, &FILE_NAME_ALPHABET)
}

fn random_directories() -> Result<Vec<String>, StorageError> {
    let mut bytes = [0u8; 4];
    fill(&mut bytes).map_err(|e| StorageError::Internal {
        message: format!("System RNG unavailable: {e}").into(),
        context: Some("Generating sub-directories".into()),
    })?;
    Ok(hex::encode(bytes).chars().map(String::from).collect())
}

/// Outcome of a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub key: String,
    pub absolute_path: PathBuf,
    pub bucket: String,
    /// Bytes on disk, trailer included.
    pub size: u64,
}

impl LocalStorage {
    /// Writes `source` under a generated key (see [`UploadOptions`]).
    ///
    /// # Errors
    /// See [`LocalStorage::write`].
    pub async fn upload(
        &self,
        source: impl Into<FileSource>,
        options: &UploadOptions,
    ) -> Result<UploadReceipt, StorageError> {
        let key = options.generate_key()?;
        let delete_on_error = options.delete_file_on_error.unwrap_or(self.delete_file_on_error);
        self.write_with(&key, source.into(), delete_on_error).await
    }

    /// Uploads every source concurrently; one result per source, in order.
    pub async fn upload_many<S>(
        &self,
        sources: impl IntoIterator<Item = S>,
        options: &UploadOptions,
    ) -> Vec<Result<UploadReceipt, StorageError>>
    where
        S: Into<FileSource>,
    {
        join_all(sources.into_iter().map(|source| self.upload(source, options))).await
    }

    /// Streams `source` into the file at `key`, encrypting it when a codec is configured.
    ///
    /// The ciphertext is synced to disk before the trailer is appended. On failure the
    /// partial file is removed if delete-on-error is enabled and the original error is
    /// returned either way.
    ///
    /// # Errors
    /// * [`StorageError::PathTraversalAttempt`] if `key` escapes the storage path.
    /// * [`StorageError::FileNotFound`] if a path source does not exist.
    /// * [`StorageError::Envelope`] if encryption fails.
    /// * [`StorageError::Io`] on read or write failure.
    pub async fn write(
        &self,
        key: impl AsRef<Path>,
        source: impl Into<FileSource>,
    ) -> Result<UploadReceipt, StorageError> {
        let key = key.as_ref().to_string_lossy().into_owned();
        self.write_with(&key, source.into(), self.delete_file_on_error).await
    }

    pub(crate) async fn write_with(
        &self,
        key: &str,
        source: FileSource,
        delete_on_error: bool,
    ) -> Result<UploadReceipt, StorageError> {
        let path = self.resolve(key)?;
        let mut reader = source.open().await?;

        match self.write_stream(&path, &mut reader).await {
            Ok(size) => {
                debug!(key, size, encrypted = self.encryptor.is_enabled(), "File written");
                Ok(UploadReceipt {
                    key: self.key_for(&path),
                    absolute_path: path,
                    bucket: self.bucket.clone(),
                    size,
                })
            },
            Err(err) => {
                if delete_on_error {
                    discard(&path).await;
                }
                Err(err)
            },
        }
    }

    async fn write_stream(
        &self,
        path: &Path,
        reader: &mut ByteStream,
    ) -> Result<u64, StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .context(format!("Failed to create directories for {}", path.display()))?;
        }

        let mut file = fs::File::create(path)
            .await
            .context(format!("Failed to create {}", path.display()))?;

        let mut sealing =
            if self.encryptor.is_enabled() { Some(self.encryptor.begin_encryption()?) } else { None };

        let mut pipeline = Pipeline::new(&mut **reader, &mut file);
        if let Some((_, cipher)) = sealing.as_mut() {
            pipeline = pipeline.stage(cipher.as_mut() as &mut dyn StreamTransform);
        }
        let mut size = pipeline.run().await?;

        file.sync_all().await.context("Syncing ciphertext")?;
        drop(file);

        // The tag only exists once the last chunk went through the cipher.
        if let Some((nonce, cipher)) = sealing {
            let tag = cipher.finalize();
            let mut tail = fs::OpenOptions::new()
                .append(true)
                .open(path)
                .await
                .context(format!("Failed to reopen {} for the trailer", path.display()))?;
            self.encryptor.append_trailer(&mut tail, &tag, &nonce).await?;
            tail.sync_all().await.context("Syncing trailer")?;
            size += self.encryptor.trailer_len().unwrap_or_default() as u64;
        }

        Ok(size)
    }
}

/// Best-effort removal of a partially written file.
async fn discard(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed partial file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_directories_are_eight_hex_digits() {
        let dirs = random_directories().unwrap();
        assert_eq!(dirs.len(), 8);
        assert!(dirs.iter().all(|d| d.len() == 1 && d.chars().all(|c| c.is_ascii_hexdigit())));
    }

    #[test]
    fn generated_keys_follow_options() {
        let flat = UploadOptions::new().sub_directories(SubDirectories::None).extension(".txt");
        let key = flat.generate_key().unwrap();
        assert!(!key.contains('/'));
        assert!(key.ends_with(".txt"));
        assert_eq!(key.len(), 21 + 4);

        let fixed = UploadOptions::new()
            .sub_directories(SubDirectories::Fixed("avatars/".into()))
            .file_name("me.png");
        assert_eq!(fixed.generate_key().unwrap(), "avatars/me.png");

        let random = UploadOptions::new().generate_key().unwrap();
        assert_eq!(random.split('/').count(), 9);
    }

    #[test]
    fn sources_convert() {
        assert!(matches!(FileSource::from("abc"), FileSource::Bytes(ref b) if b == b"abc"));
        assert!(matches!(FileSource::from(PathBuf::from("/tmp/x")), FileSource::Path(_)));
        assert_eq!(format!("{:?}", FileSource::reader(&b"xyz"[..])), "Reader(..)");
    }
}
