#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use stowage_envelope::{
    Algorithm, EnvelopeCodec, EnvelopeError, OpeningCipher, SealingCipher, SecretKey,
};
use stowage_storage::prelude::*;
use stowage_storage::{ByteStream, ObjectMeta, ObjectPage};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

pub const TEST_KEY: [u8; 32] = *b"stowage-test-key-0123456789abcde";

/// A storage under `<temp>/<bucket>` with its staging area in `<temp>/staging`.
pub async fn storage(temp: &TempDir, bucket: &str, algorithm: Option<Algorithm>) -> LocalStorage {
    let mut builder = LocalStorage::builder()
        .root(temp.path())
        .bucket(bucket)
        .temp_dir(temp.path().join("staging"));
    if let Some(algorithm) = algorithm {
        builder = builder.encryption(algorithm.codec(SecretKey::from_bytes(TEST_KEY)));
    }
    builder.connect().await.expect("connect storage")
}

pub async fn plain(temp: &TempDir) -> LocalStorage {
    storage(temp, "plain", None).await
}

pub async fn encrypted(temp: &TempDir) -> LocalStorage {
    storage(temp, "vault", Some(Algorithm::ChaCha20Poly1305)).await
}

/// Deterministic, non-repeating-looking test content.
#[must_use]
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| u8::try_from((i * 31 + i / 7) % 251).unwrap_or_default()).collect()
}

/// Yields `good` bytes, then fails.
#[derive(Debug)]
pub struct FailingReader {
    good: usize,
}

impl FailingReader {
    pub fn after(good: usize) -> Self {
        Self { good }
    }
}

impl AsyncRead for FailingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.good == 0 {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "source dropped")));
        }
        let n = self.good.min(buf.remaining());
        buf.put_slice(&vec![b'x'; n]);
        self.good -= n;
        Poll::Ready(Ok(()))
    }
}

/// Wraps a real codec but refuses to encode the trailer, so writes fail after the ciphertext.
#[derive(Debug)]
pub struct TrailerlessCodec(pub Arc<dyn EnvelopeCodec>);

impl EnvelopeCodec for TrailerlessCodec {
    fn algorithm(&self) -> Algorithm {
        self.0.algorithm()
    }

    fn tag_len(&self) -> usize {
        self.0.tag_len()
    }

    fn nonce_len(&self) -> usize {
        self.0.nonce_len()
    }

    fn begin_encryption(&self) -> Result<(Vec<u8>, Box<dyn SealingCipher>), EnvelopeError> {
        self.0.begin_encryption()
    }

    fn begin_decryption(
        &self,
        nonce: &[u8],
        auth_tag: &[u8],
    ) -> Result<Box<dyn OpeningCipher>, EnvelopeError> {
        self.0.begin_decryption(nonce, auth_tag)
    }

    fn encode_trailer(&self, _auth_tag: &[u8], _nonce: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        Err(EnvelopeError::InvalidTrailer { message: "trailer encoding disabled".into(), context: None })
    }
}

/// A storage whose writes always fail while appending the trailer.
pub async fn trailerless(temp: &TempDir, delete_file_on_error: bool) -> LocalStorage {
    let codec = Algorithm::ChaCha20Poly1305.codec(SecretKey::from_bytes(TEST_KEY));
    LocalStorage::builder()
        .root(temp.path())
        .bucket("trailerless")
        .temp_dir(temp.path().join("staging"))
        .delete_file_on_error(delete_file_on_error)
        .encryption(Arc::new(TrailerlessCodec(codec)))
        .connect()
        .await
        .expect("connect storage")
}

/// An [`ObjectStore`] keeping objects in memory. Lists two objects per page.
#[derive(Debug, Default)]
pub struct MemoryStore {
    bucket: String,
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn shared(bucket: &str) -> Arc<dyn ObjectStore> {
        Arc::new(Self { bucket: bucket.into(), objects: Mutex::default() })
    }

    pub fn with(bucket: &str, objects: &[(&str, &str)]) -> Arc<dyn ObjectStore> {
        let store = Self { bucket: bucket.into(), objects: Mutex::default() };
        {
            let mut map = store.objects.lock().unwrap();
            for (key, body) in objects {
                map.insert((*key).to_owned(), body.as_bytes().to_vec());
            }
        }
        Arc::new(store)
    }

    fn missing(key: &str) -> StorageError {
        StorageError::FileNotFound { message: key.to_owned().into(), context: None }
    }

    fn meta(key: &str, body: &[u8]) -> ObjectMeta {
        ObjectMeta { key: key.to_owned(), size: body.len() as u64 }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, mut body: ByteStream) -> Result<ObjectMeta, StorageError> {
        let mut bytes = Vec::new();
        body.read_to_end(&mut bytes).await.map_err(|e| StorageError::Remote {
            message: e.to_string().into(),
            context: Some("put".into()),
        })?;
        let meta = Self::meta(key, &bytes);
        self.objects.lock().unwrap().insert(key.to_owned(), bytes);
        Ok(meta)
    }

    async fn get(&self, key: &str) -> Result<ByteStream, StorageError> {
        let body = self.objects.lock().unwrap().get(key).cloned().ok_or_else(|| Self::missing(key))?;
        Ok(Box::new(io::Cursor::new(body)))
    }

    async fn head(&self, key: &str) -> Result<ObjectMeta, StorageError> {
        let objects = self.objects.lock().unwrap();
        objects.get(key).map(|body| Self::meta(key, body)).ok_or_else(|| Self::missing(key))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.objects.lock().unwrap().remove(key).map(drop).ok_or_else(|| Self::missing(key))
    }

    async fn copy(&self, from: &str, to: &str) -> Result<ObjectMeta, StorageError> {
        let mut objects = self.objects.lock().unwrap();
        let body = objects.get(from).cloned().ok_or_else(|| Self::missing(from))?;
        let meta = Self::meta(to, &body);
        objects.insert(to.to_owned(), body);
        Ok(meta)
    }

    async fn list(
        &self,
        prefix: Option<&str>,
        continuation: Option<String>,
    ) -> Result<ObjectPage, StorageError> {
        let objects = self.objects.lock().unwrap();
        let mut matching = objects
            .iter()
            .filter(|(key, _)| prefix.is_none_or(|p| key.starts_with(p)))
            .filter(|(key, _)| continuation.as_deref().is_none_or(|after| key.as_str() > after));

        let page: Vec<_> = matching.by_ref().take(2).map(|(k, v)| Self::meta(k, v)).collect();
        let next = matching.next().and(page.last().map(|m| m.key.clone()));
        Ok(ObjectPage { objects: page, next })
    }
}
