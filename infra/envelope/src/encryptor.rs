use crate::codec::{EnvelopeCodec, OpeningCipher, SealingCipher, Trailer};
use crate::error::{EnvelopeError, EnvelopeErrorExt};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Holds at most one codec and gives storage a cipher-agnostic surface.
///
/// A disabled encryptor (no codec) means pass-through semantics: callers check
/// [`FileEncryptor::is_enabled`] and skip the cipher stages entirely. Cloning is
/// cheap; the codec is shared.
#[derive(Debug, Clone, Default)]
pub struct FileEncryptor {
    codec: Option<Arc<dyn EnvelopeCodec>>,
}

impl FileEncryptor {
    /// Creates a disabled encryptor.
    #[must_use]
    pub const fn new() -> Self {
        Self { codec: None }
    }

    #[must_use]
    pub fn with_codec(codec: Arc<dyn EnvelopeCodec>) -> Self {
        Self { codec: Some(codec) }
    }

    /// Installs `codec`, enabling encryption.
    pub fn configure(&mut self, codec: Arc<dyn EnvelopeCodec>) {
        debug!(algorithm = %codec.algorithm(), "Envelope codec configured");
        self.codec = Some(codec);
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.codec.is_some()
    }

    /// # Errors
    /// Returns [`EnvelopeError::MisconfiguredCodec`] when encryption is disabled.
    pub fn codec(&self) -> Result<&Arc<dyn EnvelopeCodec>, EnvelopeError> {
        self.codec.as_ref().ok_or(EnvelopeError::MisconfiguredCodec { context: None })
    }

    pub fn begin_encryption(&self) -> Result<(Vec<u8>, Box<dyn SealingCipher>), EnvelopeError> {
        self.codec().context("Beginning encryption")?.begin_encryption()
    }

    pub fn begin_decryption(
        &self,
        nonce: &[u8],
        auth_tag: &[u8],
    ) -> Result<Box<dyn OpeningCipher>, EnvelopeError> {
        self.codec().context("Beginning decryption")?.begin_decryption(nonce, auth_tag)
    }

    /// Trailer length of the active codec, `None` when disabled.
    #[must_use]
    pub fn trailer_len(&self) -> Option<usize> {
        self.codec.as_ref().map(|codec| codec.trailer_len())
    }

    /// Exclusive end of the ciphertext region; the whole file when disabled.
    #[must_use]
    pub fn ciphertext_end(&self, file_size: u64) -> u64 {
        self.codec.as_ref().map_or(file_size, |codec| codec.ciphertext_end(file_size))
    }

    /// Start of the trailer region; `file_size` (an empty tail) when disabled.
    #[must_use]
    pub fn trailer_start(&self, file_size: u64) -> u64 {
        self.codec.as_ref().map_or(file_size, |codec| codec.trailer_start(file_size))
    }

    /// Drains `tail` to its end and decodes the trailer fields.
    ///
    /// `tail` is expected to yield exactly the trailer bytes of a file.
    ///
    /// # Errors
    /// * [`EnvelopeError::MisconfiguredCodec`] when encryption is disabled.
    /// * [`EnvelopeError::TruncatedEnvelope`] when the stream ends early.
    /// * [`EnvelopeError::InvalidTrailer`] when the stream yields too many bytes.
    /// * [`EnvelopeError::Io`] on read failure.
    pub async fn read_trailer<R>(&self, mut tail: R) -> Result<Trailer, EnvelopeError>
    where
        R: AsyncRead + Unpin,
    {
        let codec = self.codec().context("Reading trailer")?;
        let mut bytes = Vec::with_capacity(codec.trailer_len());
        tail.read_to_end(&mut bytes).await.context("Reading trailer")?;
        codec.decode_trailer(&bytes)
    }

    /// Writes the encoded trailer to `out`, then flushes and closes it.
    ///
    /// Returns only after the writer has confirmed both.
    ///
    /// # Errors
    /// * [`EnvelopeError::MisconfiguredCodec`] when encryption is disabled.
    /// * [`EnvelopeError::InvalidTrailer`] on wrong field lengths.
    /// * [`EnvelopeError::Io`] on write failure.
    pub async fn append_trailer<W>(
        &self,
        out: &mut W,
        auth_tag: &[u8],
        nonce: &[u8],
    ) -> Result<(), EnvelopeError>
    where
        W: AsyncWrite + Unpin,
    {
        let trailer = self.codec().context("Appending trailer")?.encode_trailer(auth_tag, nonce)?;
        out.write_all(&trailer).await.context("Appending trailer")?;
        out.flush().await.context("Flushing trailer")?;
        out.shutdown().await.context("Closing trailer writer")?;
        Ok(())
    }

    /// `true` when encryption is enabled and `marker` is the codec's marker.
    #[must_use]
    pub fn is_trailer_valid(&self, marker: &str) -> bool {
        self.codec.as_ref().is_some_and(|codec| codec.has_envelope(marker))
    }
}
