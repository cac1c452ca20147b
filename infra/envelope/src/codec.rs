//! # Codec
//!
//! The capability set every envelope algorithm implements, plus the fixed-offset
//! trailer framing shared by all of them.
//!
//! ```text
//! [CIPHERTEXT(N)][AUTH_TAG(tag_len)][NONCE(nonce_len)][MARKER(9)]
//! ```

use crate::algorithm::Algorithm;
use crate::error::EnvelopeError;
use getrandom::fill;
use std::fmt::Debug;

/// ASCII marker closing every envelope trailer.
pub const MARKER: &[u8] = b"ENCRYPTED";

/// An in-place chunk transform applied while a file streams through a pipeline.
pub trait StreamTransform: Send {
    /// Transforms `chunk` in place. Chunks may have any length, including zero.
    ///
    /// # Errors
    /// Returns [`EnvelopeError::Encryption`] when the keystream is exhausted.
    fn apply(&mut self, chunk: &mut [u8]) -> Result<(), EnvelopeError>;
}

/// The encrypting half of a streaming AEAD.
pub trait SealingCipher: StreamTransform + Debug {
    /// Consumes the cipher and returns the authentication tag over everything applied.
    fn finalize(self: Box<Self>) -> Vec<u8>;
}

/// The decrypting half of a streaming AEAD, bound to an expected tag.
pub trait OpeningCipher: StreamTransform + Debug {
    /// Consumes the cipher and checks the expected tag in constant time.
    ///
    /// # Errors
    /// Returns [`EnvelopeError::Integrity`] on tag mismatch.
    fn finalize(self: Box<Self>) -> Result<(), EnvelopeError>;
}

/// Decoded trailer fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trailer {
    pub auth_tag: Vec<u8>,
    pub nonce: Vec<u8>,
    pub marker: String,
}

/// One envelope algorithm: its field lengths and cipher constructors.
///
/// Framing helpers are provided on top of [`tag_len`](EnvelopeCodec::tag_len),
/// [`nonce_len`](EnvelopeCodec::nonce_len) and [`marker`](EnvelopeCodec::marker),
/// so a codec only has to supply the cipher pair.
pub trait EnvelopeCodec: Debug + Send + Sync {
    fn algorithm(&self) -> Algorithm;

    fn tag_len(&self) -> usize;

    fn nonce_len(&self) -> usize;

    fn marker(&self) -> &'static [u8] {
        MARKER
    }

    /// Draws a fresh random nonce and returns it with an encrypting cipher bound to it.
    ///
    /// # Errors
    /// Returns [`EnvelopeError::Encryption`] if the system RNG is unavailable.
    fn begin_encryption(&self) -> Result<(Vec<u8>, Box<dyn SealingCipher>), EnvelopeError>;

    /// Builds a decrypting cipher that will verify `auth_tag` when finalized.
    ///
    /// # Errors
    /// Returns [`EnvelopeError::InvalidTrailer`] if the nonce or tag length is wrong.
    fn begin_decryption(
        &self,
        nonce: &[u8],
        auth_tag: &[u8],
    ) -> Result<Box<dyn OpeningCipher>, EnvelopeError>;

    fn trailer_len(&self) -> usize {
        self.tag_len() + self.nonce_len() + self.marker().len()
    }

    /// Concatenates `auth_tag || nonce || marker`.
    ///
    /// # Errors
    /// Returns [`EnvelopeError::InvalidTrailer`] if a field has the wrong length.
    fn encode_trailer(&self, auth_tag: &[u8], nonce: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        check_len("authentication tag", auth_tag.len(), self.tag_len())?;
        check_len("nonce", nonce.len(), self.nonce_len())?;

        let mut trailer = Vec::with_capacity(self.trailer_len());
        trailer.extend_from_slice(auth_tag);
        trailer.extend_from_slice(nonce);
        trailer.extend_from_slice(self.marker());
        Ok(trailer)
    }

    /// Splits trailer bytes at the codec's fixed offsets.
    ///
    /// # Errors
    /// * [`EnvelopeError::TruncatedEnvelope`] if fewer than [`trailer_len`](EnvelopeCodec::trailer_len) bytes are given.
    /// * [`EnvelopeError::InvalidTrailer`] if more bytes are given.
    fn decode_trailer(&self, bytes: &[u8]) -> Result<Trailer, EnvelopeError> {
        let expected = self.trailer_len();
        if bytes.len() < expected {
            return Err(EnvelopeError::TruncatedEnvelope {
                expected,
                actual: bytes.len(),
                context: None,
            });
        }
        check_len("trailer", bytes.len(), expected)?;

        let (auth_tag, rest) = bytes.split_at(self.tag_len());
        let (nonce, marker) = rest.split_at(self.nonce_len());
        Ok(Trailer {
            auth_tag: auth_tag.to_vec(),
            nonce: nonce.to_vec(),
            marker: String::from_utf8_lossy(marker).into_owned(),
        })
    }

    fn has_envelope(&self, marker: &str) -> bool {
        marker.as_bytes() == self.marker()
    }

    /// Exclusive end of the ciphertext region, clamped at zero.
    fn ciphertext_end(&self, file_size: u64) -> u64 {
        file_size.saturating_sub(self.trailer_len() as u64)
    }

    /// First byte of the trailer region, clamped at zero.
    fn trailer_start(&self, file_size: u64) -> u64 {
        file_size.saturating_sub(self.trailer_len() as u64)
    }
}

fn check_len(field: &'static str, actual: usize, expected: usize) -> Result<(), EnvelopeError> {
    if actual == expected {
        Ok(())
    } else {
        Err(EnvelopeError::InvalidTrailer {
            message: format!("{field} must be {expected} bytes, got {actual}").into(),
            context: None,
        })
    }
}

/// Checks the lengths handed to `begin_decryption`.
pub(crate) fn check_fields(
    codec: &dyn EnvelopeCodec,
    nonce: &[u8],
    auth_tag: &[u8],
) -> Result<(), EnvelopeError> {
    check_len("nonce", nonce.len(), codec.nonce_len())?;
    check_len("authentication tag", auth_tag.len(), codec.tag_len())
}

pub(crate) fn random_nonce<const N: usize>() -> Result<[u8; N], EnvelopeError> {
    let mut nonce = [0u8; N];
    fill(&mut nonce).map_err(|e| EnvelopeError::Encryption {
        message: format!("System RNG unavailable for nonce generation: {e}").into(),
        context: None,
    })?;
    Ok(nonce)
}
