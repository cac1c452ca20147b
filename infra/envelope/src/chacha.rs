//! ChaCha20-Poly1305 (RFC 8439) composed from its primitives so the body can be
//! processed chunk by chunk.

use crate::algorithm::Algorithm;
use crate::codec::{
    EnvelopeCodec, OpeningCipher, SealingCipher, StreamTransform, check_fields, random_nonce,
};
use crate::error::EnvelopeError;
use crate::key::SecretKey;
use crate::mac::BlockMac;
use chacha20::ChaCha20;
use chacha20::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use poly1305::Poly1305;
use std::fmt;
use universal_hash::{KeyInit, UniversalHash};
use zeroize::Zeroize;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug)]
pub(crate) struct ChaChaCodec {
    key: SecretKey,
}

impl ChaChaCodec {
    pub(crate) const fn new(key: SecretKey) -> Self {
        Self { key }
    }

    fn stream(&self, nonce: &[u8]) -> Result<ChaChaStream, EnvelopeError> {
        let mut cipher = ChaCha20::new_from_slices(self.key.expose(), nonce).map_err(|_| {
            EnvelopeError::InvalidConfiguration {
                message: "ChaCha20 requires a 32-byte key and a 12-byte nonce".into(),
                context: None,
            }
        })?;

        // Block 0 keys Poly1305; the body starts at block 1.
        let mut mac_key = [0u8; 32];
        cipher.apply_keystream(&mut mac_key);
        let mac = Poly1305::new((&mac_key).into());
        mac_key.zeroize();
        cipher.seek(64u64);

        Ok(ChaChaStream { cipher, mac: BlockMac::new(mac) })
    }
}

impl EnvelopeCodec for ChaChaCodec {
    fn algorithm(&self) -> Algorithm {
        Algorithm::ChaCha20Poly1305
    }

    fn tag_len(&self) -> usize {
        TAG_LEN
    }

    fn nonce_len(&self) -> usize {
        NONCE_LEN
    }

    fn begin_encryption(&self) -> Result<(Vec<u8>, Box<dyn SealingCipher>), EnvelopeError> {
        let nonce = random_nonce::<NONCE_LEN>()?;
        let stream = self.stream(&nonce)?;
        Ok((nonce.to_vec(), Box::new(ChaChaSealer(stream))))
    }

    fn begin_decryption(
        &self,
        nonce: &[u8],
        auth_tag: &[u8],
    ) -> Result<Box<dyn OpeningCipher>, EnvelopeError> {
        check_fields(self, nonce, auth_tag)?;
        let mut expected = [0u8; TAG_LEN];
        expected.copy_from_slice(auth_tag);
        Ok(Box::new(ChaChaOpener { stream: self.stream(nonce)?, expected }))
    }
}

struct ChaChaStream {
    cipher: ChaCha20,
    mac: BlockMac<Poly1305>,
}

impl ChaChaStream {
    fn keystream(&mut self, chunk: &mut [u8]) -> Result<(), EnvelopeError> {
        self.cipher.try_apply_keystream(chunk).map_err(|_| EnvelopeError::Encryption {
            message: "ChaCha20 keystream exhausted (file exceeds 256 GiB)".into(),
            context: None,
        })
    }

    fn tag(self) -> universal_hash::Block<Poly1305> {
        let mut lengths = [0u8; 16];
        lengths[8..].copy_from_slice(&self.mac.total().to_le_bytes());
        self.mac.finish(lengths).finalize()
    }
}

struct ChaChaSealer(ChaChaStream);

impl StreamTransform for ChaChaSealer {
    fn apply(&mut self, chunk: &mut [u8]) -> Result<(), EnvelopeError> {
        self.0.keystream(chunk)?;
        self.0.mac.update(chunk);
        Ok(())
    }
}

impl SealingCipher for ChaChaSealer {
    fn finalize(self: Box<Self>) -> Vec<u8> {
        let Self(stream) = *self;
        stream.tag().to_vec()
    }
}

impl fmt::Debug for ChaChaSealer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChaChaSealer").field("processed", &self.0.mac.total()).finish()
    }
}

struct ChaChaOpener {
    stream: ChaChaStream,
    expected: [u8; TAG_LEN],
}

impl StreamTransform for ChaChaOpener {
    fn apply(&mut self, chunk: &mut [u8]) -> Result<(), EnvelopeError> {
        self.stream.mac.update(chunk);
        self.stream.keystream(chunk)
    }
}

impl OpeningCipher for ChaChaOpener {
    fn finalize(self: Box<Self>) -> Result<(), EnvelopeError> {
        let Self { stream, expected } = *self;
        let mut lengths = [0u8; 16];
        lengths[8..].copy_from_slice(&stream.mac.total().to_le_bytes());
        stream.mac.finish(lengths).verify((&expected).into()).map_err(|_| {
            EnvelopeError::Integrity {
                message: "ChaCha20-Poly1305 authentication tag mismatch".into(),
                context: None,
            }
        })
    }
}

impl fmt::Debug for ChaChaOpener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChaChaOpener").field("processed", &self.stream.mac.total()).finish()
    }
}
