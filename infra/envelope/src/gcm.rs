//! AES-256-GCM composed from AES-CTR and GHASH so the body can be processed
//! chunk by chunk.

use crate::algorithm::Algorithm;
use crate::codec::{
    EnvelopeCodec, OpeningCipher, SealingCipher, StreamTransform, check_fields, random_nonce,
};
use crate::error::EnvelopeError;
use crate::key::SecretKey;
use crate::mac::BlockMac;
use aes::Aes256;
use aes::cipher::{BlockEncrypt, KeyInit, KeyIvInit, StreamCipher};
use ghash::GHash;
use std::fmt;
use universal_hash::UniversalHash;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

type Aes256Ctr = ctr::Ctr32BE<Aes256>;

#[derive(Debug)]
pub(crate) struct GcmCodec {
    key: SecretKey,
}

impl GcmCodec {
    pub(crate) const fn new(key: SecretKey) -> Self {
        Self { key }
    }

    fn stream(&self, nonce: &[u8]) -> Result<GcmStream, EnvelopeError> {
        let misconfigured = |_| EnvelopeError::InvalidConfiguration {
            message: "AES-256-GCM requires a 32-byte key and a 12-byte nonce".into(),
            context: None,
        };

        let block_cipher = Aes256::new_from_slice(self.key.expose()).map_err(misconfigured)?;
        let mut hash_key = ghash::Key::default();
        block_cipher.encrypt_block(&mut hash_key);
        let mac = GHash::new(&hash_key);

        // J0 = nonce || 0x00000001 for 96-bit nonces.
        let mut j0 = [0u8; 16];
        j0[..NONCE_LEN].copy_from_slice(nonce);
        j0[15] = 1;

        let mut ctr = Aes256Ctr::new_from_slices(self.key.expose(), &j0).map_err(misconfigured)?;
        let mut tag_mask = [0u8; TAG_LEN];
        ctr.apply_keystream(&mut tag_mask);

        Ok(GcmStream { ctr, mac: BlockMac::new(mac), tag_mask })
    }
}

impl EnvelopeCodec for GcmCodec {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Aes256Gcm
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
        Ok((nonce.to_vec(), Box::new(GcmSealer(stream))))
    }

    fn begin_decryption(
        &self,
        nonce: &[u8],
        auth_tag: &[u8],
    ) -> Result<Box<dyn OpeningCipher>, EnvelopeError> {
        check_fields(self, nonce, auth_tag)?;
        let stream = self.stream(nonce)?;

        // Compare GHASH against tag ^ E(J0) so verification stays constant time.
        let mut expected = [0u8; TAG_LEN];
        for ((out, tag), mask) in expected.iter_mut().zip(auth_tag).zip(stream.tag_mask) {
            *out = tag ^ mask;
        }
        Ok(Box::new(GcmOpener { stream, expected }))
    }
}

struct GcmStream {
    ctr: Aes256Ctr,
    mac: BlockMac<GHash>,
    tag_mask: [u8; TAG_LEN],
}

impl GcmStream {
    fn keystream(&mut self, chunk: &mut [u8]) -> Result<(), EnvelopeError> {
        self.ctr.try_apply_keystream(chunk).map_err(|_| EnvelopeError::Encryption {
            message: "AES-CTR keystream exhausted (file exceeds 64 GiB)".into(),
            context: None,
        })
    }

    fn lengths(&self) -> [u8; 16] {
        let mut lengths = [0u8; 16];
        lengths[8..].copy_from_slice(&(self.mac.total() * 8).to_be_bytes());
        lengths
    }
}

struct GcmSealer(GcmStream);

impl StreamTransform for GcmSealer {
    fn apply(&mut self, chunk: &mut [u8]) -> Result<(), EnvelopeError> {
        self.0.keystream(chunk)?;
        self.0.mac.update(chunk);
        Ok(())
    }
}

impl SealingCipher for GcmSealer {
    fn finalize(self: Box<Self>) -> Vec<u8> {
        let Self(stream) = *self;
        let lengths = stream.lengths();
        let mask = stream.tag_mask;
        let mut tag = stream.mac.finish(lengths).finalize();
        for (byte, mask) in tag.iter_mut().zip(mask) {
            *byte ^= mask;
        }
        tag.to_vec()
    }
}

impl fmt::Debug for GcmSealer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcmSealer").field("processed", &self.0.mac.total()).finish()
    }
}

struct GcmOpener {
    stream: GcmStream,
    expected: [u8; TAG_LEN],
}

impl StreamTransform for GcmOpener {
    fn apply(&mut self, chunk: &mut [u8]) -> Result<(), EnvelopeError> {
        self.stream.mac.update(chunk);
        self.stream.keystream(chunk)
    }
}

impl OpeningCipher for GcmOpener {
    fn finalize(self: Box<Self>) -> Result<(), EnvelopeError> {
        let Self { stream, expected } = *self;
        let lengths = stream.lengths();
        stream.mac.finish(lengths).verify((&expected).into()).map_err(|_| {
            EnvelopeError::Integrity {
                message: "AES-256-GCM authentication tag mismatch".into(),
                context: None,
            }
        })
    }
}

impl fmt::Debug for GcmOpener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcmOpener").field("processed", &self.stream.mac.total()).finish()
    }
}
