//! Streaming authenticated-encryption envelopes for stored files.
//!
//! A sealed file is the ciphertext of its content followed by a fixed-length trailer:
//!
//! ```text
//! [CIPHERTEXT(N)][AUTH_TAG(16)][NONCE(12)]["ENCRYPTED"(9)]
//! ```
//!
//! The trailer is located purely by offsets from the end of the file, so recovering the
//! nonce and tag is a single bounded read at the tail. Files without the marker are
//! plaintext, which keeps storage readable across enabling encryption.
//!
//! ## Codecs
//!
//! * [`Algorithm::ChaCha20Poly1305`]: RFC 8439.
//! * [`Algorithm::Aes256Gcm`]: AES-256 in Galois/Counter mode.
//!
//! Both are built from their stream-cipher and universal-hash halves so that a file can be
//! encrypted chunk by chunk while it is written. The output (ciphertext and tag) is identical
//! to the one-shot AEAD with empty associated data.
//!
//! ## Nonce Policy
//!
//! Every file gets a fresh random 96-bit nonce from the operating system RNG. This is the
//! usual practice for both AEADs but it is probabilistic; rotate keys well before 2^32 files.
//!
//! ## Example
//!
//! ```rust
//! use stowage_envelope::prelude::*;
//!
//! # fn main() -> Result<(), EnvelopeError> {
//! let encryptor = FileEncryptor::with_codec(Algorithm::Aes256Gcm.codec(SecretKey::generate()?));
//!
//! let (nonce, mut sealer) = encryptor.begin_encryption()?;
//! let mut body = b"hello world".to_vec();
//! sealer.apply(&mut body)?;
//! let tag = sealer.finalize();
//!
//! let mut opener = encryptor.begin_decryption(&nonce, &tag)?;
//! opener.apply(&mut body)?;
//! opener.finalize()?;
//! assert_eq!(body, b"hello world");
//! # Ok(())
//! # }
//! ```

mod algorithm;
mod chacha;
mod codec;
mod encryptor;
mod error;
mod gcm;
mod key;
mod mac;
mod reader;

pub use algorithm::Algorithm;
pub use codec::{EnvelopeCodec, MARKER, OpeningCipher, SealingCipher, StreamTransform, Trailer};
pub use encryptor::FileEncryptor;
pub use error::{EnvelopeError, EnvelopeErrorExt};
pub use key::{KEY_LEN, SecretKey};
pub use reader::DecryptingReader;

pub mod prelude {
    pub use crate::algorithm::Algorithm;
    pub use crate::codec::{EnvelopeCodec, OpeningCipher, SealingCipher, StreamTransform};
    pub use crate::encryptor::FileEncryptor;
    pub use crate::error::{EnvelopeError, EnvelopeErrorExt};
    pub use crate::key::SecretKey;
    pub use crate::reader::DecryptingReader;
}
