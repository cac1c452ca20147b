#![allow(dead_code)]

use stowage_envelope::prelude::*;

/// A fixed test key so failures are reproducible.
pub const TEST_KEY: [u8; 32] = *b"stowage-test-key-0123456789abcde";

/// Builds an enabled encryptor for `algorithm` bound to [`TEST_KEY`].
#[must_use]
pub fn encryptor(algorithm: Algorithm) -> FileEncryptor {
    FileEncryptor::with_codec(algorithm.codec(SecretKey::from_bytes(TEST_KEY)))
}

/// Seals `plain` in `chunk`-sized pieces and returns the full on-disk layout.
///
/// # Panics
/// * If the encryptor is disabled.
#[must_use]
pub fn seal_file(encryptor: &FileEncryptor, plain: &[u8], chunk: usize) -> Vec<u8> {
    let codec = encryptor.codec().expect("encryptor must be enabled");
    let (nonce, mut sealer) = encryptor.begin_encryption().expect("begin encryption");
    let mut body = plain.to_vec();
    for part in body.chunks_mut(chunk.max(1)) {
        sealer.apply(part).expect("apply keystream");
    }
    let tag = sealer.finalize();
    body.extend(codec.encode_trailer(&tag, &nonce).expect("encode trailer"));
    body
}
