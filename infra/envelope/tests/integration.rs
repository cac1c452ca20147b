mod fixtures;

use fixtures::{TEST_KEY, encryptor, seal_file};
use std::collections::HashSet;
use stowage_envelope::prelude::*;
use tokio::io::AsyncReadExt;

async fn open_streaming(
    encryptor: &FileEncryptor,
    file: &[u8],
) -> Result<Vec<u8>, std::io::Error> {
    let size = file.len() as u64;
    let start = usize::try_from(encryptor.trailer_start(size)).expect("fits in memory");
    let trailer = encryptor.read_trailer(&file[start..]).await.map_err(EnvelopeError::into_io)?;
    assert!(encryptor.is_trailer_valid(&trailer.marker));

    let end = usize::try_from(encryptor.ciphertext_end(size)).expect("fits in memory");
    let opener = encryptor
        .begin_decryption(&trailer.nonce, &trailer.auth_tag)
        .map_err(EnvelopeError::into_io)?;

    let mut plain = Vec::new();
    DecryptingReader::new(&file[..end], opener).read_to_end(&mut plain).await?;
    Ok(plain)
}

#[test]
fn nonces_do_not_repeat() {
    for algorithm in Algorithm::ALL {
        let encryptor = encryptor(algorithm);
        let mut seen = HashSet::with_capacity(10_000);
        for _ in 0..10_000 {
            let (nonce, _cipher) = encryptor.begin_encryption().unwrap();
            assert_eq!(nonce.len(), 12);
            assert!(seen.insert(nonce), "nonce repeated for {algorithm}");
        }
    }
}

#[tokio::test]
async fn hello_world_envelope_is_48_bytes() {
    for algorithm in Algorithm::ALL {
        let encryptor = encryptor(algorithm);
        let file = seal_file(&encryptor, b"hello world", 4);

        assert_eq!(file.len(), 48);
        assert_eq!(&file[39..], b"ENCRYPTED");
        assert_eq!(open_streaming(&encryptor, &file).await.unwrap(), b"hello world");
    }
}

#[tokio::test]
async fn wrong_key_fails_verification() {
    let writer = encryptor(Algorithm::ChaCha20Poly1305);
    let file = seal_file(&writer, b"secret contents", 8);

    let mut other_key = TEST_KEY;
    other_key[0] ^= 0xFF;
    let reader = FileEncryptor::with_codec(
        Algorithm::ChaCha20Poly1305.codec(SecretKey::from_bytes(other_key)),
    );

    let err = open_streaming(&reader, &file).await.unwrap_err();
    let envelope = EnvelopeError::from_io(err).expect("envelope error");
    assert!(matches!(envelope, EnvelopeError::Integrity { .. }));
}

#[tokio::test]
async fn algorithms_are_not_interchangeable() {
    let file = seal_file(&encryptor(Algorithm::Aes256Gcm), &[1u8; 300], 100);
    let err = open_streaming(&encryptor(Algorithm::ChaCha20Poly1305), &file).await.unwrap_err();
    assert!(EnvelopeError::from_io(err).unwrap().is_integrity_failure());
}

#[tokio::test]
async fn large_bodies_stream_through() {
    let encryptor = encryptor(Algorithm::Aes256Gcm);
    let plain: Vec<u8> = (0..300_000u32).map(|i| (i % 253) as u8).collect();
    let file = seal_file(&encryptor, &plain, 64 * 1024);

    assert_eq!(open_streaming(&encryptor, &file).await.unwrap(), plain);
}
