mod fixtures;

use fixtures::{encryptor, seal_file};
use proptest::prelude::*;
use stowage_envelope::prelude::*;

fn open_file(encryptor: &FileEncryptor, file: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    let codec = encryptor.codec()?;
    let size = file.len() as u64;
    let start = usize::try_from(codec.trailer_start(size)).expect("fits in memory");
    let trailer = codec.decode_trailer(&file[start..])?;
    assert!(codec.has_envelope(&trailer.marker));

    let end = usize::try_from(codec.ciphertext_end(size)).expect("fits in memory");
    let mut body = file[..end].to_vec();
    let mut opener = codec.begin_decryption(&trailer.nonce, &trailer.auth_tag)?;
    opener.apply(&mut body)?;
    opener.finalize()?;
    Ok(body)
}

fn any_algorithm() -> impl Strategy<Value = Algorithm> {
    prop_oneof![Just(Algorithm::ChaCha20Poly1305), Just(Algorithm::Aes256Gcm)]
}

proptest! {
    #[test]
    fn sealed_files_open_to_the_original(
        algorithm in any_algorithm(),
        data in proptest::collection::vec(any::<u8>(), 0..4096),
        chunk in 1usize..700,
    ) {
        let encryptor = encryptor(algorithm);
        let file = seal_file(&encryptor, &data, chunk);

        prop_assert_eq!(file.len(), data.len() + 37);
        prop_assert_eq!(open_file(&encryptor, &file).unwrap(), data);
    }

    #[test]
    fn any_flipped_ciphertext_bit_is_detected(
        algorithm in any_algorithm(),
        data in proptest::collection::vec(any::<u8>(), 1..512),
        position in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let encryptor = encryptor(algorithm);
        let mut file = seal_file(&encryptor, &data, 64);
        let index = position.index(data.len());
        file[index] ^= 1 << bit;

        let err = open_file(&encryptor, &file).unwrap_err();
        prop_assert!(err.is_integrity_failure(), "unexpected error: {}", err);
    }

    #[test]
    fn trailer_encoding_is_reversible(
        algorithm in any_algorithm(),
        tag in proptest::array::uniform16(any::<u8>()),
        nonce in proptest::array::uniform12(any::<u8>()),
    ) {
        let encryptor = encryptor(algorithm);
        let codec = encryptor.codec().unwrap();
        let decoded = codec.decode_trailer(&codec.encode_trailer(&tag, &nonce).unwrap()).unwrap();

        prop_assert_eq!(decoded.auth_tag, tag.to_vec());
        prop_assert_eq!(decoded.nonce, nonce.to_vec());
        prop_assert_eq!(decoded.marker, "ENCRYPTED");
    }

    #[test]
    fn offsets_never_underflow(algorithm in any_algorithm(), size in 0u64..1_000_000) {
        let encryptor = encryptor(algorithm);
        let codec = encryptor.codec().unwrap();
        let trailer_len = codec.trailer_len() as u64;

        let start = codec.trailer_start(size);
        let end = codec.ciphertext_end(size);
        prop_assert!(start <= size);
        prop_assert!(end <= size);
        if size >= trailer_len {
            prop_assert_eq!(start + trailer_len, size);
            prop_assert_eq!(end, size - trailer_len);
        } else {
            prop_assert_eq!(start, 0);
            prop_assert_eq!(end, 0);
        }
    }
}
