use crate::error::EnvelopeError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use getrandom::fill;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of the pre-shared symmetric key in bytes.
pub const KEY_LEN: usize = 32;

/// The pre-shared 256-bit key bound into every cipher context.
///
/// The bytes are wiped on drop and never printed by `Debug`.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; KEY_LEN]);

impl SecretKey {
    #[must_use]
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Decodes a standard base64 string holding exactly 32 bytes.
    ///
    /// # Errors
    /// Returns [`EnvelopeError::InvalidConfiguration`] for malformed base64 or a wrong length.
    pub fn from_base64(encoded: &str) -> Result<Self, EnvelopeError> {
        let mut decoded = STANDARD.decode(encoded.trim()).map_err(|e| {
            EnvelopeError::InvalidConfiguration {
                message: format!("Encryption key is not valid base64: {e}").into(),
                context: None,
            }
        })?;

        let result = <[u8; KEY_LEN]>::try_from(decoded.as_slice()).map(Self).map_err(|_| {
            EnvelopeError::InvalidConfiguration {
                message: format!("Encryption key must be {KEY_LEN} bytes, got {}", decoded.len())
                    .into(),
                context: None,
            }
        });
        decoded.zeroize();
        result
    }

    /// Draws a fresh key from the operating system RNG.
    ///
    /// # Errors
    /// Returns [`EnvelopeError::Encryption`] if the system RNG is unavailable.
    pub fn generate() -> Result<Self, EnvelopeError> {
        let mut bytes = [0u8; KEY_LEN];
        fill(&mut bytes).map_err(|e| EnvelopeError::Encryption {
            message: format!("System RNG unavailable: {e}").into(),
            context: Some("Generating key".into()),
        })?;
        Ok(Self(bytes))
    }

    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub(crate) const fn expose(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_round_trip() {
        let key = SecretKey::generate().unwrap();
        let restored = SecretKey::from_base64(&key.to_base64()).unwrap();
        assert_eq!(key.expose(), restored.expose());
    }

    #[test]
    fn rejects_wrong_length() {
        let short = STANDARD.encode([7u8; 16]);
        let err = SecretKey::from_base64(&short).unwrap_err();
        assert!(matches!(err, EnvelopeError::InvalidConfiguration { .. }));
        assert!(err.to_string().contains("got 16"));
    }

    #[test]
    fn rejects_garbage() {
        assert!(SecretKey::from_base64("not base64 at all!").is_err());
    }

    #[test]
    fn debug_is_redacted() {
        let key = SecretKey::from_bytes([0xAB; KEY_LEN]);
        let printed = format!("{key:?}");
        assert_eq!(printed, "SecretKey(<redacted>)");
        assert!(!printed.contains("171"));
    }
}
