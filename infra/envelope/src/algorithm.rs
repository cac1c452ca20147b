use crate::chacha::ChaChaCodec;
use crate::codec::EnvelopeCodec;
use crate::error::EnvelopeError;
use crate::gcm::GcmCodec;
use crate::key::SecretKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Identifies an envelope codec in configuration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    #[default]
    #[serde(rename = "chacha20-poly1305")]
    ChaCha20Poly1305,
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
}

impl Algorithm {
    pub const ALL: [Self; 2] = [Self::ChaCha20Poly1305, Self::Aes256Gcm];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ChaCha20Poly1305 => "chacha20-poly1305",
            Self::Aes256Gcm => "aes-256-gcm",
        }
    }

    /// Builds the codec for this algorithm, bound to `key`.
    #[must_use]
    pub fn codec(self, key: SecretKey) -> Arc<dyn EnvelopeCodec> {
        match self {
            Self::ChaCha20Poly1305 => Arc::new(ChaChaCodec::new(key)),
            Self::Aes256Gcm => Arc::new(GcmCodec::new(key)),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = EnvelopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|alg| alg.as_str() == normalized).ok_or_else(|| {
            EnvelopeError::InvalidConfiguration {
                message: format!("Unknown encryption algorithm '{s}'").into(),
                context: None,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_identifiers() {
        assert_eq!("chacha20-poly1305".parse::<Algorithm>().unwrap(), Algorithm::ChaCha20Poly1305);
        assert_eq!(" AES-256-GCM ".parse::<Algorithm>().unwrap(), Algorithm::Aes256Gcm);
        assert!("rot13".parse::<Algorithm>().is_err());
    }

    #[test]
    fn serde_names_match_display() {
        for alg in Algorithm::ALL {
            let json = serde_json::to_string(&alg).unwrap();
            assert_eq!(json, format!("\"{alg}\""));
            let back: Algorithm = serde_json::from_str(&json).unwrap();
            assert_eq!(back, alg);
        }
    }

    #[test]
    fn codec_reports_its_algorithm() {
        for alg in Algorithm::ALL {
            let codec = alg.codec(SecretKey::from_bytes([1; 32]));
            assert_eq!(codec.algorithm(), alg);
            assert_eq!(codec.trailer_len(), 37);
        }
    }
}
