//! # Envelope Errors
//!
//! This module defines the [`EnvelopeError`] enum used throughout the envelope crate
//! for reporting cryptographic, framing and configuration failures.

use std::borrow::Cow;
use std::io;

/// A specialized [`EnvelopeError`] enum for envelope-related failures.
#[stowage_derive::stowage_error]
pub enum EnvelopeError {
    /// Failure while producing ciphertext (RNG outage, keystream exhausted).
    #[error("Encryption error{}: {message}", format_context(.context))]
    Encryption { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The authentication tag did not match the ciphertext.
    ///
    /// This indicates a wrong key, a tampered file or a corrupted trailer.
    #[error("Integrity check failed{}: {message}", format_context(.context))]
    Integrity { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The trailer read returned fewer bytes than the codec's fixed trailer length.
    #[error("Truncated envelope{}: expected {expected} bytes, got {actual}", format_context(.context))]
    TruncatedEnvelope { expected: usize, actual: usize, context: Option<Cow<'static, str>> },

    /// Trailer fields have the wrong shape for the active codec.
    #[error("Invalid trailer{}: {message}", format_context(.context))]
    InvalidTrailer { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// An encryption operation was requested while no codec is configured.
    #[error("No encryption codec configured{}", format_context(.context))]
    MisconfiguredCodec { context: Option<Cow<'static, str>> },

    /// Invalid key material or algorithm identifier.
    #[error("Invalid configuration{}: {message}", format_context(.context))]
    InvalidConfiguration { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// I/O failure while reading or writing trailer bytes.
    #[error("IO error{}: {source}", format_context(.context))]
    Io { source: io::Error, context: Option<Cow<'static, str>> },
}

impl EnvelopeError {
    /// Returns `true` when the error means "the bytes are not what was sealed".
    #[must_use]
    pub const fn is_integrity_failure(&self) -> bool {
        matches!(self, Self::Integrity { .. } | Self::TruncatedEnvelope { .. })
    }

    /// Wraps the error for transport through an `AsyncRead`/`AsyncWrite` boundary.
    #[must_use]
    pub fn into_io(self) -> io::Error {
        match self {
            Self::Io { source, context: None } => source,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }

    /// Recovers an [`EnvelopeError`] previously wrapped by [`EnvelopeError::into_io`].
    ///
    /// Plain I/O errors are handed back unchanged in `Err`.
    pub fn from_io(err: io::Error) -> Result<Self, io::Error> {
        if !err.get_ref().is_some_and(|inner| inner.is::<Self>()) {
            return Err(err);
        }
        let kind = err.kind();
        match err.into_inner().map(|inner| inner.downcast::<Self>()) {
            Some(Ok(envelope)) => Ok(*envelope),
            Some(Err(inner)) => Err(io::Error::new(kind, inner)),
            None => Err(io::Error::from(kind)),
        }
    }
}
