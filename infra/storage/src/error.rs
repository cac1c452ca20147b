use std::borrow::Cow;
use std::io;
use std::path::Path;
use stowage_envelope::EnvelopeError;

/// A specialized [`StorageError`] enum of this crate.
#[stowage_derive::stowage_error]
pub enum StorageError {
    #[error("Path traversal security violation{}: {message}", format_context(.context))]
    PathTraversalAttempt { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("File not found{}: {message}", format_context(.context))]
    FileNotFound { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Envelope failure{}: {source}", format_context(.context))]
    Envelope { source: EnvelopeError, context: Option<Cow<'static, str>> },

    #[error("Hardware I/O failure{}: {source}", format_context(.context))]
    Io { source: io::Error, context: Option<Cow<'static, str>> },

    #[error("Invalid input{}: {message}", format_context(.context))]
    InvalidInput { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Remote store failure{}: {message}", format_context(.context))]
    Remote { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Internal storage error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

impl StorageError {
    /// `true` when stored bytes failed authentication or the envelope was cut short.
    #[must_use]
    pub const fn is_integrity_failure(&self) -> bool {
        matches!(self, Self::Envelope { source, .. } if source.is_integrity_failure())
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::FileNotFound { .. })
    }

    pub(crate) fn not_found(path: &Path) -> Self {
        Self::FileNotFound { message: path.display().to_string().into(), context: None }
    }

    /// Maps an I/O error at `path`, turning `NotFound` into [`StorageError::FileNotFound`].
    pub(crate) fn from_fs(err: io::Error, path: &Path, action: &'static str) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            Self::FileNotFound {
                message: path.display().to_string().into(),
                context: Some(action.into()),
            }
        } else {
            Self::Io { source: err, context: Some(format!("{action}: {}", path.display()).into()) }
        }
    }

    /// Classifies an error raised by a byte stream.
    ///
    /// Decrypting streams report envelope failures as `InvalidData` I/O errors; those are
    /// unwrapped back into [`StorageError::Envelope`].
    pub(crate) fn from_stream(err: io::Error, action: &'static str) -> Self {
        match EnvelopeError::from_io(err) {
            Ok(source) => Self::Envelope { source, context: Some(action.into()) },
            Err(source) => Self::Io { source, context: Some(action.into()) },
        }
    }
}
