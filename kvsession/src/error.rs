//! Error types for session operations.

use common::StorageError;

/// Error type for session operations.
///
/// Synchronous and asynchronous entry points report exactly the same values,
/// so callers can match on [`Error::kind`] regardless of how they called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A configuration object was malformed or carried an unrecognized key.
    InvalidOption(String),

    /// The operation targeted a released iterator or snapshot, or a closed
    /// session.
    InvalidState(String),

    /// A key, value or range had an unsupported shape.
    InvalidInput(String),

    /// Stored bytes could not be decoded into the requested representation.
    Encoding(String),

    /// A failure reported by the storage engine, passed through verbatim.
    Engine(StorageError),
}

/// Classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidOption,
    InvalidState,
    InvalidInput,
    Encoding,
    EngineFailure,
}

impl Error {
    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidOption(_) => ErrorKind::InvalidOption,
            Error::InvalidState(_) => ErrorKind::InvalidState,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::Encoding(_) => ErrorKind::Encoding,
            Error::Engine(_) => ErrorKind::EngineFailure,
        }
    }

    pub(crate) fn session_closed() -> Self {
        Error::InvalidState("session is closed".to_string())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Engine(err) => Some(err),
            _ => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidOption(msg) => write!(f, "Invalid option: {}", msg),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            Error::Encoding(msg) => write!(f, "Encoding error: {}", msg),
            Error::Engine(err) => write!(f, "{}", err),
        }
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        Error::Engine(err)
    }
}

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_pass_engine_message_through_verbatim() {
        // given
        let engine_err = StorageError::Corruption("bad block in 000005.ldb".to_string());

        // when
        let err: Error = engine_err.clone().into();

        // then
        assert_eq!(err.kind(), ErrorKind::EngineFailure);
        assert_eq!(err.to_string(), engine_err.to_string());
        assert_eq!(err, Error::Engine(engine_err));
    }

    #[test]
    fn should_expose_engine_error_as_source() {
        let err = Error::Engine(StorageError::Io("disk full".to_string()));
        assert!(std::error::Error::source(&err).is_some());
        assert!(std::error::Error::source(&Error::session_closed()).is_none());
    }
}
