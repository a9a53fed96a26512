//! Error types for counter operations.
//!
//! Two failure kinds exist: arguments rejected before any store access, and
//! failures reported by the store itself. A missing key or score is never an
//! error; it reads as zero.

use crate::store::StoreError;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TallyError>;

/// Top-level error for counter operations.
#[derive(Debug)]
pub enum TallyError {
    /// An argument was rejected before any store access.
    InvalidArgument(String),
    /// The store reported a failure. Forwarded unchanged; no retry is
    /// attempted and partial effects cannot be observed.
    Store(StoreError),
}

impl std::fmt::Display for TallyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TallyError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            TallyError::Store(e) => write!(f, "store error: {}", e),
        }
    }
}

impl std::error::Error for TallyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TallyError::Store(e) => Some(e),
            TallyError::InvalidArgument(_) => None,
        }
    }
}

impl From<StoreError> for TallyError {
    fn from(e: StoreError) -> Self {
        TallyError::Store(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_is_forwarded_as_source() {
        let err = TallyError::from(StoreError::Command("ERR boom".to_string()));
        assert!(matches!(err, TallyError::Store(_)));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_invalid_argument_display() {
        let err = TallyError::InvalidArgument("bad direction".to_string());
        assert_eq!(err.to_string(), "invalid argument: bad direction");
    }
}
