//! Error types for map-sync
//!
//! ## Table of Contents
//! - **MapError**: Main error enum covering all failure modes
//! - **Result**: Type alias for `Result<T, MapError>`
//!
//! Stale entity operations and incomplete coordinates are not errors:
//! they are logged at trace level and skipped.

use thiserror::Error;

/// Result type alias for map-sync operations
pub type Result<T> = std::result::Result<T, MapError>;

/// Main error type for map-sync operations
///
/// `Clone` because a single rejection (e.g. a failed engine bootstrap) is
/// delivered to every operation waiting on the same deferred value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MapError {
    /// Engine script failed to load or the map could not be constructed
    #[error("bootstrap failure: {0}")]
    Bootstrap(String),

    /// Structural misuse of an entity, raised at configuration time
    #[error("misconfigured entity: {0}")]
    Misconfigured(String),

    /// The engine refused to construct or mutate a native object
    #[error("engine error: {0}")]
    Engine(String),

    /// Builder was given an incomplete configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// A deferred value was dropped before it was settled
    #[error("abandoned: {0}")]
    Abandoned(String),

    /// The main task queue is no longer running
    #[error("zone closed")]
    ZoneClosed,
}

impl MapError {
    /// Create a bootstrap error
    pub fn bootstrap(msg: impl Into<String>) -> Self {
        Self::Bootstrap(msg.into())
    }

    /// Create a misconfiguration error
    pub fn misconfigured(msg: impl Into<String>) -> Self {
        Self::Misconfigured(msg.into())
    }

    /// Create an engine error
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an abandoned error
    pub fn abandoned(msg: impl Into<String>) -> Self {
        Self::Abandoned(msg.into())
    }

    /// Whether this error means the engine never came up
    pub fn is_bootstrap(&self) -> bool {
        matches!(self, Self::Bootstrap(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            MapError::bootstrap("script 404").to_string(),
            "bootstrap failure: script 404"
        );
        assert_eq!(MapError::ZoneClosed.to_string(), "zone closed");
    }

    #[test]
    fn test_is_bootstrap() {
        assert!(MapError::bootstrap("x").is_bootstrap());
        assert!(!MapError::engine("x").is_bootstrap());
    }
}
