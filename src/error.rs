//! # Error Types for the Router
//!
//! This module defines the error taxonomy used throughout the router. It provides a small,
//! closed set of error variants so that callers can match on failure kind instead of parsing
//! messages.
//!
//! ## Error Categories
//!
//! - **Registration errors**: `InvalidPattern`, `InvalidMethod`, `NilHandler`, `DuplicateRoute`,
//!   `Conflict` — all returned synchronously from the registration API and never leave the router
//!   state partially modified.
//! - **Internal errors**: `InternalError` — reported when an invariant the router maintains
//!   itself (e.g. double-array capacity) would otherwise be violated. These are surfaced to the
//!   caller, never panicked.
//!
//! ## Usage
//!
//! ```
//! use triegate::{Result, RouterError};
//!
//! fn example() -> Result<()> {
//!     Err(RouterError::InvalidMethod("TRACE".to_string()))
//! }
//! ```

use thiserror::Error;

/// Errors that can occur when registering routes or resolving a request.
///
/// Registration-time variants are returned directly to the caller of the registration API.
/// `InternalError` is the only variant that can also surface from match-time code, and only
/// when an internal bookkeeping invariant (trie capacity, shard indexing) would be violated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    /// The pattern is not well-formed: empty, missing leading slash, an invalid literal
    /// character, a duplicate parameter name, or a leading wildcard segment.
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    /// The method string is not one of the seven recognized verbs.
    #[error("invalid method: {0}")]
    InvalidMethod(String),

    /// A `nil`/absent handler was supplied to a registration call.
    #[error("handler must not be nil")]
    NilHandler,

    /// The exact (method, path) is already registered and override mode is disabled.
    #[error("duplicate route: {0}")]
    DuplicateRoute(String),

    /// Registering this pattern would create an ambiguous match at an existing depth, e.g. a
    /// literal child mixed with a dynamic child, or a dynamic pattern colliding with an
    /// already-installed static route.
    #[error("conflicting route: {0}")]
    Conflict(String),

    /// An internal bookkeeping invariant could not be preserved (e.g. double-array growth
    /// exceeded the hard cap). Never panics the process.
    #[error("internal router error: {0}")]
    InternalError(String),
}

/// Result type used throughout the router's public and internal APIs.
pub type Result<T> = std::result::Result<T, RouterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_stable() {
        assert_eq!(
            RouterError::InvalidMethod("TRACE".into()).to_string(),
            "invalid method: TRACE"
        );
        assert_eq!(RouterError::NilHandler.to_string(), "handler must not be nil");
    }
}
