//! Error taxonomy for scene mutation and resource loading

use thiserror::Error;

/// Result type for universe operations
pub type UniverseResult<T> = Result<T, UniverseError>;

/// Errors reported by scene mutation and query operations
///
/// Every factory and mutation operation validates all of its preconditions
/// before touching any state; on failure nothing has been mutated and one
/// of these variants is returned. There is no exception-style control flow
/// anywhere in the engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UniverseError {
    /// A required parameter was missing, empty, or out of configured bounds
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A referenced element or named resource does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// An insertion was rejected because the identity is already present
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// Product nesting would exceed the configured maximum level
    #[error("nesting level {level} exceeds the configured maximum of {max}")]
    DepthExceeded {
        /// The level the new or moved node would occupy
        level: u32,
        /// The configured maximum nesting level
        max: u32,
    },

    /// A loaded resource failed format validation
    #[error("resource invalid: {0}")]
    ResourceInvalid(String),
}
