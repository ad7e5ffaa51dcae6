// ============================================================================
// observable-collections - Errors
// ============================================================================

use thiserror::Error;

/// Precondition violations surfaced by the collections.
///
/// Contention outcomes (`try_add` losing a race, removing an absent key) are
/// not errors; those operations return `bool` or `Option`.
#[derive(Debug, Error)]
pub enum CollectionError {
    /// The configured key could not be read from a value.
    #[error("key `{field}` is missing or null")]
    MissingKey {
        /// Name of the key field (or `"key"` for closure extractors).
        field: String,
    },

    /// An argument the operation cannot work with.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A value could not be converted to or from its JSON form.
    #[error("json conversion failed: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = CollectionError> = std::result::Result<T, E>;
