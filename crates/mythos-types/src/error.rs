use uuid::Uuid;

use thiserror::Error;

/// Errors from store and connector operations.
///
/// Validation variants (`DimensionMismatch`, `InvalidWeights`,
/// `ReferenceNotFound`) are always raised before any row is written.
/// `ConcurrentConflict` is retryable by the caller; the store never
/// auto-retries. `Transport` carries unrecoverable storage-engine failures
/// as-is.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("dimension mismatch: expected {expected} entries, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid weights: sum {sum} is not 1.0 within tolerance")]
    InvalidWeights { sum: f64 },

    #[error("not found: {}", format_ids(.ids))]
    NotFound { ids: Vec<Uuid> },

    #[error("dangling mytheme reference: {}", format_ids(.ids))]
    ReferenceNotFound { ids: Vec<Uuid> },

    #[error("schema not ready: run ensure_schema before store operations")]
    SchemaNotReady,

    #[error("concurrent conflict, retry the operation: {0}")]
    ConcurrentConflict(String),

    #[error("storage transport error: {0}")]
    Transport(String),
}

impl StoreError {
    /// Single-id convenience for `NotFound`.
    pub fn not_found(id: Uuid) -> Self {
        StoreError::NotFound { ids: vec![id] }
    }

    /// Single-id convenience for `ReferenceNotFound`.
    pub fn dangling_reference(id: Uuid) -> Self {
        StoreError::ReferenceNotFound { ids: vec![id] }
    }
}

fn format_ids(ids: &[Uuid]) -> String {
    ids.iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
