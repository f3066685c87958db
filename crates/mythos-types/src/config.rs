//! Embedding configuration for Mythos.
//!
//! The embedding dimension is process-wide configuration fixed at
//! schema-setup time. It is passed explicitly into every store and
//! connector constructor rather than read from ambient state, so
//! dimension-mismatch failures stay local and multiple dimensions are
//! testable in one process.

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Embedding-space configuration shared by all stores and connectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Number of scalar entries in every embedding and offset vector.
    #[serde(default = "default_dimension")]
    pub dimension: usize,
}

fn default_dimension() -> usize {
    384
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
        }
    }
}

impl EmbeddingConfig {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    /// Check that a vector has exactly the configured number of entries.
    pub fn check_dimension(&self, vector: &[f32]) -> Result<(), StoreError> {
        if vector.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}
