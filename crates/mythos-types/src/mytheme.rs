//! Mytheme types.
//!
//! A mytheme is an atomic embedding unit with its own id and vector,
//! reusable across many myths. Mythemes are shared, independently
//! lifecycled entities: myths reference them but never own them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::EmbeddingConfig;
use crate::error::StoreError;

/// A persisted mytheme.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mytheme {
    pub id: Uuid,
    /// Fixed-length embedding vector (dimension set by `EmbeddingConfig`).
    pub embedding: Vec<f32>,
    /// Optional key-value metadata, stored as JSON.
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert shape for a mytheme. The store assigns the id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMytheme {
    pub embedding: Vec<f32>,
    pub metadata: Option<serde_json::Value>,
}

impl NewMytheme {
    pub fn new(embedding: Vec<f32>) -> Self {
        Self {
            embedding,
            metadata: None,
        }
    }

    pub fn with_metadata(embedding: Vec<f32>, metadata: serde_json::Value) -> Self {
        Self {
            embedding,
            metadata: Some(metadata),
        }
    }

    /// Validate the embedding against the configured dimension.
    pub fn validate(&self, config: &EmbeddingConfig) -> Result<(), StoreError> {
        config.check_dimension(&self.embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_mytheme_validate() {
        let config = EmbeddingConfig::new(4);
        let ok = NewMytheme::new(vec![0.1, 0.2, 0.3, 0.4]);
        assert!(ok.validate(&config).is_ok());

        let bad = NewMytheme::new(vec![0.1, 0.2]);
        assert!(matches!(
            bad.validate(&config),
            Err(StoreError::DimensionMismatch { expected: 4, actual: 2 })
        ));
    }

    #[test]
    fn test_mytheme_serialize_metadata() {
        let m = NewMytheme::with_metadata(
            vec![0.0; 4],
            serde_json::json!({"name": "the flood"}),
        );
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("the flood"));
    }
}
