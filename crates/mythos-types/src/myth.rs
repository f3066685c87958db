//! Myth types.
//!
//! A myth is a composite record: one main embedding plus an ordered list
//! of mytheme references, each carried with an offset vector and a
//! normalized weight. The component order is canonical -- position in the
//! list determines the matrix row during composition.
//!
//! Weights are caller-declared semantics. A component list whose weights
//! do not sum to 1.0 within [`WEIGHT_EPSILON`] is rejected with
//! `InvalidWeights`, never silently rescaled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::EmbeddingConfig;
use crate::error::StoreError;

/// Tolerance for the weight-sum invariant on non-empty component lists.
pub const WEIGHT_EPSILON: f64 = 1e-6;

/// One nested embedding reference inside a myth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MythComponent {
    /// Referenced mytheme. Must exist in the mytheme store at write time.
    pub mytheme_id: Uuid,
    /// Offset vector added to the mytheme embedding during composition.
    pub offset: Vec<f32>,
    /// Normalized contribution weight.
    pub weight: f32,
}

impl MythComponent {
    pub fn new(mytheme_id: Uuid, offset: Vec<f32>, weight: f32) -> Self {
        Self {
            mytheme_id,
            offset,
            weight,
        }
    }
}

/// A persisted myth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Myth {
    pub id: Uuid,
    pub main_embedding: Vec<f32>,
    /// Ordered component list; insertion order is the canonical order.
    pub components: Vec<MythComponent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert shape for a myth. The store assigns the id.
///
/// Constructed through [`NewMyth::new`], which enforces the dimension and
/// weight-sum invariants up front so malformed records are rejected at
/// construction time, not at first use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMyth {
    pub main_embedding: Vec<f32>,
    pub components: Vec<MythComponent>,
}

impl NewMyth {
    /// Build a validated insert shape.
    pub fn new(
        main_embedding: Vec<f32>,
        components: Vec<MythComponent>,
        config: &EmbeddingConfig,
    ) -> Result<Self, StoreError> {
        config.check_dimension(&main_embedding)?;
        validate_components(&components, config)?;
        Ok(Self {
            main_embedding,
            components,
        })
    }

    /// Re-check the invariants (the stores call this before every write).
    pub fn validate(&self, config: &EmbeddingConfig) -> Result<(), StoreError> {
        config.check_dimension(&self.main_embedding)?;
        validate_components(&self.components, config)
    }
}

/// Update shape for a myth.
///
/// `components`, when present, replaces the full component list -- there is
/// no partial patch of a single component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MythPatch {
    pub main_embedding: Option<Vec<f32>>,
    pub components: Option<Vec<MythComponent>>,
}

impl MythPatch {
    pub fn is_empty(&self) -> bool {
        self.main_embedding.is_none() && self.components.is_none()
    }

    /// Validate whichever fields are present.
    pub fn validate(&self, config: &EmbeddingConfig) -> Result<(), StoreError> {
        if let Some(main) = &self.main_embedding {
            config.check_dimension(main)?;
        }
        if let Some(components) = &self.components {
            validate_components(components, config)?;
        }
        Ok(())
    }
}

/// Validate offsets and the weight-sum invariant of a component list.
///
/// An empty list is valid. A non-empty list must have weights summing to
/// 1.0 within [`WEIGHT_EPSILON`].
pub fn validate_components(
    components: &[MythComponent],
    config: &EmbeddingConfig,
) -> Result<(), StoreError> {
    for component in components {
        config.check_dimension(&component.offset)?;
    }
    if components.is_empty() {
        return Ok(());
    }
    let sum: f64 = components.iter().map(|c| c.weight as f64).sum();
    if (sum - 1.0).abs() > WEIGHT_EPSILON {
        return Err(StoreError::InvalidWeights { sum });
    }
    Ok(())
}
