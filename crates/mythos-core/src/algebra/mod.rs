//! Mythic algebra: the bridge between myth records and dense matrices.
//!
//! A myth matrix is a `(1 + component_count) x D` dense matrix. Row 0 is
//! the myth's main embedding; row i (i >= 1) is the i-th component's
//! "combined" vector, `mytheme.embedding + offset`, stacked in component
//! insertion order. Weights are not encoded in the matrix -- they ride on
//! the myth record and stay fixed across decompose/recompute.
//!
//! Because a combined row alone cannot be split into base embedding and
//! offset, [`decompose`] yields combined vectors; the caller supplies
//! mytheme embeddings (from the mytheme store) to derive fresh offsets.

use std::collections::HashMap;

use mythos_types::error::StoreError;
use mythos_types::myth::Myth;
use mythos_types::mytheme::Mytheme;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dense row-major matrix with a fixed row width.
///
/// Construction rejects ragged rows and zero rows, so a value of this type
/// always has at least the main row and a consistent width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MythMatrix {
    rows: Vec<Vec<f32>>,
    dim: usize,
}

impl MythMatrix {
    /// Build a matrix from rows. The first row is the main embedding row.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self, StoreError> {
        let Some(first) = rows.first() else {
            return Err(StoreError::DimensionMismatch {
                expected: 1,
                actual: 0,
            });
        };
        let dim = first.len();
        for row in &rows {
            if row.len() != dim {
                return Err(StoreError::DimensionMismatch {
                    expected: dim,
                    actual: row.len(),
                });
            }
        }
        Ok(Self { rows, dim })
    }

    /// Row width (the embedding dimension D).
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of component rows (total rows minus the main row).
    pub fn component_count(&self) -> usize {
        self.rows.len() - 1
    }

    pub fn rows(&self) -> &[Vec<f32>] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> &[f32] {
        &self.rows[index]
    }
}

/// Result of [`decompose`]: the main row plus the combined component rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Decomposition {
    pub main_embedding: Vec<f32>,
    /// One `mytheme.embedding + offset` vector per component, in order.
    pub combined: Vec<Vec<f32>>,
}

/// Compose a myth and its resolved mythemes into a dense matrix.
///
/// Fails with `ReferenceNotFound` (naming every missing id) if a referenced
/// mytheme is absent from the map, and `DimensionMismatch` if any vector
/// width disagrees with the main embedding.
pub fn compose(myth: &Myth, mythemes: &HashMap<Uuid, Mytheme>) -> Result<MythMatrix, StoreError> {
    let dim = myth.main_embedding.len();

    let missing: Vec<Uuid> = myth
        .components
        .iter()
        .filter(|c| !mythemes.contains_key(&c.mytheme_id))
        .map(|c| c.mytheme_id)
        .collect();
    if !missing.is_empty() {
        return Err(StoreError::ReferenceNotFound { ids: missing });
    }

    let mut rows = Vec::with_capacity(1 + myth.components.len());
    rows.push(myth.main_embedding.clone());
    for component in &myth.components {
        let mytheme = &mythemes[&component.mytheme_id];
        if mytheme.embedding.len() != dim || component.offset.len() != dim {
            return Err(StoreError::DimensionMismatch {
                expected: dim,
                actual: mytheme.embedding.len().max(component.offset.len()),
            });
        }
        let combined: Vec<f32> = mytheme
            .embedding
            .iter()
            .zip(&component.offset)
            .map(|(e, o)| e + o)
            .collect();
        rows.push(combined);
    }

    MythMatrix::from_rows(rows)
}

/// Decompose a matrix back into the main embedding and combined rows.
///
/// Exact left inverse of [`compose`] for well-formed input. Fails with
/// `DimensionMismatch` if the row count disagrees with the declared
/// component count.
pub fn decompose(
    matrix: &MythMatrix,
    component_count: usize,
) -> Result<Decomposition, StoreError> {
    if matrix.row_count() != component_count + 1 {
        return Err(StoreError::DimensionMismatch {
            expected: component_count + 1,
            actual: matrix.row_count(),
        });
    }
    Ok(Decomposition {
        main_embedding: matrix.row(0).to_vec(),
        combined: matrix.rows()[1..].to_vec(),
    })
}

/// Weighted sum of the combined component rows.
///
/// Used by callers deriving a fresh myth-level embedding from a matrix.
/// `weights` must have one entry per component row.
pub fn weighted_embedding(matrix: &MythMatrix, weights: &[f32]) -> Result<Vec<f32>, StoreError> {
    if weights.len() != matrix.component_count() {
        return Err(StoreError::DimensionMismatch {
            expected: matrix.component_count(),
            actual: weights.len(),
        });
    }
    let mut out = vec![0.0f32; matrix.dim()];
    for (weight, row) in weights.iter().zip(&matrix.rows()[1..]) {
        for (acc, value) in out.iter_mut().zip(row) {
            *acc += weight * value;
        }
    }
    Ok(out)
}
