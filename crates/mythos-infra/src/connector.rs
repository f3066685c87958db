//! Mythic algebra connector.
//!
//! Bridges the per-record storage shape and the dense matrix shape used by
//! linear-algebra consumers. Composition reads through the reader pool;
//! `recompute_myth` is the critical path coupling both stores and runs its
//! reads and writes inside one transaction on the single writer connection,
//! so a concurrent mytheme update can never interleave between the fetch of
//! base embeddings and the write of new offsets.

use mythos_core::algebra::{self, MythMatrix};
use mythos_types::config::EmbeddingConfig;
use mythos_types::error::StoreError;
use mythos_types::myth::{Myth, MythComponent};
use uuid::Uuid;

use crate::sqlite::map_db_err;
use crate::sqlite::myth::{load_myths, replace_components, update_myth_row};
use crate::sqlite::mytheme::load_mythemes;
use crate::sqlite::pool::DatabasePool;

/// Couples the myth and mytheme stores for matrix composition and
/// recomputation.
pub struct MythicAlgebraConnector {
    pool: DatabasePool,
    config: EmbeddingConfig,
}

impl MythicAlgebraConnector {
    pub fn new(pool: DatabasePool, config: EmbeddingConfig) -> Self {
        Self { pool, config }
    }

    /// Compose one myth and its referenced mythemes into a dense matrix.
    pub async fn compose_myth(&self, myth_id: Uuid) -> Result<MythMatrix, StoreError> {
        let mut composed = self.compose_myths(std::slice::from_ref(&myth_id)).await?;
        Ok(composed.remove(0).1)
    }

    /// Compose many myths, fetching the union of referenced mythemes once.
    ///
    /// Results are in input order. Fails with `NotFound` for missing myths
    /// and `ReferenceNotFound` for dangling mytheme references.
    pub async fn compose_myths(
        &self,
        myth_ids: &[Uuid],
    ) -> Result<Vec<(Uuid, MythMatrix)>, StoreError> {
        let mut conn = self.pool.reader.acquire().await.map_err(map_db_err)?;
        let myths = load_myths(&mut conn, myth_ids, &self.config).await?;

        let missing: Vec<Uuid> = myth_ids
            .iter()
            .copied()
            .filter(|id| !myths.contains_key(id))
            .collect();
        if !missing.is_empty() {
            return Err(StoreError::NotFound { ids: missing });
        }

        let mut referenced: Vec<Uuid> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for myth in myths.values() {
            for component in &myth.components {
                if seen.insert(component.mytheme_id) {
                    referenced.push(component.mytheme_id);
                }
            }
        }
        let mythemes = load_mythemes(&mut conn, &referenced, &self.config).await?;

        let mut matrices = Vec::with_capacity(myth_ids.len());
        for id in myth_ids {
            let matrix = algebra::compose(&myths[id], &mythemes)?;
            matrices.push((*id, matrix));
        }
        Ok(matrices)
    }

    /// Decompose an updated matrix and write the myth back.
    ///
    /// New offsets are derived as `combined - mytheme.embedding` against the
    /// base embeddings read inside the same transaction; weights are held
    /// fixed; row 0 becomes the new main embedding. Returns the updated
    /// myth as persisted.
    pub async fn recompute_myth(
        &self,
        myth_id: Uuid,
        matrix: &MythMatrix,
    ) -> Result<Myth, StoreError> {
        if matrix.dim() != self.config.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.config.dimension,
                actual: matrix.dim(),
            });
        }

        let mut tx = self.pool.writer.begin().await.map_err(map_db_err)?;

        let mut myths = load_myths(&mut tx, std::slice::from_ref(&myth_id), &self.config).await?;
        let myth = myths.remove(&myth_id).ok_or_else(|| StoreError::not_found(myth_id))?;

        let decomposition = algebra::decompose(matrix, myth.components.len())?;

        let referenced: Vec<Uuid> = myth.components.iter().map(|c| c.mytheme_id).collect();
        let mythemes = load_mythemes(&mut tx, &referenced, &self.config).await?;
        let dangling: Vec<Uuid> = referenced
            .iter()
            .copied()
            .filter(|id| !mythemes.contains_key(id))
            .collect();
        if !dangling.is_empty() {
            return Err(StoreError::ReferenceNotFound { ids: dangling });
        }

        let mut components = Vec::with_capacity(myth.components.len());
        for (component, combined) in myth.components.iter().zip(&decomposition.combined) {
            let base = &mythemes[&component.mytheme_id].embedding;
            let offset: Vec<f32> = combined.iter().zip(base).map(|(c, b)| c - b).collect();
            components.push(MythComponent::new(component.mytheme_id, offset, component.weight));
        }

        update_myth_row(&mut tx, myth_id, Some(&decomposition.main_embedding), &self.config)
            .await?;
        replace_components(&mut tx, myth_id, &components, &self.config).await?;

        // Re-read inside the transaction so the returned record is exactly
        // what was persisted.
        let mut updated =
            load_myths(&mut tx, std::slice::from_ref(&myth_id), &self.config).await?;
        let updated = updated
            .remove(&myth_id)
            .ok_or_else(|| StoreError::not_found(myth_id))?;

        tx.commit().await.map_err(map_db_err)?;
        tracing::debug!(myth_id = %myth_id, components = components.len(), "recomputed myth");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::myth::SqliteMythRepository;
    use crate::sqlite::mytheme::SqliteMythemeRepository;
    use crate::sqlite::schema::ensure_schema;
    use mythos_core::repository::{MythRepository, MythemeRepository};
    use mythos_types::myth::NewMyth;
    use mythos_types::mytheme::NewMytheme;

    async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        std::mem::forget(dir);
        let pool = DatabasePool::new(&url).await.unwrap();
        ensure_schema(&pool).await.unwrap();
        pool
    }

    fn config() -> EmbeddingConfig {
        EmbeddingConfig::new(4)
    }

    struct Fixture {
        pool: DatabasePool,
        mythemes: SqliteMythemeRepository,
        myths: SqliteMythRepository,
        connector: MythicAlgebraConnector,
    }

    async fn fixture() -> Fixture {
        let pool = test_pool().await;
        Fixture {
            mythemes: SqliteMythemeRepository::new(pool.clone(), config()),
            myths: SqliteMythRepository::new(pool.clone(), config()),
            connector: MythicAlgebraConnector::new(pool.clone(), config()),
            pool,
        }
    }

    /// The worked scenario: t1 = [0.1, 0.2, 0.3, 0.4], one component with
    /// offset [0, 0, 0, 0.1] and weight 1.0.
    async fn seed_scenario(f: &Fixture) -> (Uuid, Uuid) {
        let t1 = f
            .mythemes
            .insert_one(&NewMytheme::new(vec![0.1, 0.2, 0.3, 0.4]))
            .await
            .unwrap();
        let myth = NewMyth::new(
            vec![1.0, 0.0, 0.0, 0.0],
            vec![MythComponent::new(t1, vec![0.0, 0.0, 0.0, 0.1], 1.0)],
            &config(),
        )
        .unwrap();
        let myth_id = f.myths.insert_one(&myth).await.unwrap();
        (t1, myth_id)
    }

    fn assert_close(got: &[f32], want: &[f32]) {
        assert_eq!(got.len(), want.len());
        for (g, w) in got.iter().zip(want) {
            assert!((g - w).abs() < 1e-7, "got {got:?}, want {want:?}");
        }
    }

    #[tokio::test]
    async fn test_compose_worked_scenario() {
        let f = fixture().await;
        let (_, myth_id) = seed_scenario(&f).await;

        let matrix = f.connector.compose_myth(myth_id).await.unwrap();
        assert_eq!(matrix.row_count(), 2);
        assert_eq!(matrix.dim(), 4);
        assert_close(matrix.row(0), &[1.0, 0.0, 0.0, 0.0]);
        assert_close(matrix.row(1), &[0.1, 0.2, 0.3, 0.5]);

        // Decomposing the unmodified matrix back-computes the same combined
        // row.
        let decomposition = mythos_core::algebra::decompose(&matrix, 1).unwrap();
        assert_close(&decomposition.combined[0], &[0.1, 0.2, 0.3, 0.5]);
    }

    #[tokio::test]
    async fn test_recompute_derives_offsets_holding_weights_fixed() {
        let f = fixture().await;
        let (t1, myth_id) = seed_scenario(&f).await;

        let matrix = MythMatrix::from_rows(vec![
            vec![0.0, 1.0, 0.0, 0.0],
            vec![0.2, 0.2, 0.3, 0.5],
        ])
        .unwrap();
        let updated = f.connector.recompute_myth(myth_id, &matrix).await.unwrap();

        assert_close(&updated.main_embedding, &[0.0, 1.0, 0.0, 0.0]);
        assert_eq!(updated.components.len(), 1);
        assert_eq!(updated.components[0].mytheme_id, t1);
        // New offset = combined - base = [0.2,0.2,0.3,0.5] - [0.1,0.2,0.3,0.4]
        assert_close(&updated.components[0].offset, &[0.1, 0.0, 0.0, 0.1]);
        assert!((updated.components[0].weight - 1.0).abs() < 1e-7);

        // And the persisted record matches what was returned.
        let fetched = f
            .myths
            .get_by_ids(&[myth_id])
            .await
            .unwrap()
            .remove(&myth_id)
            .unwrap();
        assert_close(&fetched.main_embedding, &updated.main_embedding);
        assert_close(&fetched.components[0].offset, &updated.components[0].offset);
    }

    #[tokio::test]
    async fn test_recompute_rejects_wrong_shapes() {
        let f = fixture().await;
        let (_, myth_id) = seed_scenario(&f).await;

        // Wrong width.
        let narrow = MythMatrix::from_rows(vec![vec![0.0; 3], vec![0.0; 3]]).unwrap();
        assert!(matches!(
            f.connector.recompute_myth(myth_id, &narrow).await,
            Err(StoreError::DimensionMismatch { .. })
        ));

        // Wrong row count for the declared component count.
        let tall = MythMatrix::from_rows(vec![vec![0.0; 4]; 3]).unwrap();
        assert!(matches!(
            f.connector.recompute_myth(myth_id, &tall).await,
            Err(StoreError::DimensionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_recompute_missing_myth() {
        let f = fixture().await;
        let matrix = MythMatrix::from_rows(vec![vec![0.0; 4]]).unwrap();
        assert!(matches!(
            f.connector.recompute_myth(Uuid::now_v7(), &matrix).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_compose_dangling_reference() {
        let f = fixture().await;
        let (t1, myth_id) = seed_scenario(&f).await;

        // Force a dangling reference past the integrity protection.
        sqlx::query("PRAGMA foreign_keys = OFF")
            .execute(&f.pool.writer)
            .await
            .unwrap();
        sqlx::query("DELETE FROM mythemes WHERE id = ?")
            .bind(t1.to_string())
            .execute(&f.pool.writer)
            .await
            .unwrap();

        let err = f.connector.compose_myth(myth_id).await.unwrap_err();
        match err {
            StoreError::ReferenceNotFound { ids } => assert_eq!(ids, vec![t1]),
            other => panic!("expected ReferenceNotFound, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_compose_myths_bulk() {
        let f = fixture().await;
        let t = f
            .mythemes
            .insert_bulk(&[
                NewMytheme::new(vec![1.0, 0.0, 0.0, 0.0]),
                NewMytheme::new(vec![0.0, 1.0, 0.0, 0.0]),
            ])
            .await
            .unwrap();

        let myths: Vec<NewMyth> = (0..3)
            .map(|i| {
                NewMyth::new(
                    vec![i as f32, 0.0, 0.0, 0.0],
                    vec![
                        MythComponent::new(t[0], vec![0.0, 0.0, 0.0, i as f32], 0.5),
                        MythComponent::new(t[1], vec![0.0, 0.0, i as f32, 0.0], 0.5),
                    ],
                    &config(),
                )
                .unwrap()
            })
            .collect();
        let ids = f.myths.insert_bulk(&myths).await.unwrap();

        let matrices = f.connector.compose_myths(&ids).await.unwrap();
        assert_eq!(matrices.len(), 3);
        for (i, (id, matrix)) in matrices.iter().enumerate() {
            assert_eq!(*id, ids[i]);
            assert_eq!(matrix.row_count(), 3);
            assert_close(matrix.row(0), &[i as f32, 0.0, 0.0, 0.0]);
            assert_close(matrix.row(1), &[1.0, 0.0, 0.0, i as f32]);
            assert_close(matrix.row(2), &[0.0, 1.0, i as f32, 0.0]);
        }
    }

    #[tokio::test]
    async fn test_recompute_serializes_against_mytheme_update() {
        let f = fixture().await;
        let (t1, myth_id) = seed_scenario(&f).await;

        // Matrix composed against the original base embedding.
        let matrix = f.connector.compose_myth(myth_id).await.unwrap();
        let combined = matrix.row(1).to_vec();
        let e_new = vec![1.0, 1.0, 1.0, 1.0];

        let connector = MythicAlgebraConnector::new(f.pool.clone(), config());
        let mythemes = SqliteMythemeRepository::new(f.pool.clone(), config());
        let e_new_task = e_new.clone();
        let (recompute, update) = tokio::join!(
            tokio::spawn(async move { connector.recompute_myth(myth_id, &matrix).await }),
            tokio::spawn(async move { mythemes.update(t1, Some(&e_new_task), None).await }),
        );
        recompute.unwrap().unwrap();
        update.unwrap().unwrap();

        let myth = f
            .myths
            .get_by_ids(&[myth_id])
            .await
            .unwrap()
            .remove(&myth_id)
            .unwrap();
        let mytheme = f
            .mythemes
            .get_by_ids(&[t1])
            .await
            .unwrap()
            .remove(&t1)
            .unwrap();
        assert_close(&mytheme.embedding, &e_new);

        // The final offset must match one of the two serialized orders:
        // recompute first (base = old embedding, offset unchanged) or
        // update first (base = new embedding). A stale-base interleaving
        // would produce neither.
        let offset = &myth.components[0].offset;
        let old_order: Vec<f32> = vec![0.0, 0.0, 0.0, 0.1];
        let new_order: Vec<f32> = combined.iter().zip(&e_new).map(|(c, b)| c - b).collect();
        let matches_old = offset
            .iter()
            .zip(&old_order)
            .all(|(g, w)| (g - w).abs() < 1e-6);
        let matches_new = offset
            .iter()
            .zip(&new_order)
            .all(|(g, w)| (g - w).abs() < 1e-6);
        assert!(
            matches_old || matches_new,
            "offset {offset:?} matches neither serialized order"
        );
    }
}
