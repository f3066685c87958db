//! SQLite mytheme repository implementation.
//!
//! Implements `MythemeRepository` from `mythos-core` using sqlx with split
//! read/write pools. Raw queries, private Row structs, multi-row inserts
//! for the bulk path.

use std::collections::{HashMap, HashSet};

use mythos_core::repository::MythemeRepository;
use mythos_types::config::EmbeddingConfig;
use mythos_types::error::StoreError;
use mythos_types::mytheme::{Mytheme, NewMytheme};
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::codec::{decode_vector, encode_vector};
use super::pool::DatabasePool;
use super::{format_datetime, map_db_err, parse_datetime, parse_uuid, placeholders};

/// SQLite-backed implementation of `MythemeRepository`.
pub struct SqliteMythemeRepository {
    pool: DatabasePool,
    config: EmbeddingConfig,
}

impl SqliteMythemeRepository {
    /// Create a new repository backed by the given pool and embedding
    /// configuration.
    pub fn new(pool: DatabasePool, config: EmbeddingConfig) -> Self {
        Self { pool, config }
    }
}

// ---------------------------------------------------------------------------
// Private Row type for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct MythemeRow {
    id: String,
    embedding: Vec<u8>,
    metadata: Option<String>,
    created_at: String,
    updated_at: String,
}

impl MythemeRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            embedding: row.try_get("embedding")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_mytheme(self, config: &EmbeddingConfig) -> Result<Mytheme, StoreError> {
        let metadata = self
            .metadata
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| StoreError::Transport(format!("invalid metadata json: {e}")))?;
        Ok(Mytheme {
            id: parse_uuid(&self.id)?,
            embedding: decode_vector(&self.embedding, config.dimension)?,
            metadata,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

fn metadata_to_string(metadata: Option<&serde_json::Value>) -> Result<Option<String>, StoreError> {
    metadata
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| StoreError::Transport(format!("metadata serialization: {e}")))
}

// ---------------------------------------------------------------------------
// Shared loaders (also used by the algebra connector inside transactions)
// ---------------------------------------------------------------------------

/// Load mythemes by id into a map. Missing ids are simply absent from the
/// result; callers decide whether absence is `NotFound` or
/// `ReferenceNotFound`.
pub(crate) async fn load_mythemes(
    conn: &mut SqliteConnection,
    ids: &[Uuid],
    config: &EmbeddingConfig,
) -> Result<HashMap<Uuid, Mytheme>, StoreError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let sql = format!(
        "SELECT * FROM mythemes WHERE id IN ({})",
        placeholders(ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(id.to_string());
    }
    let rows = query.fetch_all(&mut *conn).await.map_err(map_db_err)?;

    let mut mythemes = HashMap::with_capacity(rows.len());
    for row in &rows {
        let mytheme = MythemeRow::from_row(row)
            .map_err(map_db_err)?
            .into_mytheme(config)?;
        mythemes.insert(mytheme.id, mytheme);
    }
    Ok(mythemes)
}

/// Among `ids`, return those that do not exist in the mythemes table.
pub(crate) async fn missing_mytheme_ids(
    conn: &mut SqliteConnection,
    ids: &[Uuid],
) -> Result<Vec<Uuid>, StoreError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let unique: Vec<Uuid> = ids
        .iter()
        .copied()
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let sql = format!(
        "SELECT id FROM mythemes WHERE id IN ({})",
        placeholders(unique.len())
    );
    let mut query = sqlx::query(&sql);
    for id in &unique {
        query = query.bind(id.to_string());
    }
    let rows = query.fetch_all(&mut *conn).await.map_err(map_db_err)?;

    let mut found = HashSet::with_capacity(rows.len());
    for row in &rows {
        let id: String = row.try_get("id").map_err(map_db_err)?;
        found.insert(parse_uuid(&id)?);
    }
    Ok(unique.into_iter().filter(|id| !found.contains(id)).collect())
}

// ---------------------------------------------------------------------------
// MythemeRepository implementation
// ---------------------------------------------------------------------------

impl MythemeRepository for SqliteMythemeRepository {
    async fn insert_one(&self, mytheme: &NewMytheme) -> Result<Uuid, StoreError> {
        mytheme.validate(&self.config)?;

        let id = Uuid::now_v7();
        let now = format_datetime(&chrono::Utc::now());
        sqlx::query(
            "INSERT INTO mythemes (id, embedding, metadata, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(encode_vector(&mytheme.embedding, self.config.dimension)?)
        .bind(metadata_to_string(mytheme.metadata.as_ref())?)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool.writer)
        .await
        .map_err(map_db_err)?;

        Ok(id)
    }

    async fn insert_bulk(&self, mythemes: &[NewMytheme]) -> Result<Vec<Uuid>, StoreError> {
        if mythemes.is_empty() {
            return Ok(Vec::new());
        }
        // Validate the whole batch before any row is written.
        let mut encoded = Vec::with_capacity(mythemes.len());
        for mytheme in mythemes {
            mytheme.validate(&self.config)?;
            encoded.push((
                Uuid::now_v7(),
                encode_vector(&mytheme.embedding, self.config.dimension)?,
                metadata_to_string(mytheme.metadata.as_ref())?,
            ));
        }

        let now = format_datetime(&chrono::Utc::now());
        let mut builder = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
            "INSERT INTO mythemes (id, embedding, metadata, created_at, updated_at) ",
        );
        builder.push_values(&encoded, |mut b, (id, blob, metadata)| {
            b.push_bind(id.to_string())
                .push_bind(blob.as_slice())
                .push_bind(metadata.as_deref())
                .push_bind(&now)
                .push_bind(&now);
        });
        builder
            .build()
            .execute(&self.pool.writer)
            .await
            .map_err(map_db_err)?;

        tracing::debug!(count = mythemes.len(), "inserted mythemes in bulk");
        Ok(encoded.into_iter().map(|(id, _, _)| id).collect())
    }

    async fn get_by_ids(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, Mytheme>, StoreError> {
        let mut conn = self.pool.reader.acquire().await.map_err(map_db_err)?;
        let mythemes = load_mythemes(&mut conn, ids, &self.config).await?;

        let missing: Vec<Uuid> = ids
            .iter()
            .copied()
            .collect::<HashSet<_>>()
            .into_iter()
            .filter(|id| !mythemes.contains_key(id))
            .collect();
        if !missing.is_empty() {
            return Err(StoreError::NotFound { ids: missing });
        }
        Ok(mythemes)
    }

    async fn update(
        &self,
        id: Uuid,
        embedding: Option<&[f32]>,
        metadata: Option<&serde_json::Value>,
    ) -> Result<(), StoreError> {
        if embedding.is_none() && metadata.is_none() {
            return Ok(());
        }
        let embedding_blob = embedding
            .map(|e| encode_vector(e, self.config.dimension))
            .transpose()?;
        let metadata_text = metadata_to_string(metadata)?;

        let mut sql = String::from("UPDATE mythemes SET updated_at = ?");
        if embedding_blob.is_some() {
            sql.push_str(", embedding = ?");
        }
        if metadata_text.is_some() {
            sql.push_str(", metadata = ?");
        }
        sql.push_str(" WHERE id = ?");

        let mut query = sqlx::query(&sql).bind(format_datetime(&chrono::Utc::now()));
        if let Some(blob) = &embedding_blob {
            query = query.bind(blob.as_slice());
        }
        if let Some(text) = &metadata_text {
            query = query.bind(text);
        }
        let result = query
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(map_db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(id));
        }
        Ok(())
    }

    async fn delete(&self, ids: &[Uuid]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.writer.begin().await.map_err(map_db_err)?;

        let missing = missing_mytheme_ids(&mut tx, ids).await?;
        if !missing.is_empty() {
            return Err(StoreError::NotFound { ids: missing });
        }

        // Reference protection: a mytheme still referenced by any myth
        // component cannot be deleted.
        let sql = format!(
            "SELECT DISTINCT mytheme_id FROM myth_components WHERE mytheme_id IN ({})",
            placeholders(ids.len())
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id.to_string());
        }
        let rows = query.fetch_all(&mut *tx).await.map_err(map_db_err)?;
        if !rows.is_empty() {
            let mut referenced = Vec::with_capacity(rows.len());
            for row in &rows {
                let id: String = row.try_get("mytheme_id").map_err(map_db_err)?;
                referenced.push(parse_uuid(&id)?);
            }
            return Err(StoreError::ReferenceNotFound { ids: referenced });
        }

        let sql = format!(
            "DELETE FROM mythemes WHERE id IN ({})",
            placeholders(ids.len())
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id.to_string());
        }
        query.execute(&mut *tx).await.map_err(map_db_err)?;

        tx.commit().await.map_err(map_db_err)?;
        tracing::debug!(count = ids.len(), "deleted mythemes");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::schema::ensure_schema;
    use mythos_types::myth::{MythComponent, NewMyth};

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

    #[tokio::test]
    async fn test_insert_and_get_round_trip() {
        let repo = SqliteMythemeRepository::new(test_pool().await, config());

        let new = NewMytheme::with_metadata(
            vec![0.1, 0.2, 0.3, 0.4],
            serde_json::json!({"name": "the flood"}),
        );
        let id = repo.insert_one(&new).await.unwrap();

        let fetched = repo.get_by_ids(&[id]).await.unwrap();
        let mytheme = &fetched[&id];
        assert_eq!(mytheme.embedding, vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(
            mytheme.metadata,
            Some(serde_json::json!({"name": "the flood"}))
        );
    }

    #[tokio::test]
    async fn test_insert_rejects_wrong_dimension() {
        let repo = SqliteMythemeRepository::new(test_pool().await, config());
        let err = repo
            .insert_one(&NewMytheme::new(vec![0.1, 0.2]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn test_insert_bulk_preserves_order() {
        let repo = SqliteMythemeRepository::new(test_pool().await, config());

        let batch: Vec<NewMytheme> = (0..10)
            .map(|i| NewMytheme::new(vec![i as f32, 0.0, 0.0, 0.0]))
            .collect();
        let ids = repo.insert_bulk(&batch).await.unwrap();
        assert_eq!(ids.len(), 10);

        let fetched = repo.get_by_ids(&ids).await.unwrap();
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(fetched[id].embedding[0], i as f32);
        }
    }

    #[tokio::test]
    async fn test_insert_bulk_all_or_nothing() {
        let repo = SqliteMythemeRepository::new(test_pool().await, config());

        let batch = vec![
            NewMytheme::new(vec![0.0; 4]),
            NewMytheme::new(vec![0.0; 3]), // wrong dimension
        ];
        assert!(repo.insert_bulk(&batch).await.is_err());

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM mythemes")
            .fetch_one(&repo.pool.reader)
            .await
            .unwrap();
        assert_eq!(count.0, 0, "no partial rows after a failed batch");
    }

    #[tokio::test]
    async fn test_get_by_ids_names_missing() {
        let repo = SqliteMythemeRepository::new(test_pool().await, config());
        let id = repo
            .insert_one(&NewMytheme::new(vec![0.0; 4]))
            .await
            .unwrap();
        let ghost = Uuid::now_v7();

        let err = repo.get_by_ids(&[id, ghost]).await.unwrap_err();
        match err {
            StoreError::NotFound { ids } => assert_eq!(ids, vec![ghost]),
            other => panic!("expected NotFound, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_update_embedding_and_metadata() {
        let repo = SqliteMythemeRepository::new(test_pool().await, config());
        let id = repo
            .insert_one(&NewMytheme::new(vec![0.0; 4]))
            .await
            .unwrap();

        repo.update(
            id,
            Some(&[1.0, 2.0, 3.0, 4.0]),
            Some(&serde_json::json!({"renamed": true})),
        )
        .await
        .unwrap();

        let mytheme = repo.get_by_ids(&[id]).await.unwrap().remove(&id).unwrap();
        assert_eq!(mytheme.embedding, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(mytheme.metadata, Some(serde_json::json!({"renamed": true})));

        let err = repo
            .update(Uuid::now_v7(), Some(&[0.0; 4]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_unreferenced() {
        let repo = SqliteMythemeRepository::new(test_pool().await, config());
        let id = repo
            .insert_one(&NewMytheme::new(vec![0.0; 4]))
            .await
            .unwrap();

        repo.delete(&[id]).await.unwrap();
        assert!(repo.get_by_ids(&[id]).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_referenced_mytheme_fails() {
        use crate::sqlite::myth::SqliteMythRepository;
        use mythos_core::repository::MythRepository;

        let pool = test_pool().await;
        let mythemes = SqliteMythemeRepository::new(pool.clone(), config());
        let myths = SqliteMythRepository::new(pool, config());

        let mytheme_id = mythemes
            .insert_one(&NewMytheme::new(vec![0.0; 4]))
            .await
            .unwrap();
        let myth = NewMyth::new(
            vec![0.0; 4],
            vec![MythComponent::new(mytheme_id, vec![0.0; 4], 1.0)],
            &config(),
        )
        .unwrap();
        myths.insert_one(&myth).await.unwrap();

        let err = mythemes.delete(&[mytheme_id]).await.unwrap_err();
        match err {
            StoreError::ReferenceNotFound { ids } => assert_eq!(ids, vec![mytheme_id]),
            other => panic!("expected ReferenceNotFound, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_schema_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("bare.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        std::mem::forget(dir);
        let pool = DatabasePool::new(&url).await.unwrap();
        let repo = SqliteMythemeRepository::new(pool, config());

        let err = repo
            .insert_one(&NewMytheme::new(vec![0.0; 4]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::SchemaNotReady));
    }
}
