//! SQLite myth repository implementation.
//!
//! Implements `MythRepository` from `mythos-core`. A myth is persisted as
//! one row in `myths` plus zero or more rows in `myth_components`, keyed by
//! `(myth_id, position)` so the component order round-trips exactly.
//!
//! Single and bulk writes share the same validation; they differ only in
//! persistence strategy. Bulk inserts write the whole batch through one
//! multi-row statement per table, so round trips stay O(batches) instead of
//! O(myths). Every mutation runs inside one transaction on the single
//! writer connection: a failure anywhere aborts the whole call with no
//! partial rows.

use std::collections::{HashMap, HashSet};

use mythos_core::repository::MythRepository;
use mythos_types::config::EmbeddingConfig;
use mythos_types::error::StoreError;
use mythos_types::myth::{Myth, MythComponent, MythPatch, NewMyth};
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::codec::{decode_vector, encode_vector};
use super::mytheme::missing_mytheme_ids;
use super::pool::DatabasePool;
use super::{format_datetime, map_db_err, parse_datetime, parse_uuid, placeholders};

/// SQLite-backed implementation of `MythRepository`.
pub struct SqliteMythRepository {
    pool: DatabasePool,
    config: EmbeddingConfig,
}

impl SqliteMythRepository {
    /// Create a new repository backed by the given pool and embedding
    /// configuration.
    pub fn new(pool: DatabasePool, config: EmbeddingConfig) -> Self {
        Self { pool, config }
    }
}

// ---------------------------------------------------------------------------
// Private row types and flat component rows for multi-row writes
// ---------------------------------------------------------------------------

struct MythRow {
    id: String,
    main_embedding: Vec<u8>,
    created_at: String,
    updated_at: String,
}

impl MythRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            main_embedding: row.try_get("main_embedding")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// One encoded `myth_components` row, ready to bind.
struct ComponentRow {
    myth_id: String,
    position: i64,
    mytheme_id: String,
    offset_blob: Vec<u8>,
    weight: f64,
}

fn encode_component_rows(
    myth_id: Uuid,
    components: &[MythComponent],
    config: &EmbeddingConfig,
    out: &mut Vec<ComponentRow>,
) -> Result<(), StoreError> {
    for (position, component) in components.iter().enumerate() {
        out.push(ComponentRow {
            myth_id: myth_id.to_string(),
            position: position as i64,
            mytheme_id: component.mytheme_id.to_string(),
            offset_blob: encode_vector(&component.offset, config.dimension)?,
            weight: component.weight as f64,
        });
    }
    Ok(())
}

async fn insert_component_rows(
    conn: &mut SqliteConnection,
    rows: &[ComponentRow],
) -> Result<(), StoreError> {
    if rows.is_empty() {
        return Ok(());
    }
    let mut builder = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
        "INSERT INTO myth_components (myth_id, position, mytheme_id, offset_vec, weight) ",
    );
    builder.push_values(rows, |mut b, row| {
        b.push_bind(&row.myth_id)
            .push_bind(row.position)
            .push_bind(&row.mytheme_id)
            .push_bind(row.offset_blob.as_slice())
            .push_bind(row.weight);
    });
    builder
        .build()
        .execute(&mut *conn)
        .await
        .map_err(map_db_err)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Shared loaders (also used by the algebra connector inside transactions)
// ---------------------------------------------------------------------------

/// Load myths by id into a map, components in insertion order. Missing ids
/// are absent from the result; callers decide how to surface absence.
pub(crate) async fn load_myths(
    conn: &mut SqliteConnection,
    ids: &[Uuid],
    config: &EmbeddingConfig,
) -> Result<HashMap<Uuid, Myth>, StoreError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let sql = format!("SELECT * FROM myths WHERE id IN ({})", placeholders(ids.len()));
    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(id.to_string());
    }
    let myth_rows = query.fetch_all(&mut *conn).await.map_err(map_db_err)?;

    let mut myths = HashMap::with_capacity(myth_rows.len());
    for row in &myth_rows {
        let row = MythRow::from_row(row).map_err(map_db_err)?;
        let id = parse_uuid(&row.id)?;
        myths.insert(
            id,
            Myth {
                id,
                main_embedding: decode_vector(&row.main_embedding, config.dimension)?,
                components: Vec::new(),
                created_at: parse_datetime(&row.created_at)?,
                updated_at: parse_datetime(&row.updated_at)?,
            },
        );
    }
    if myths.is_empty() {
        return Ok(myths);
    }

    let sql = format!(
        "SELECT myth_id, mytheme_id, offset_vec, weight FROM myth_components
         WHERE myth_id IN ({}) ORDER BY myth_id, position",
        placeholders(ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(id.to_string());
    }
    let component_rows = query.fetch_all(&mut *conn).await.map_err(map_db_err)?;

    for row in &component_rows {
        let myth_id: String = row.try_get("myth_id").map_err(map_db_err)?;
        let mytheme_id: String = row.try_get("mytheme_id").map_err(map_db_err)?;
        let offset_blob: Vec<u8> = row.try_get("offset_vec").map_err(map_db_err)?;
        let weight: f64 = row.try_get("weight").map_err(map_db_err)?;

        let myth_id = parse_uuid(&myth_id)?;
        if let Some(myth) = myths.get_mut(&myth_id) {
            myth.components.push(MythComponent::new(
                parse_uuid(&mytheme_id)?,
                decode_vector(&offset_blob, config.dimension)?,
                weight as f32,
            ));
        }
    }
    Ok(myths)
}

/// Replace the full component list of one myth inside an open transaction.
pub(crate) async fn replace_components(
    conn: &mut SqliteConnection,
    myth_id: Uuid,
    components: &[MythComponent],
    config: &EmbeddingConfig,
) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM myth_components WHERE myth_id = ?")
        .bind(myth_id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(map_db_err)?;

    let mut rows = Vec::with_capacity(components.len());
    encode_component_rows(myth_id, components, config, &mut rows)?;
    insert_component_rows(conn, &rows).await
}

/// Touch a myth row, optionally replacing the main embedding. Fails with
/// `NotFound` when the id is absent.
pub(crate) async fn update_myth_row(
    conn: &mut SqliteConnection,
    myth_id: Uuid,
    main_embedding: Option<&[f32]>,
    config: &EmbeddingConfig,
) -> Result<(), StoreError> {
    let now = format_datetime(&chrono::Utc::now());
    let result = match main_embedding {
        Some(main) => {
            sqlx::query("UPDATE myths SET main_embedding = ?, updated_at = ? WHERE id = ?")
                .bind(encode_vector(main, config.dimension)?)
                .bind(&now)
                .bind(myth_id.to_string())
                .execute(&mut *conn)
                .await
        }
        None => {
            sqlx::query("UPDATE myths SET updated_at = ? WHERE id = ?")
                .bind(&now)
                .bind(myth_id.to_string())
                .execute(&mut *conn)
                .await
        }
    }
    .map_err(map_db_err)?;

    if result.rows_affected() == 0 {
        return Err(StoreError::not_found(myth_id));
    }
    Ok(())
}

/// Referenced mytheme ids across a batch of component lists, deduplicated.
fn referenced_ids<'a, I>(component_lists: I) -> Vec<Uuid>
where
    I: IntoIterator<Item = &'a [MythComponent]>,
{
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for components in component_lists {
        for component in components {
            if seen.insert(component.mytheme_id) {
                ids.push(component.mytheme_id);
            }
        }
    }
    ids
}

async fn check_references(
    conn: &mut SqliteConnection,
    ids: &[Uuid],
) -> Result<(), StoreError> {
    let missing = missing_mytheme_ids(conn, ids).await?;
    if !missing.is_empty() {
        return Err(StoreError::ReferenceNotFound { ids: missing });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// MythRepository implementation
// ---------------------------------------------------------------------------

impl MythRepository for SqliteMythRepository {
    async fn insert_one(&self, myth: &NewMyth) -> Result<Uuid, StoreError> {
        myth.validate(&self.config)?;

        let id = Uuid::now_v7();
        let main_blob = encode_vector(&myth.main_embedding, self.config.dimension)?;
        let mut component_rows = Vec::with_capacity(myth.components.len());
        encode_component_rows(id, &myth.components, &self.config, &mut component_rows)?;

        let mut tx = self.pool.writer.begin().await.map_err(map_db_err)?;
        check_references(&mut tx, &referenced_ids([myth.components.as_slice()])).await?;

        let now = format_datetime(&chrono::Utc::now());
        sqlx::query(
            "INSERT INTO myths (id, main_embedding, created_at, updated_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(main_blob)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(map_db_err)?;

        insert_component_rows(&mut tx, &component_rows).await?;
        tx.commit().await.map_err(map_db_err)?;

        Ok(id)
    }

    async fn insert_bulk(&self, myths: &[NewMyth]) -> Result<Vec<Uuid>, StoreError> {
        if myths.is_empty() {
            return Ok(Vec::new());
        }
        // Validate and encode the whole batch before any row is written.
        let mut ids = Vec::with_capacity(myths.len());
        let mut main_blobs = Vec::with_capacity(myths.len());
        let mut component_rows = Vec::new();
        for myth in myths {
            myth.validate(&self.config)?;
            let id = Uuid::now_v7();
            main_blobs.push(encode_vector(&myth.main_embedding, self.config.dimension)?);
            encode_component_rows(id, &myth.components, &self.config, &mut component_rows)?;
            ids.push(id);
        }

        let mut tx = self.pool.writer.begin().await.map_err(map_db_err)?;
        check_references(
            &mut tx,
            &referenced_ids(myths.iter().map(|m| m.components.as_slice())),
        )
        .await?;

        // One multi-row statement for the myth rows, one for all component
        // rows across the batch.
        let now = format_datetime(&chrono::Utc::now());
        let mut builder = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
            "INSERT INTO myths (id, main_embedding, created_at, updated_at) ",
        );
        builder.push_values(ids.iter().zip(&main_blobs), |mut b, (id, blob)| {
            b.push_bind(id.to_string())
                .push_bind(blob.as_slice())
                .push_bind(&now)
                .push_bind(&now);
        });
        builder.build().execute(&mut *tx).await.map_err(map_db_err)?;

        insert_component_rows(&mut tx, &component_rows).await?;
        tx.commit().await.map_err(map_db_err)?;

        tracing::debug!(
            count = myths.len(),
            components = component_rows.len(),
            "inserted myths in bulk"
        );
        Ok(ids)
    }

    async fn get_by_ids(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, Myth>, StoreError> {
        let mut conn = self.pool.reader.acquire().await.map_err(map_db_err)?;
        let myths = load_myths(&mut conn, ids, &self.config).await?;

        let missing: Vec<Uuid> = ids
            .iter()
            .copied()
            .collect::<HashSet<_>>()
            .into_iter()
            .filter(|id| !myths.contains_key(id))
            .collect();
        if !missing.is_empty() {
            return Err(StoreError::NotFound { ids: missing });
        }
        Ok(myths)
    }

    async fn update_one(&self, id: Uuid, patch: &MythPatch) -> Result<(), StoreError> {
        patch.validate(&self.config)?;
        if patch.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.writer.begin().await.map_err(map_db_err)?;
        if let Some(components) = &patch.components {
            check_references(&mut tx, &referenced_ids([components.as_slice()])).await?;
        }
        update_myth_row(&mut tx, id, patch.main_embedding.as_deref(), &self.config).await?;
        if let Some(components) = &patch.components {
            replace_components(&mut tx, id, components, &self.config).await?;
        }
        tx.commit().await.map_err(map_db_err)?;
        Ok(())
    }

    async fn update_bulk(&self, patches: &[(Uuid, MythPatch)]) -> Result<(), StoreError> {
        if patches.is_empty() {
            return Ok(());
        }
        for (_, patch) in patches {
            patch.validate(&self.config)?;
        }

        let mut tx = self.pool.writer.begin().await.map_err(map_db_err)?;
        check_references(
            &mut tx,
            &referenced_ids(
                patches
                    .iter()
                    .filter_map(|(_, p)| p.components.as_deref()),
            ),
        )
        .await?;

        for (id, patch) in patches {
            if patch.is_empty() {
                continue;
            }
            update_myth_row(&mut tx, *id, patch.main_embedding.as_deref(), &self.config).await?;
            if let Some(components) = &patch.components {
                replace_components(&mut tx, *id, components, &self.config).await?;
            }
        }
        tx.commit().await.map_err(map_db_err)?;

        tracing::debug!(count = patches.len(), "updated myths in bulk");
        Ok(())
    }

    async fn delete_one(&self, id: Uuid) -> Result<(), StoreError> {
        self.delete_bulk(std::slice::from_ref(&id)).await
    }

    async fn delete_bulk(&self, ids: &[Uuid]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.writer.begin().await.map_err(map_db_err)?;

        let sql = format!("SELECT id FROM myths WHERE id IN ({})", placeholders(ids.len()));
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id.to_string());
        }
        let rows = query.fetch_all(&mut *tx).await.map_err(map_db_err)?;
        let mut found = HashSet::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.try_get("id").map_err(map_db_err)?;
            found.insert(parse_uuid(&id)?);
        }
        let missing: Vec<Uuid> = ids
            .iter()
            .copied()
            .collect::<HashSet<_>>()
            .into_iter()
            .filter(|id| !found.contains(id))
            .collect();
        if !missing.is_empty() {
            return Err(StoreError::NotFound { ids: missing });
        }

        // Component rows go first; referenced mythemes are untouched.
        let sql = format!(
            "DELETE FROM myth_components WHERE myth_id IN ({})",
            placeholders(ids.len())
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id.to_string());
        }
        query.execute(&mut *tx).await.map_err(map_db_err)?;

        let sql = format!("DELETE FROM myths WHERE id IN ({})", placeholders(ids.len()));
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id.to_string());
        }
        query.execute(&mut *tx).await.map_err(map_db_err)?;

        tx.commit().await.map_err(map_db_err)?;
        tracing::debug!(count = ids.len(), "deleted myths");
        Ok(())
    }
}
