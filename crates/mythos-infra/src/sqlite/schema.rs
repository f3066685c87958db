//! Explicit schema setup.
//!
//! The schema-setup collaborator guarantees the mytheme, myth, and
//! myth-component tables exist before any store operation runs. Store
//! operations issued against an uninitialized database fail with
//! `SchemaNotReady`.

use mythos_types::error::StoreError;

use super::pool::DatabasePool;

/// Run the sqlx migrations on the writer pool.
///
/// Idempotent; safe to call on every startup.
pub async fn ensure_schema(pool: &DatabasePool) -> Result<(), StoreError> {
    sqlx::migrate!("../../migrations")
        .run(&pool.writer)
        .await
        .map_err(|e| StoreError::Transport(e.to_string()))?;
    tracing::debug!("myth schema ready");
    Ok(())
}
