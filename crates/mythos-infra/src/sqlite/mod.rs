//! SQLite storage layer.
//!
//! Repository implementations backed by SQLite with WAL mode and split
//! read/write connection pools. Vectors are persisted through the blob
//! codec in [`codec`]; schema setup is explicit via [`schema::ensure_schema`].

pub mod codec;
pub mod myth;
pub mod mytheme;
pub mod pool;
pub mod schema;

use chrono::{DateTime, Utc};
use mythos_types::error::StoreError;

/// Map a sqlx error into the store taxonomy.
///
/// Operations issued before schema setup surface as `SchemaNotReady`;
/// lock contention surfaces as `ConcurrentConflict` for caller retry;
/// everything else is an opaque transport failure.
pub(crate) fn map_db_err(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e {
        let msg = db_err.message();
        if msg.contains("no such table") {
            return StoreError::SchemaNotReady;
        }
        if msg.contains("database is locked") || msg.contains("database table is locked") {
            return StoreError::ConcurrentConflict(msg.to_string());
        }
    }
    StoreError::Transport(e.to_string())
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Transport(format!("invalid datetime: {e}")))
}

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

pub(crate) fn parse_uuid(s: &str) -> Result<uuid::Uuid, StoreError> {
    uuid::Uuid::parse_str(s).map_err(|e| StoreError::Transport(format!("invalid uuid: {e}")))
}

/// Build a `?, ?, ...` placeholder list for an IN clause.
pub(crate) fn placeholders(count: usize) -> String {
    let mut s = String::with_capacity(count * 3);
    for i in 0..count {
        if i > 0 {
            s.push_str(", ");
        }
        s.push('?');
    }
    s
}
