//! MythemeRepository trait definition.

use std::collections::HashMap;

use mythos_types::error::StoreError;
use mythos_types::mytheme::{Mytheme, NewMytheme};
use uuid::Uuid;

/// Repository trait for mytheme persistence.
///
/// Implementations live in mythos-infra (e.g., `SqliteMythemeRepository`).
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait MythemeRepository: Send + Sync {
    /// Insert a single mytheme. Returns the assigned id.
    fn insert_one(
        &self,
        mytheme: &NewMytheme,
    ) -> impl std::future::Future<Output = Result<Uuid, StoreError>> + Send;

    /// Insert many mythemes in one multi-row write.
    ///
    /// Semantically equivalent to repeated `insert_one` calls. The whole
    /// batch is validated before any row is written; returned ids preserve
    /// input order.
    fn insert_bulk(
        &self,
        mythemes: &[NewMytheme],
    ) -> impl std::future::Future<Output = Result<Vec<Uuid>, StoreError>> + Send;

    /// Fetch mythemes by id.
    ///
    /// Fails with `NotFound` naming every missing id; never silently drops
    /// unknown ids.
    fn get_by_ids(
        &self,
        ids: &[Uuid],
    ) -> impl std::future::Future<Output = Result<HashMap<Uuid, Mytheme>, StoreError>> + Send;

    /// Update the embedding and/or metadata of a mytheme.
    fn update(
        &self,
        id: Uuid,
        embedding: Option<&[f32]>,
        metadata: Option<&serde_json::Value>,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Delete mythemes by id.
    ///
    /// Fails with `ReferenceNotFound` if any id is still referenced by a
    /// myth component (mythemes are never orphaned out from under a myth),
    /// and with `NotFound` if any id is absent.
    fn delete(
        &self,
        ids: &[Uuid],
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}
