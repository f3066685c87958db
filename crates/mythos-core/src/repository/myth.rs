//! MythRepository trait definition.

use std::collections::HashMap;

use mythos_types::error::StoreError;
use mythos_types::myth::{Myth, MythPatch, NewMyth};
use uuid::Uuid;

/// Repository trait for myth persistence.
///
/// Implementations live in mythos-infra (e.g., `SqliteMythRepository`).
/// Follows the same RPITIT pattern as `MythemeRepository`.
///
/// All bulk operations are all-or-nothing: every myth in the batch is
/// validated (dimension, weight sum, referential integrity) before any row
/// is written, and a failure aborts the entire batch.
pub trait MythRepository: Send + Sync {
    /// Insert a single myth with its components. Returns the assigned id.
    fn insert_one(
        &self,
        myth: &NewMyth,
    ) -> impl std::future::Future<Output = Result<Uuid, StoreError>> + Send;

    /// Insert many myths in one transaction.
    ///
    /// Component rows for the whole batch go through set-based multi-row
    /// writes keyed by myth id, preserving per-myth component order. Round
    /// trips scale with the batch count, not the myth count.
    fn insert_bulk(
        &self,
        myths: &[NewMyth],
    ) -> impl std::future::Future<Output = Result<Vec<Uuid>, StoreError>> + Send;

    /// Fetch myths by id, components reconstructed in insertion order.
    ///
    /// Fails with `NotFound` naming every missing id.
    fn get_by_ids(
        &self,
        ids: &[Uuid],
    ) -> impl std::future::Future<Output = Result<HashMap<Uuid, Myth>, StoreError>> + Send;

    /// Apply a patch to one myth.
    ///
    /// A `components` patch replaces the full component list and re-runs
    /// weight-sum, dimension, and referential-integrity validation.
    fn update_one(
        &self,
        id: Uuid,
        patch: &MythPatch,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Apply patches to many myths in one transaction, all-or-nothing.
    fn update_bulk(
        &self,
        patches: &[(Uuid, MythPatch)],
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Delete one myth. Its component list is discarded; referenced
    /// mythemes are untouched.
    fn delete_one(
        &self,
        id: Uuid,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Delete many myths in one transaction, all-or-nothing.
    fn delete_bulk(
        &self,
        ids: &[Uuid],
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}
