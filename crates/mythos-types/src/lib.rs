//! Shared domain types for Mythos.
//!
//! This crate contains the core domain types used across the Mythos
//! workspace: Mytheme, Myth, their insert/patch shapes, the embedding
//! configuration, and the store error taxonomy.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod myth;
pub mod mytheme;
