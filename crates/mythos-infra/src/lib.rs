//! Infrastructure layer for Mythos.
//!
//! Contains implementations of the repository traits defined in
//! `mythos-core`: SQLite storage with WAL mode and split read/write pools,
//! the vector blob codec, schema setup, and the mythic algebra connector
//! coupling the myth and mytheme stores.

pub mod connector;
pub mod sqlite;
