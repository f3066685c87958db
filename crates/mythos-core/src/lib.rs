//! Repository trait definitions and mythic algebra for Mythos.
//!
//! This crate defines the "ports" (repository traits) that the
//! infrastructure layer implements, plus the pure compose/decompose
//! functions bridging myth records and their dense matrix form. It depends
//! only on `mythos-types` -- never on `mythos-infra` or any database crate.

pub mod algebra;
pub mod repository;
