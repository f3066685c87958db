//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (mythos-infra) implements. The core crate never depends on any specific
//! storage technology.

pub mod myth;
pub mod mytheme;

pub use myth::MythRepository;
pub use mytheme::MythemeRepository;
