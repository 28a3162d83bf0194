//! Storage layer for threadline
//!
//! PostgreSQL-backed session persistence with an in-memory backend for
//! tests and storage-less development runs.

mod backend;
mod error;
mod memory;
mod migrations;
mod pg;
mod traits;

pub use backend::StorageBackend;
pub use error::StorageError;
pub use memory::MemoryStorage;
pub use pg::PgStorage;
pub use traits::SessionStore;
