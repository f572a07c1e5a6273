//! Persistence for DySART features, call records and requests.
//!
//! Provides the [`FeatureStore`] trait defining the storage contract, plus
//! [`InMemoryStore`] and [`SqliteStore`] as interchangeable backends.
//!
//! # Modules
//!
//! - [`error`]: StorageError enum with all failure modes
//! - [`traits`]: FeatureStore trait definition and prefix normalization
//! - [`memory`]: InMemoryStore implementation
//! - [`schema`]: migration setup for the SQLite backend
//! - [`sqlite`]: SqliteStore implementation

pub mod error;
pub mod memory;
pub mod schema;
pub mod sqlite;
pub mod traits;

#[cfg(test)]
mod testing;

pub use error::StorageError;
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{normalize_prefix, FeatureStore};
