//! Storage error types for dysart-storage.
//!
//! [`StorageError`] covers backend failures (SQLite, migrations,
//! serialization), lookups that found nothing or too much, and integrity
//! violations such as rewriting a concluded call record.

use dysart_core::FeatureId;
use thiserror::Error;

/// Errors produced by storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The SQLite driver reported an error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Applying schema migrations failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// No feature with the given id is stored.
    #[error("feature not found: {0}")]
    FeatureNotFound(FeatureId),

    /// No call record id starts with the given prefix.
    #[error("no call record matches prefix '{prefix}'")]
    RecordNotFound { prefix: String },

    /// More than one call record id starts with the given prefix.
    #[error("prefix '{prefix}' is ambiguous: {matches} call records match")]
    AmbiguousPrefix { prefix: String, matches: usize },

    /// A data integrity violation was detected.
    #[error("integrity error: {reason}")]
    IntegrityError { reason: String },
}
