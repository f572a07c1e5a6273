//! Error types for dysart-engine.
//!
//! The leaf errors ([`InstrumentError`], [`DeriveError`], [`UpdateError`],
//! [`HookError`], [`ConfigError`]) describe one failing collaborator each.
//! [`EngineError`] is what the laboratory service returns; it wraps the leaf
//! errors with the feature they occurred on.

use std::path::PathBuf;

use dysart_core::{CoreError, FeatureId};
use dysart_storage::StorageError;
use thiserror::Error;

use crate::fitting::FitError;

/// Failures reported by the instrument-control collaborator.
#[derive(Debug, Error)]
pub enum InstrumentError {
    #[error("unknown measurement template '{0}'")]
    UnknownTemplate(String),

    #[error("invalid measurement setting '{name}': {reason}")]
    InvalidSetting { name: String, reason: String },

    #[error("measurement failed: {0}")]
    Measurement(String),

    #[error("log has no channel '{0}'")]
    MissingChannel(String),
}

/// Failures while computing a derived value from a snapshot.
#[derive(Debug, Error)]
pub enum DeriveError {
    #[error("kind '{kind}' has no accessor '{name}'")]
    UnknownAccessor { kind: String, name: String },

    #[error("snapshot has no usable '{name}' data")]
    MissingData { name: String },

    #[error("fit failed: {0}")]
    Fit(#[from] FitError),

    #[error("accessor '{name}' recursed too deeply")]
    TooDeep { name: String },
}

/// Failures inside a kind's update action.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error(transparent)]
    Instrument(#[from] InstrumentError),

    #[error(transparent)]
    Derive(#[from] DeriveError),

    #[error("no parent with role '{role}'")]
    MissingParent { role: String },

    #[error("parent '{role}' has no measurement to read")]
    ParentUnmeasured { role: String },

    #[error("{0}")]
    Failed(String),
}

/// A refresh hook reported failure.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HookError(pub String);

/// Problems in a project description, caught before any state changes.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read project file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid project YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("feature '{feature}': unknown kind '{kind}'")]
    UnknownKind { feature: String, kind: String },

    #[error("feature '{feature}': unknown hook '{hook}'")]
    UnknownHook { feature: String, hook: String },

    #[error("feature '{feature}': stored kind '{stored}' differs from declared kind '{declared}'")]
    KindMismatch {
        feature: String,
        stored: String,
        declared: String,
    },

    #[error("feature id '{id}' is declared more than once")]
    DuplicateId { id: String },

    #[error("feature '{feature}': parent role '{role}' names unknown feature id '{parent}'")]
    MissingParent {
        feature: String,
        role: String,
        parent: String,
    },

    #[error("feature '{feature}': invalid expiration: {reason}")]
    InvalidExpiration { feature: String, reason: String },

    #[error("unknown project '{0}'")]
    UnknownProject(String),

    #[error("invalid feature graph: {0}")]
    Graph(CoreError),
}

/// Errors returned by the laboratory service.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The update action of `feature` failed; the pass was aborted.
    #[error("update of {feature} failed: {source}")]
    Update {
        feature: FeatureId,
        source: UpdateError,
    },

    /// A pre-hook vetoed the update of `feature`; the pass was aborted.
    #[error("pre-hook '{hook}' of {feature} failed: {source}")]
    PreHook {
        feature: FeatureId,
        hook: String,
        source: HookError,
    },

    #[error("accessor on {feature} failed: {source}")]
    Derive {
        feature: FeatureId,
        source: DeriveError,
    },

    #[error("no feature named '{0}'")]
    FeatureNotFound(String),

    #[error("method '{method}' is not exposed on {feature}")]
    Forbidden { feature: FeatureId, method: String },

    #[error("bad argument to '{method}': {reason}")]
    BadArgument { method: String, reason: String },

    #[error("cannot serialize result: {0}")]
    Serialize(#[from] serde_json::Error),
}
