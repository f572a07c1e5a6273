//! The DySART laboratory service.
//!
//! [`Laboratory`] owns a loaded feature graph and decides, for any feature,
//! what must be re-measured before its results can be served. Everything
//! kind-specific (update actions, derived accessors) lives behind
//! [`FeatureKind`]; everything physical lives behind [`Instrument`].
//!
//! # Modules
//!
//! - [`kind`]: the per-kind interface, exposed-method specs, memoizing derivations
//! - [`kinds`]: built-in kinds (`Feature`, `QubitSpectrum`, `QubitRabi`)
//! - [`registry`]: name -> kind and name -> hook registries
//! - [`hooks`]: pre/post refresh hooks
//! - [`instrument`]: the instrument collaborator and its rig lock
//! - [`simulator`]: a simulated single-qubit instrument
//! - [`fitting`]: closed-form spectrum and Rabi estimators
//! - [`resolver`]: the staleness resolver
//! - [`lab`]: the [`Laboratory`] service
//! - [`executor`]: refresh passes
//! - [`accessors`]: memoized derived values
//! - [`dispatch`]: exposed-method invocation
//! - [`project`]: YAML project loading
//! - [`error`]: error types

pub mod accessors;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod fitting;
pub mod hooks;
pub mod instrument;
pub mod kind;
pub mod kinds;
pub mod lab;
pub mod project;
pub mod registry;
pub mod resolver;
pub mod simulator;

#[cfg(test)]
mod testing;

pub use error::{ConfigError, DeriveError, EngineError, HookError, InstrumentError, UpdateError};
pub use executor::{HookFailure, RefreshReport};
pub use hooks::{Attachments, LogHook, NamedHook, RefreshHook};
pub use instrument::{Instrument, InstrumentHandle, MeasurementConfig, RawLog};
pub use kind::{
    Derivation, FeatureKind, MethodSource, MethodSpec, ParentView, UpdateContext, BUILTIN_METHODS,
};
pub use lab::Laboratory;
pub use project::{ExpirationConfig, FeatureConfig, ProjectConfig};
pub use registry::{HookRegistry, KindRegistry, RegisteredKind};
pub use simulator::QubitSimulator;
