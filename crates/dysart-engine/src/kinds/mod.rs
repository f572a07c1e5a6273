//! Built-in feature kinds.
//!
//! - [`BaseFeature`] (`Feature`): no-op update, no accessors
//! - [`QubitSpectrum`]: spectroscopy sweep, Lorentzian fit
//! - [`QubitRabi`]: Rabi sweep driven at the parent spectrum's center

mod basic;
mod rabi;
mod spectrum;

pub use basic::BaseFeature;
pub use rabi::{QubitRabi, SPECTRUM_ROLE};
pub use spectrum::QubitSpectrum;

use serde_json::Value;

use dysart_core::Snapshot;

use crate::error::DeriveError;
use crate::instrument::RawLog;
use crate::kind::Derivation;

/// Stores every channel of a raw log as a JSON array.
fn snapshot_from_log(raw: &RawLog) -> Snapshot {
    raw.channels
        .iter()
        .map(|(name, data)| (name.clone(), Value::from(data.clone())))
        .collect()
}

/// Reads numeric field `key` of object-valued accessor `accessor`.
fn fit_field(d: &mut Derivation<'_>, accessor: &str, key: &str) -> Result<f64, DeriveError> {
    d.value(accessor)?
        .get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| DeriveError::MissingData {
            name: format!("{accessor}.{key}"),
        })
}
