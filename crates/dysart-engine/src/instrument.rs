//! The instrument-control collaborator.
//!
//! [`Instrument`] is the opaque "perform a physical measurement" boundary.
//! [`InstrumentHandle`] pairs an instrument with the rig-wide lock the
//! executor holds for the whole of each update action, so only one
//! measurement is ever in flight per handle, across every refresh pass
//! that shares it.

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::InstrumentError;

/// What to measure: a named template plus setting overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementConfig {
    pub template: String,
    #[serde(default)]
    pub settings: IndexMap<String, Value>,
}

impl MeasurementConfig {
    pub fn new(template: impl Into<String>) -> Self {
        MeasurementConfig {
            template: template.into(),
            settings: IndexMap::new(),
        }
    }

    /// Adds or replaces a setting, builder style.
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.settings.insert(name.into(), value);
        self
    }

    /// Overlays every entry of `overrides` on top of the current settings.
    pub fn merge(mut self, overrides: &IndexMap<String, Value>) -> Self {
        for (k, v) in overrides {
            self.settings.insert(k.clone(), v.clone());
        }
        self
    }

    /// A numeric setting, or `default` when absent.
    pub fn number(&self, name: &str, default: f64) -> Result<f64, InstrumentError> {
        match self.settings.get(name) {
            None => Ok(default),
            Some(v) => v.as_f64().ok_or_else(|| InstrumentError::InvalidSetting {
                name: name.to_string(),
                reason: format!("expected a number, got {v}"),
            }),
        }
    }
}

/// Channel data returned by one measurement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawLog {
    pub channels: IndexMap<String, Vec<f64>>,
}

impl RawLog {
    pub fn channel(&self, name: &str) -> Result<&[f64], InstrumentError> {
        self.channels
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| InstrumentError::MissingChannel(name.to_string()))
    }
}

/// A device (or simulator) able to run measurement templates.
#[async_trait]
pub trait Instrument: Send + Sync {
    async fn perform_measurement(&self, config: &MeasurementConfig)
        -> Result<RawLog, InstrumentError>;
}

/// Shared instrument plus its mutual-exclusion lock.
#[derive(Clone)]
pub struct InstrumentHandle {
    instrument: Arc<dyn Instrument>,
    rig: Arc<Mutex<()>>,
}

impl InstrumentHandle {
    pub fn new(instrument: impl Instrument + 'static) -> Self {
        Self::from_arc(Arc::new(instrument))
    }

    pub fn from_arc(instrument: Arc<dyn Instrument>) -> Self {
        InstrumentHandle {
            instrument,
            rig: Arc::new(Mutex::new(())),
        }
    }

    /// Waits for exclusive use of the rig.
    pub async fn acquire(&self) -> OwnedMutexGuard<()> {
        self.rig.clone().lock_owned().await
    }

    pub fn instrument(&self) -> Arc<dyn Instrument> {
        self.instrument.clone()
    }
}
