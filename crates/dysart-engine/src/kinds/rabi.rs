//! Rabi oscillations, driven at the parent spectrum's center frequency.

use async_trait::async_trait;
use serde_json::{json, Value};

use dysart_core::Snapshot;

use super::{fit_field, snapshot_from_log};
use crate::error::{DeriveError, UpdateError};
use crate::fitting::fit_rabi;
use crate::instrument::MeasurementConfig;
use crate::kind::{Derivation, FeatureKind, UpdateContext};
use crate::simulator::{DRIVE_FREQUENCY, PLATEAU, POLARIZATION_Z, RABI_TEMPLATE};

/// Parent role that must point at a [`super::QubitSpectrum`].
pub const SPECTRUM_ROLE: &str = "spec";

#[derive(Debug, Default, Clone, Copy)]
pub struct QubitRabi;

#[async_trait]
impl FeatureKind for QubitRabi {
    fn name(&self) -> &str {
        "QubitRabi"
    }

    fn accessors(&self) -> &'static [&'static str] {
        &[
            "fit",
            "frequency",
            "pi_time",
            "pi_2_time",
            "decay_rate",
            "decay_time",
            "phase",
        ]
    }

    async fn update(&self, ctx: &UpdateContext) -> Result<Snapshot, UpdateError> {
        let center = ctx.parent_value(SPECTRUM_ROLE, "center_freq")?;
        let config = MeasurementConfig::new(RABI_TEMPLATE)
            .with(DRIVE_FREQUENCY, center.clone())
            .merge(ctx.feature().settings());
        let raw = ctx.measure(&config).await?;
        let mut snapshot = snapshot_from_log(&raw);
        snapshot.insert(DRIVE_FREQUENCY, center);
        Ok(snapshot)
    }

    fn derive(&self, name: &str, d: &mut Derivation<'_>) -> Result<Value, DeriveError> {
        match name {
            "fit" => {
                let fit = fit_rabi(&d.series(PLATEAU)?, &d.series(POLARIZATION_Z)?)?;
                Ok(json!({
                    "offset": fit.offset,
                    "amplitude": fit.amplitude,
                    "frequency": fit.frequency,
                    "phase": fit.phase,
                    "decay": fit.decay,
                }))
            }
            "frequency" => Ok(json!(fit_field(d, "fit", "frequency")?)),
            "phase" => Ok(json!(fit_field(d, "fit", "phase")?)),
            "pi_time" => Ok(json!(0.5 / d.number("frequency")?)),
            "pi_2_time" => Ok(json!(0.25 / d.number("frequency")?)),
            "decay_rate" => Ok(json!(fit_field(d, "fit", "decay")?)),
            "decay_time" => {
                let rate = d.number("decay_rate")?;
                Ok(if rate > 0.0 { json!(1.0 / rate) } else { Value::Null })
            }
            other => Err(DeriveError::UnknownAccessor {
                kind: self.name().to_string(),
                name: other.to_string(),
            }),
        }
    }
}
