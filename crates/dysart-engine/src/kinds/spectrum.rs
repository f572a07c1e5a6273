//! Qubit spectroscopy.

use async_trait::async_trait;
use serde_json::{json, Value};

use dysart_core::Snapshot;

use super::{fit_field, snapshot_from_log};
use crate::error::{DeriveError, UpdateError};
use crate::fitting::fit_spectrum;
use crate::instrument::MeasurementConfig;
use crate::kind::{Derivation, FeatureKind, UpdateContext};
use crate::simulator::{DRIVE_FREQUENCY, POLARIZATION_Z, SPECTRUM_TEMPLATE};

/// Polarization-vs-drive-frequency sweep of a single qubit.
#[derive(Debug, Default, Clone, Copy)]
pub struct QubitSpectrum;

#[async_trait]
impl FeatureKind for QubitSpectrum {
    fn name(&self) -> &str {
        "QubitSpectrum"
    }

    fn accessors(&self) -> &'static [&'static str] {
        &["fit", "center_freq", "linewidth"]
    }

    async fn update(&self, ctx: &UpdateContext) -> Result<Snapshot, UpdateError> {
        let config = MeasurementConfig::new(SPECTRUM_TEMPLATE).merge(ctx.feature().settings());
        let raw = ctx.measure(&config).await?;
        Ok(snapshot_from_log(&raw))
    }

    fn derive(&self, name: &str, d: &mut Derivation<'_>) -> Result<Value, DeriveError> {
        match name {
            "fit" => {
                let fit = fit_spectrum(&d.series(DRIVE_FREQUENCY)?, &d.series(POLARIZATION_Z)?)?;
                Ok(json!({
                    "center": fit.center,
                    "fwhm": fit.fwhm,
                    "depth": fit.depth,
                    "baseline": fit.baseline,
                }))
            }
            "center_freq" => Ok(json!(fit_field(d, "fit", "center")?)),
            // half width at half maximum
            "linewidth" => Ok(json!(fit_field(d, "fit", "fwhm")? / 2.0)),
            other => Err(DeriveError::UnknownAccessor {
                kind: self.name().to_string(),
                name: other.to_string(),
            }),
        }
    }
}
