//! A deterministic single-qubit simulator.
//!
//! Implements [`Instrument`] for two templates:
//!
//! - `qubit_spectrum`: sweeps drive frequency and reports Z polarization,
//!   which dips as a Lorentzian around the qubit frequency.
//! - `qubit_rabi`: sweeps drive plateau length at a fixed drive frequency
//!   and reports Z polarization, a damped cosine whose contrast and rate
//!   depend on detuning.
//!
//! Frequencies are in GHz and times in ns. Output is noise-free so results
//! are reproducible.

use async_trait::async_trait;
use indexmap::IndexMap;
use std::f64::consts::PI;

use crate::error::InstrumentError;
use crate::instrument::{Instrument, MeasurementConfig, RawLog};

pub const SPECTRUM_TEMPLATE: &str = "qubit_spectrum";
pub const RABI_TEMPLATE: &str = "qubit_rabi";

pub const DRIVE_FREQUENCY: &str = "drive_frequency";
pub const PLATEAU: &str = "plateau";
pub const POLARIZATION_Z: &str = "polarization_z";

const MAX_POINTS: f64 = 100_000.0;

/// Physical parameters of the simulated qubit.
#[derive(Debug, Clone)]
pub struct QubitSimulator {
    pub qubit_frequency: f64,
    /// Half width at half maximum of the spectroscopy dip.
    pub linewidth: f64,
    /// Depth of the spectroscopy dip, in polarization units.
    pub contrast: f64,
    /// Rabi frequency per unit drive amplitude.
    pub rabi_rate: f64,
    pub t2: f64,
}

impl Default for QubitSimulator {
    fn default() -> Self {
        QubitSimulator {
            qubit_frequency: 5.02,
            linewidth: 0.005,
            contrast: 0.8,
            rabi_rate: 0.01,
            t2: 1000.0,
        }
    }
}

impl QubitSimulator {
    fn spectrum(&self, config: &MeasurementConfig) -> Result<RawLog, InstrumentError> {
        let start = config.number("freq_start", 4.9)?;
        let stop = config.number("freq_stop", 5.1)?;
        let freqs = sweep(start, stop, points(config, 201.0)?);
        let g2 = self.linewidth * self.linewidth;
        let pz = freqs
            .iter()
            .map(|f| 1.0 - self.contrast * g2 / ((f - self.qubit_frequency).powi(2) + g2))
            .collect();
        Ok(log([(DRIVE_FREQUENCY, freqs), (POLARIZATION_Z, pz)]))
    }

    fn rabi(&self, config: &MeasurementConfig) -> Result<RawLog, InstrumentError> {
        let drive = match config.settings.get(DRIVE_FREQUENCY) {
            Some(_) => config.number(DRIVE_FREQUENCY, 0.0)?,
            None => {
                return Err(InstrumentError::InvalidSetting {
                    name: DRIVE_FREQUENCY.to_string(),
                    reason: "required for a Rabi sweep".to_string(),
                })
            }
        };
        let amplitude = config.number("drive_amplitude", 1.0)?;
        let stop = config.number("plateau_stop", 500.0)?;
        let times = sweep(0.0, stop, points(config, 251.0)?);

        let omega = self.rabi_rate * amplitude;
        let detuning = drive - self.qubit_frequency;
        let effective = (omega * omega + detuning * detuning).sqrt();
        let pz = times
            .iter()
            .map(|t| {
                if effective == 0.0 {
                    return 1.0;
                }
                let weight = (omega / effective).powi(2);
                let ringing = (-t / self.t2).exp() * (2.0 * PI * effective * t).cos();
                1.0 - weight * (1.0 - ringing)
            })
            .collect();
        Ok(log([(PLATEAU, times), (POLARIZATION_Z, pz)]))
    }
}

#[async_trait]
impl Instrument for QubitSimulator {
    async fn perform_measurement(
        &self,
        config: &MeasurementConfig,
    ) -> Result<RawLog, InstrumentError> {
        if let Some(fault) = config.settings.get("inject_fault") {
            return Err(InstrumentError::Measurement(
                fault.as_str().unwrap_or("injected fault").to_string(),
            ));
        }
        match config.template.as_str() {
            SPECTRUM_TEMPLATE => self.spectrum(config),
            RABI_TEMPLATE => self.rabi(config),
            other => Err(InstrumentError::UnknownTemplate(other.to_string())),
        }
    }
}

fn points(config: &MeasurementConfig, default: f64) -> Result<usize, InstrumentError> {
    let n = config.number("points", default)?;
    if n.fract() != 0.0 || !(2.0..=MAX_POINTS).contains(&n) {
        return Err(InstrumentError::InvalidSetting {
            name: "points".to_string(),
            reason: format!("expected an integer in 2..={MAX_POINTS}, got {n}"),
        });
    }
    Ok(n as usize)
}

fn sweep(start: f64, stop: f64, n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| start + (stop - start) * i as f64 / (n - 1) as f64)
        .collect()
}

fn log<const N: usize>(channels: [(&str, Vec<f64>); N]) -> RawLog {
    RawLog {
        channels: channels
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect::<IndexMap<_, _>>(),
    }
}
