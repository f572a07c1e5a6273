//! Closed-form estimators for qubit spectroscopy and Rabi data.
//!
//! These are pure functions from sampled traces to fit parameters. They
//! favour robustness over precision: the spectrum fit reads the half-depth
//! crossings of a single dip, the Rabi fit counts zero crossings and
//! regresses the log of the oscillation envelope.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum FitError {
    #[error("x has {x} samples but y has {y}")]
    LengthMismatch { x: usize, y: usize },

    #[error("need at least {needed} samples, got {got}")]
    TooFewPoints { needed: usize, got: usize },

    #[error("trace contains non-finite samples")]
    NonFinite,

    #[error("trace has no resolvable dip")]
    Flat,

    #[error("trace has fewer than two zero crossings")]
    TooFewOscillations,
}

/// One Lorentzian dip below a flat baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectrumFit {
    pub center: f64,
    pub fwhm: f64,
    pub depth: f64,
    pub baseline: f64,
}

/// `offset + amplitude * exp(-decay t) * cos(2 pi frequency t + phase)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RabiFit {
    pub offset: f64,
    pub amplitude: f64,
    pub frequency: f64,
    pub phase: f64,
    pub decay: f64,
}

fn check_trace(x: &[f64], y: &[f64], needed: usize) -> Result<(), FitError> {
    if x.len() != y.len() {
        return Err(FitError::LengthMismatch {
            x: x.len(),
            y: y.len(),
        });
    }
    if x.len() < needed {
        return Err(FitError::TooFewPoints {
            needed,
            got: x.len(),
        });
    }
    if x.iter().chain(y).any(|v| !v.is_finite()) {
        return Err(FitError::NonFinite);
    }
    Ok(())
}

/// Fits a single dip: baseline is the trace maximum, the center and width
/// come from the interpolated half-depth crossings either side of the
/// minimum.
pub fn fit_spectrum(x: &[f64], y: &[f64]) -> Result<SpectrumFit, FitError> {
    check_trace(x, y, 3)?;

    let baseline = y.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let (i_min, y_min) = y
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::INFINITY), |acc, (i, v)| if v < acc.1 { (i, v) } else { acc });
    let depth = baseline - y_min;
    if depth <= f64::EPSILON * baseline.abs().max(1.0) {
        return Err(FitError::Flat);
    }
    let half = baseline - depth / 2.0;

    let mut i = i_min;
    while i > 0 && y[i] < half {
        i -= 1;
    }
    let left = if y[i] < half {
        x[i]
    } else {
        let t = (y[i] - half) / (y[i] - y[i + 1]);
        x[i] + t * (x[i + 1] - x[i])
    };

    let mut j = i_min;
    while j + 1 < y.len() && y[j] < half {
        j += 1;
    }
    let right = if y[j] < half {
        x[j]
    } else {
        let t = (half - y[j - 1]) / (y[j] - y[j - 1]);
        x[j - 1] + t * (x[j] - x[j - 1])
    };

    Ok(SpectrumFit {
        center: (left + right) / 2.0,
        fwhm: right - left,
        depth,
        baseline,
    })
}

/// Fits a decaying cosine.
pub fn fit_rabi(t: &[f64], y: &[f64]) -> Result<RabiFit, FitError> {
    check_trace(t, y, 4)?;

    let n = y.len() as f64;
    let offset = y.iter().sum::<f64>() / n;
    let d: Vec<f64> = y.iter().map(|v| v - offset).collect();

    // (sample index before the crossing, interpolated crossing time)
    let mut crossings: Vec<(usize, f64)> = Vec::new();
    for i in 0..d.len() - 1 {
        if d[i] * d[i + 1] < 0.0 {
            let frac = d[i] / (d[i] - d[i + 1]);
            crossings.push((i, t[i] + frac * (t[i + 1] - t[i])));
        }
    }
    if crossings.len() < 2 {
        return Err(FitError::TooFewOscillations);
    }
    let first = crossings[0].1;
    let last = crossings[crossings.len() - 1].1;
    let frequency = (crossings.len() - 1) as f64 / (2.0 * (last - first));

    let (i_max, _) = argmax(y);
    let (i_min, _) = argmax(&y.iter().map(|v| -v).collect::<Vec<_>>());
    let swing = (y[i_max] - y[i_min]) / 2.0;
    let amplitude = if i_max < i_min { swing } else { -swing };

    // Envelope peaks: one per half period, ending at the last full crossing.
    let mut peaks: Vec<(f64, f64)> = Vec::new();
    let mut start = 0;
    for &(end, _) in &crossings {
        let (k, a) = (start..=end)
            .map(|k| (k, d[k].abs()))
            .fold((start, 0.0), |acc, (k, a)| if a > acc.1 { (k, a) } else { acc });
        if a > 0.0 {
            peaks.push((t[k], a.ln()));
        }
        start = end + 1;
    }
    let decay = (-slope(&peaks)).max(0.0);

    Ok(RabiFit {
        offset,
        amplitude,
        frequency,
        phase: 0.0,
        decay,
    })
}

fn argmax(v: &[f64]) -> (usize, f64) {
    v.iter()
        .copied()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |acc, (i, x)| if x > acc.1 { (i, x) } else { acc })
}

/// Least-squares slope, zero for fewer than two points.
fn slope(points: &[(f64, f64)]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let n = points.len() as f64;
    let mx = points.iter().map(|p| p.0).sum::<f64>() / n;
    let my = points.iter().map(|p| p.1).sum::<f64>() / n;
    let sxx: f64 = points.iter().map(|p| (p.0 - mx).powi(2)).sum();
    if sxx == 0.0 {
        return 0.0;
    }
    let sxy: f64 = points.iter().map(|p| (p.0 - mx) * (p.1 - my)).sum();
    sxy / sxx
}
