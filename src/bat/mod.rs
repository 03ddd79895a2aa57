//! Bolus arrival time (BAT) estimation
//!
//! A BAT estimator maps a time series (signal or concentration) to the frame
//! index at which the contrast agent arrives. The same estimator is used by the
//! concentration conversion and by the quantification so both agree on the
//! arrival frame.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Strategy interface for locating the bolus arrival frame
pub trait BolusArrivalEstimator: Send + Sync {
    /// Index of the frame at which contrast arrives
    fn estimate(&self, series: &[f64]) -> usize;
}

/// Always reports the same, configured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantBat {
    index: usize,
}

impl ConstantBat {
    /// A constant estimator for series of `len` frames; the index must lie in `[0, len)`
    pub fn new(index: usize, len: usize) -> Result<Self, ConfigError> {
        if index >= len {
            return Err(ConfigError::InvalidBat {
                reason: format!("constant BAT {} is outside [0, {})", index, len),
            });
        }
        Ok(Self { index })
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl BolusArrivalEstimator for ConstantBat {
    fn estimate(&self, series: &[f64]) -> usize {
        self.index.min(series.len().saturating_sub(1))
    }
}

/// Reports the frame with the steepest rise.
///
/// The rise into frame `i` is `s[i] - s[i - 1]`; the first frame with the
/// largest positive rise wins, so a linear ramp reports frame 1 and only an
/// accelerating ramp reports its last frame. Series without any positive rise,
/// or with fewer than two samples, fall back to frame 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeakGradientBat;

impl BolusArrivalEstimator for PeakGradientBat {
    fn estimate(&self, series: &[f64]) -> usize {
        if series.len() < 2 {
            return 0;
        }

        let mut best = 0;
        let mut best_rise = 0.0;
        for (i, w) in series.windows(2).enumerate() {
            let rise = w[1] - w[0];
            if rise > best_rise {
                best_rise = rise;
                best = i + 1;
            }
        }
        best
    }
}

/// Selects the BAT strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BatMode {
    /// Use the configured constant frame
    Constant,
    /// Use the frame with the steepest signal rise
    #[default]
    PeakGradient,
}

impl FromStr for BatMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Constant" | "UseConstantBAT" => Ok(BatMode::Constant),
            "PeakGradient" => Ok(BatMode::PeakGradient),
            other => Err(ConfigError::InvalidBat {
                reason: format!("unknown BAT mode '{}'", other),
            }),
        }
    }
}

impl fmt::Display for BatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatMode::Constant => write!(f, "Constant"),
            BatMode::PeakGradient => write!(f, "PeakGradient"),
        }
    }
}

/// The estimator selected for a run, shared read-only by every stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatEstimator {
    Constant(ConstantBat),
    PeakGradient(PeakGradientBat),
}

impl BatEstimator {
    /// Build the estimator for series of `len` frames
    pub fn new(mode: BatMode, constant_index: usize, len: usize) -> Result<Self, ConfigError> {
        Ok(match mode {
            BatMode::Constant => BatEstimator::Constant(ConstantBat::new(constant_index, len)?),
            BatMode::PeakGradient => BatEstimator::PeakGradient(PeakGradientBat),
        })
    }
}

impl BolusArrivalEstimator for BatEstimator {
    fn estimate(&self, series: &[f64]) -> usize {
        match self {
            BatEstimator::Constant(bat) => bat.estimate(series),
            BatEstimator::PeakGradient(bat) => bat.estimate(series),
        }
    }
}
