use serde::{Deserialize, Serialize};

use crate::aif::{AifCurve, ArterialInputFunction};
use crate::data::Timing;
use crate::error::ConfigError;

/// One Gaussian term of the population curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianPeak {
    /// Scaling (mmol·min)
    pub amplitude: f64,
    /// Centre (min)
    pub centre: f64,
    /// Width (min)
    pub width: f64,
}

impl GaussianPeak {
    #[inline]
    fn evaluate(&self, t: f64) -> f64 {
        let z = (t - self.centre) / self.width;
        self.amplitude / (self.width * (2.0 * std::f64::consts::PI).sqrt()) * (-0.5 * z * z).exp()
    }
}

/// Population-averaged arterial input function.
///
/// Two Gaussians for the first and recirculation passes plus an exponential
/// washout gated by a sigmoid, with time in minutes:
///
/// ```text
/// Cb(t) = Σₙ Aₙ / (σₙ √2π) · exp(-(t - Tₙ)² / 2σₙ²) + α · exp(-βt) / (1 + exp(-s(t - τ)))
/// ```
///
/// The curve is shifted so that it starts at `onset` seconds and is zero before.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PopulationAif {
    pub first_pass: GaussianPeak,
    pub recirculation: GaussianPeak,
    /// Washout amplitude (mmol)
    pub alpha: f64,
    /// Washout rate (1/min)
    pub beta: f64,
    /// Sigmoid width (1/min)
    pub s: f64,
    /// Sigmoid centre (min)
    pub tau: f64,
    /// Seconds from the first frame to bolus arrival in the artery
    pub onset: f64,
}

impl PopulationAif {
    /// Parker et al. (2006), MRM 56:993-1000
    pub fn parker(onset: f64) -> Self {
        Self {
            first_pass: GaussianPeak {
                amplitude: 0.809,
                centre: 0.17046,
                width: 0.0563,
            },
            recirculation: GaussianPeak {
                amplitude: 0.330,
                centre: 0.365,
                width: 0.132,
            },
            alpha: 1.050,
            beta: 0.1685,
            s: 38.078,
            tau: 0.483,
            onset,
        }
    }

    pub fn with_onset(mut self, onset: f64) -> Self {
        self.onset = onset;
        self
    }

    /// Concentration at `seconds` after the first frame
    pub fn evaluate(&self, seconds: f64) -> f64 {
        let t = (seconds - self.onset) / 60.0;
        if t < 0.0 {
            return 0.0;
        }
        let washout = self.alpha * (-self.beta * t).exp() / (1.0 + (-self.s * (t - self.tau)).exp());
        self.first_pass.evaluate(t) + self.recirculation.evaluate(t) + washout
    }

    /// The curve sampled on `timing`
    pub fn curve_on(&self, timing: &Timing) -> AifCurve {
        let values = timing.seconds().iter().map(|t| self.evaluate(*t)).collect();
        AifCurve {
            times: timing.seconds().to_vec(),
            values,
        }
    }
}

impl Default for PopulationAif {
    fn default() -> Self {
        Self::parker(0.0)
    }
}

impl ArterialInputFunction for PopulationAif {
    fn curve(&self, timing: &Timing) -> Result<AifCurve, ConfigError> {
        if !self.onset.is_finite() {
            return Err(ConfigError::InvalidOption {
                param: "population AIF onset".to_string(),
                value: self.onset.to_string(),
            });
        }
        Ok(self.curve_on(timing))
    }
}
