//! Arterial input function (AIF)
//!
//! The AIF is resolved once per run, before any voxel is fitted, from one of
//! three sources. When several are configured the priority is
//! prescribed file > population model > mask average.

mod mask;
mod population;

pub use mask::MaskAveragedAif;
pub use population::PopulationAif;

use serde::{Deserialize, Serialize};

use crate::data::{ConcentrationVolume, MaskVolume, Timing};
use crate::error::ConfigError;

/// Arterial concentration sampled at a sequence of time points (seconds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AifCurve {
    times: Vec<f64>,
    values: Vec<f64>,
}

impl AifCurve {
    /// Pair time points with concentrations; times must be non-decreasing
    pub fn new(times: Vec<f64>, values: Vec<f64>) -> Result<Self, ConfigError> {
        if times.len() != values.len() {
            return Err(ConfigError::InvalidOption {
                param: "AIF".to_string(),
                value: format!("{} times for {} values", times.len(), values.len()),
            });
        }
        if times.is_empty() {
            return Err(ConfigError::NoAifSource);
        }
        if times.windows(2).any(|w| w[1] < w[0]) {
            return Err(ConfigError::InvalidOption {
                param: "AIF timing".to_string(),
                value: "not monotonically non-decreasing".to_string(),
            });
        }
        Ok(Self { times, values })
    }

    /// A curve sampled exactly on the acquisition timing
    pub fn on_timing(timing: &Timing, values: Vec<f64>) -> Result<Self, ConfigError> {
        Self::new(timing.seconds().to_vec(), values)
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Concentration at time `t`, linearly interpolated and held constant beyond the ends
    pub fn interpolate(&self, t: f64) -> f64 {
        let n = self.times.len();
        if t <= self.times[0] {
            return self.values[0];
        }
        if t >= self.times[n - 1] {
            return self.values[n - 1];
        }
        // first sample strictly after t; 1 <= hi < n
        let hi = self.times.partition_point(|x| *x <= t);
        let (t0, t1) = (self.times[hi - 1], self.times[hi]);
        let (v0, v1) = (self.values[hi - 1], self.values[hi]);
        if t1 == t0 {
            return v1;
        }
        v0 + (v1 - v0) * (t - t0) / (t1 - t0)
    }

    /// Resample onto the acquisition timing
    pub fn resample(&self, timing: &Timing) -> AifCurve {
        AifCurve {
            times: timing.seconds().to_vec(),
            values: timing.seconds().iter().map(|t| self.interpolate(*t)).collect(),
        }
    }

    /// Whether the curve is already sampled on `timing`
    pub fn is_sampled_on(&self, timing: &Timing) -> bool {
        self.times.as_slice() == timing.seconds()
    }
}

/// A provider of the arterial input function
pub trait ArterialInputFunction {
    /// The AIF sampled on the acquisition timing
    fn curve(&self, timing: &Timing) -> Result<AifCurve, ConfigError>;
}

impl ArterialInputFunction for AifCurve {
    fn curve(&self, timing: &Timing) -> Result<AifCurve, ConfigError> {
        if self.is_sampled_on(timing) {
            Ok(self.clone())
        } else {
            Ok(self.resample(timing))
        }
    }
}

/// The AIF source selected for a run
#[derive(Debug, Clone)]
pub enum AifSource<'a> {
    /// Read from a two-column file
    Prescribed(AifCurve),
    /// Closed-form population curve
    Population(PopulationAif),
    /// Average concentration under a mask
    MaskAveraged(MaskAveragedAif<'a>),
}

impl<'a> AifSource<'a> {
    /// Pick the source with the highest priority among those available.
    ///
    /// The mask source needs the concentration volume, so it is only
    /// chosen when both are supplied.
    pub fn select(
        prescribed: Option<AifCurve>,
        population: Option<PopulationAif>,
        mask: Option<(&'a ConcentrationVolume, &'a MaskVolume)>,
    ) -> Result<Self, ConfigError> {
        if let Some(curve) = prescribed {
            return Ok(AifSource::Prescribed(curve));
        }
        if let Some(population) = population {
            return Ok(AifSource::Population(population));
        }
        if let Some((concentration, mask)) = mask {
            return Ok(AifSource::MaskAveraged(MaskAveragedAif::new(
                concentration,
                mask,
            )));
        }
        Err(ConfigError::NoAifSource)
    }

    pub fn name(&self) -> &'static str {
        match self {
            AifSource::Prescribed(_) => "prescribed",
            AifSource::Population(_) => "population",
            AifSource::MaskAveraged(_) => "mask averaged",
        }
    }
}

impl ArterialInputFunction for AifSource<'_> {
    fn curve(&self, timing: &Timing) -> Result<AifCurve, ConfigError> {
        match self {
            AifSource::Prescribed(curve) => curve.curve(timing),
            AifSource::Population(population) => population.curve(timing),
            AifSource::MaskAveraged(mask) => mask.curve(timing),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn interpolation_is_linear_and_clamped() {
        let aif = AifCurve::new(vec![0.0, 10.0, 20.0], vec![0.0, 1.0, 3.0]).unwrap();
        assert_relative_eq!(aif.interpolate(5.0), 0.5, epsilon = 1e-12);
        assert_relative_eq!(aif.interpolate(15.0), 2.0, epsilon = 1e-12);
        assert_eq!(aif.interpolate(-1.0), 0.0);
        assert_eq!(aif.interpolate(25.0), 3.0);
        assert_eq!(aif.interpolate(10.0), 1.0);
    }

    #[test]
    fn prescribed_curve_is_resampled_to_timing() {
        let timing = Timing::new(vec![0.0, 5.0, 10.0, 15.0]).unwrap();
        let aif = AifCurve::new(vec![0.0, 10.0], vec![0.0, 2.0]).unwrap();
        let curve = AifSource::Prescribed(aif).curve(&timing).unwrap();
        assert_eq!(curve.times(), timing.seconds());
        assert_eq!(curve.values(), &[0.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn prescribed_wins_over_population_and_mask() {
        let conc = ConcentrationVolume::zeros((1, 1, 1, 2));
        let mask = MaskVolume::ones((1, 1, 1));
        let prescribed = AifCurve::new(vec![0.0, 1.0], vec![0.0, 1.0]).unwrap();

        let source = AifSource::select(
            Some(prescribed),
            Some(PopulationAif::parker(0.0)),
            Some((&conc, &mask)),
        )
        .unwrap();
        assert_eq!(source.name(), "prescribed");

        let source =
            AifSource::select(None, Some(PopulationAif::parker(0.0)), Some((&conc, &mask))).unwrap();
        assert_eq!(source.name(), "population");

        let source = AifSource::select(None, None, Some((&conc, &mask))).unwrap();
        assert_eq!(source.name(), "mask averaged");
    }

    #[test]
    fn no_source_is_a_configuration_error() {
        assert_eq!(
            AifSource::select(None, None, None).unwrap_err(),
            ConfigError::NoAifSource
        );
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        assert!(AifCurve::new(vec![0.0, 1.0], vec![0.0]).is_err());
        assert!(AifCurve::new(vec![1.0, 0.0], vec![0.0, 0.0]).is_err());
    }
}
