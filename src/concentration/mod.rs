//! Signal intensity to contrast agent concentration
//!
//! Every voxel is converted independently: a baseline `S0` is estimated from
//! the pre-bolus frames, then each frame is passed through the inverted
//! [SignalEquation]. Samples outside the domain of the equation become zero
//! and are counted in [Conversion::degenerate_samples].

mod signal;

pub use signal::SignalEquation;

use std::borrow::Cow;

use ndarray::{Array3, Axis, Zip};
use serde::{Deserialize, Serialize};

use crate::bat::{BatEstimator, BolusArrivalEstimator};
use crate::data::{self, ConcentrationVolume, MaskVolume, SignalVolume, T1Map};
use crate::error::ConfigError;

/// Where the pre-bolus baseline used for `S0` ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BaselinePolicy {
    /// Whichever of the gradient crossing and the bolus arrival comes first
    #[default]
    Earliest,
    /// The first frame whose relative rise exceeds the threshold
    GradientThreshold,
    /// The bolus arrival frame
    BolusArrival,
}

/// Number of leading frames averaged into `S0`.
///
/// The gradient crossing is the first `i` with
/// `100 · (s[i+1] - s[i]) / |s[i]| > threshold`, the baseline then covering
/// frames `0..=i`. A series that never crosses uses all its frames. The result
/// is at least 1 for a non-empty series.
pub fn baseline_length(series: &[f64], threshold: f64, bat: usize, policy: BaselinePolicy) -> usize {
    let n = series.len();
    if n == 0 {
        return 0;
    }

    let crossing = series
        .windows(2)
        .position(|w| {
            let rise = w[1] - w[0];
            let relative = if w[0] != 0.0 {
                100.0 * rise / w[0].abs()
            } else {
                rise
            };
            relative > threshold
        })
        .map_or(n, |i| i + 1);

    let end = match policy {
        BaselinePolicy::Earliest => crossing.min(bat),
        BaselinePolicy::GradientThreshold => crossing,
        BaselinePolicy::BolusArrival => bat,
    };
    end.clamp(1, n)
}

/// Mean of the baseline frames
pub fn baseline_s0(series: &[f64], threshold: f64, bat: usize, policy: BaselinePolicy) -> f64 {
    let len = baseline_length(series, threshold, bat, policy);
    if len == 0 {
        return 0.0;
    }
    series[..len].iter().sum::<f64>() / len as f64
}

/// Result of converting a signal volume
#[derive(Debug, Clone)]
pub struct Conversion {
    pub concentration: ConcentrationVolume,
    /// Per voxel, the number of frames that could not be converted
    pub degenerate_samples: Array3<u32>,
}

impl Conversion {
    pub fn total_degenerate(&self) -> u64 {
        self.degenerate_samples.iter().map(|d| *d as u64).sum()
    }
}

/// Converts a whole signal volume to concentration
#[derive(Debug, Clone)]
pub struct ConcentrationConverter<'a> {
    equation: SignalEquation,
    t1_tissue: f64,
    t1_blood: f64,
    s0_threshold: f64,
    policy: BaselinePolicy,
    bat: &'a BatEstimator,
    t1_map: Option<&'a T1Map>,
    blood_mask: Option<&'a MaskVolume>,
    roi: Option<&'a MaskVolume>,
}

impl<'a> ConcentrationConverter<'a> {
    pub fn new(equation: SignalEquation, t1_tissue: f64, t1_blood: f64, bat: &'a BatEstimator) -> Self {
        Self {
            equation,
            t1_tissue,
            t1_blood,
            s0_threshold: 15.0,
            policy: BaselinePolicy::default(),
            bat,
            t1_map: None,
            blood_mask: None,
            roi: None,
        }
    }

    /// Relative rise (percent) that ends the baseline
    pub fn with_s0_threshold(mut self, threshold: f64) -> Self {
        self.s0_threshold = threshold;
        self
    }

    pub fn with_baseline_policy(mut self, policy: BaselinePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Per-voxel tissue T1; entries that are not positive keep the default
    pub fn with_t1_map(mut self, t1_map: Option<&'a T1Map>) -> Self {
        self.t1_map = t1_map;
        self
    }

    /// Voxels converted with the blood T1, typically the AIF mask
    pub fn with_blood_mask(mut self, mask: Option<&'a MaskVolume>) -> Self {
        self.blood_mask = mask;
        self
    }

    /// Restrict conversion to a region; other voxels stay zero unless they are blood voxels
    pub fn with_roi(mut self, roi: Option<&'a MaskVolume>) -> Self {
        self.roi = roi;
        self
    }

    fn t1_at(&self, xyz: [usize; 3]) -> f64 {
        if self.blood_mask.is_some() && data::is_selected(self.blood_mask, xyz) {
            return self.t1_blood;
        }
        match self.t1_map {
            Some(map) if map[xyz] > 0.0 => map[xyz],
            _ => self.t1_tissue,
        }
    }

    fn is_converted(&self, xyz: [usize; 3]) -> bool {
        data::is_selected(self.roi, xyz)
            || (self.blood_mask.is_some() && data::is_selected(self.blood_mask, xyz))
    }

    /// Convert one voxel's series in place, returning the number of degenerate frames
    pub fn convert_series(&self, series: &[f64], t1: f64, out: &mut [f64]) -> u32 {
        let bat = self.bat.estimate(series);
        let s0 = baseline_s0(series, self.s0_threshold, bat, self.policy);

        let mut degenerate = 0;
        for (c, s) in out.iter_mut().zip(series) {
            *c = match self.equation.concentration(*s, s0, t1) {
                Some(value) => value,
                None => {
                    degenerate += 1;
                    0.0
                }
            };
        }
        degenerate
    }

    pub fn convert(&self, signal: &SignalVolume) -> Result<Conversion, ConfigError> {
        let shape = data::spatial_shape(signal);
        if let Some(map) = self.t1_map {
            data::check_spatial_shape("T1 map", map, shape)?;
        }
        if let Some(mask) = self.blood_mask {
            data::check_spatial_shape("AIF mask", mask, shape)?;
        }
        if let Some(mask) = self.roi {
            data::check_spatial_shape("ROI mask", mask, shape)?;
        }

        tracing::debug!(
            "Converting {} voxels to concentration (TR {} ms, FA {} deg)",
            shape.iter().product::<usize>(),
            self.equation.repetition_time,
            self.equation.flip_angle
        );

        let mut concentration = ConcentrationVolume::zeros(signal.raw_dim());
        let mut degenerate_samples = Array3::<u32>::zeros((shape[0], shape[1], shape[2]));

        Zip::indexed(concentration.lanes_mut(Axis(3)))
            .and(signal.lanes(Axis(3)))
            .and(&mut degenerate_samples)
            .par_for_each(|(x, y, z), mut conc, sig, degenerate| {
                let xyz = [x, y, z];
                if !self.is_converted(xyz) {
                    return;
                }
                let series: Cow<[f64]> = match sig.as_slice() {
                    Some(s) => Cow::Borrowed(s),
                    None => Cow::Owned(sig.to_vec()),
                };
                let mut out = vec![0.0; series.len()];
                *degenerate = self.convert_series(&series, self.t1_at(xyz), &mut out);
                for (c, v) in conc.iter_mut().zip(out) {
                    *c = v;
                }
            });

        let conversion = Conversion {
            concentration,
            degenerate_samples,
        };
        let total = conversion.total_degenerate();
        if total > 0 {
            tracing::warn!("{} signal samples could not be converted and were set to zero", total);
        }
        Ok(conversion)
    }
}
