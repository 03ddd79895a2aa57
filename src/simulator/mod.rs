//! Synthetic DCE acquisitions
//!
//! Tissue curves are generated with the Tofts model against a known AIF and
//! pushed through the [SignalEquation], giving signal volumes whose true
//! parameters are known. Optional Gaussian noise comes from a seeded RNG so
//! every synthesis is reproducible.

use ndarray::s;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::aif::AifCurve;
use crate::concentration::SignalEquation;
use crate::data::metadata::{
    Metadata, FLIP_ANGLE_KEY, FRAME_LABELS_KEY, FRAME_TAG_KEY, REPETITION_TIME_KEY,
};
use crate::data::{SignalVolume, Timing};
use crate::error::ConfigError;
use crate::model::{ModelVariant, PkParameters, ToftsModel};

/// What a synthetic voxel contains
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VoxelContent {
    /// No signal at all
    Background,
    /// Tissue with these plasma-referenced parameters
    Tissue(PkParameters),
    /// Arterial blood, following the AIF
    Artery,
}

/// Acquisition and tissue constants of a synthesis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SynthesisOptions {
    /// Baseline signal
    pub s0: f64,
    pub t1_tissue: f64,
    pub t1_blood: f64,
    pub repetition_time: f64,
    pub flip_angle: f64,
    pub relaxivity: f64,
    pub hematocrit: f64,
    /// Standard deviation of the additive signal noise
    pub noise_sd: f64,
    pub seed: u64,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            s0: 1000.0,
            t1_tissue: 1597.0,
            t1_blood: 1600.0,
            repetition_time: 5.0,
            flip_angle: 25.0,
            relaxivity: 0.0039,
            hematocrit: 0.4,
            noise_sd: 0.0,
            seed: 42,
        }
    }
}

impl SynthesisOptions {
    pub fn with_noise(mut self, sd: f64, seed: u64) -> Self {
        self.noise_sd = sd;
        self.seed = seed;
        self
    }

    pub fn with_hematocrit(mut self, hematocrit: f64) -> Self {
        self.hematocrit = hematocrit;
        self
    }

    pub fn equation(&self) -> SignalEquation {
        SignalEquation::new(self.repetition_time, self.flip_angle, self.relaxivity)
    }
}

/// Tissue concentration for plasma-referenced parameters, against a whole-blood AIF
pub fn tissue_curve(params: &PkParameters, timing: &Timing, aif: &AifCurve, hematocrit: f64) -> Vec<f64> {
    let scale = 1.0 / (1.0 - hematocrit);
    let blood = PkParameters {
        ktrans: params.ktrans * scale,
        ve: params.ve * scale,
        fpv: params.fpv.map(|f| f * scale),
    };
    let variant = match blood.fpv {
        Some(_) => ModelVariant::Tofts3,
        None => ModelVariant::Tofts2,
    };
    let minutes = timing.minutes();
    ToftsModel::new(variant, &minutes, aif.values()).predict(&blood.to_vec())
}

/// Synthesize a signal volume of spatial extent `shape`.
///
/// `content` decides what every voxel holds. The AIF must be sampled on `timing`.
pub fn synthesize_signal<F>(
    shape: [usize; 3],
    timing: &Timing,
    aif: &AifCurve,
    content: F,
    options: &SynthesisOptions,
) -> Result<SignalVolume, ConfigError>
where
    F: Fn([usize; 3]) -> VoxelContent,
{
    if aif.len() != timing.len() {
        return Err(ConfigError::TimingMismatch {
            timing: timing.len(),
            channels: aif.len(),
        });
    }
    let noise = if options.noise_sd > 0.0 {
        Some(
            Normal::new(0.0, options.noise_sd).map_err(|_| ConfigError::InvalidOption {
                param: "noise_sd".to_string(),
                value: options.noise_sd.to_string(),
            })?,
        )
    } else {
        None
    };

    let equation = options.equation();
    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut signal = SignalVolume::zeros((shape[0], shape[1], shape[2], timing.len()));

    for x in 0..shape[0] {
        for y in 0..shape[1] {
            for z in 0..shape[2] {
                let (concentration, t1) = match content([x, y, z]) {
                    VoxelContent::Background => continue,
                    VoxelContent::Tissue(params) => (
                        tissue_curve(&params, timing, aif, options.hematocrit),
                        options.t1_tissue,
                    ),
                    VoxelContent::Artery => (aif.values().to_vec(), options.t1_blood),
                };

                let mut series = signal.slice_mut(s![x, y, z, ..]);
                for (s, c) in series.iter_mut().zip(&concentration) {
                    *s = equation.signal(*c, options.s0, t1);
                    if let Some(normal) = &noise {
                        *s += normal.sample(&mut rng);
                    }
                }
            }
        }
    }

    Ok(signal)
}

/// Header attributes describing a synthetic acquisition
pub fn metadata(timing: &Timing, options: &SynthesisOptions) -> Metadata {
    let labels = timing
        .seconds()
        .iter()
        .map(|t| format!("{}", t * 1000.0))
        .collect::<Vec<_>>()
        .join(",");

    let mut metadata = Metadata::new();
    metadata.insert(REPETITION_TIME_KEY.to_string(), options.repetition_time.to_string());
    metadata.insert(FLIP_ANGLE_KEY.to_string(), options.flip_angle.to_string());
    metadata.insert(FRAME_TAG_KEY.to_string(), "TriggerTime".to_string());
    metadata.insert(FRAME_LABELS_KEY.to_string(), labels);
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aif::PopulationAif;
    use crate::data::metadata::timing as parse_timing;
    use approx::assert_relative_eq;

    fn setup() -> (Timing, AifCurve) {
        let timing = Timing::new((0..30).map(|i| i as f64 * 4.0).collect()).unwrap();
        let aif = PopulationAif::parker(20.0).curve_on(&timing);
        (timing, aif)
    }

    #[test]
    fn noiseless_tissue_converts_back_to_its_curve() {
        let (timing, aif) = setup();
        let options = SynthesisOptions::default();
        let params = PkParameters::tofts(0.12, 0.3);
        let signal = synthesize_signal(
            [1, 1, 1],
            &timing,
            &aif,
            |_| VoxelContent::Tissue(params),
            &options,
        )
        .unwrap();

        let truth = tissue_curve(&params, &timing, &aif, options.hematocrit);
        let eq = options.equation();
        for (s, c) in signal.iter().zip(&truth) {
            assert_relative_eq!(
                eq.concentration(*s, options.s0, options.t1_tissue).unwrap(),
                *c,
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn hematocrit_scales_tissue_curve() {
        let (timing, aif) = setup();
        let params = PkParameters::tofts(0.12, 0.3);
        let plasma = tissue_curve(&params, &timing, &aif, 0.0);
        let blood = tissue_curve(&params, &timing, &aif, 0.5);
        for (p, b) in plasma.iter().zip(&blood) {
            assert_relative_eq!(*b, 2.0 * p, epsilon = 1e-12);
        }
    }

    #[test]
    fn same_seed_same_noise() {
        let (timing, aif) = setup();
        let options = SynthesisOptions::default().with_noise(5.0, 7);
        let content = |_: [usize; 3]| VoxelContent::Artery;
        let a = synthesize_signal([2, 1, 1], &timing, &aif, content, &options).unwrap();
        let b = synthesize_signal([2, 1, 1], &timing, &aif, content, &options).unwrap();
        assert_eq!(a, b);

        let c = synthesize_signal(
            [2, 1, 1],
            &timing,
            &aif,
            content,
            &options.with_noise(5.0, 8),
        )
        .unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn background_has_no_signal() {
        let (timing, aif) = setup();
        let signal = synthesize_signal(
            [1, 2, 1],
            &timing,
            &aif,
            |xyz| {
                if xyz[1] == 0 {
                    VoxelContent::Background
                } else {
                    VoxelContent::Artery
                }
            },
            &SynthesisOptions::default(),
        )
        .unwrap();
        assert!(signal.slice(s![0, 0, 0, ..]).iter().all(|v| *v == 0.0));
        assert!(signal.slice(s![0, 1, 0, ..]).iter().all(|v| *v >= 1000.0 - 1e-9));
    }

    #[test]
    fn metadata_describes_the_timing() {
        let (timing, _) = setup();
        let parsed = parse_timing(&metadata(&timing, &SynthesisOptions::default())).unwrap();
        for (a, b) in parsed.seconds().iter().zip(timing.seconds()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-9);
        }
    }
}
