use ndarray::{Array1, Axis, Zip};

use crate::aif::{AifCurve, ArterialInputFunction};
use crate::data::{self, ConcentrationVolume, MaskVolume, Timing};
use crate::error::ConfigError;

/// AIF taken as the mean concentration curve of the voxels selected by a mask
#[derive(Debug, Clone, Copy)]
pub struct MaskAveragedAif<'a> {
    concentration: &'a ConcentrationVolume,
    mask: &'a MaskVolume,
}

impl<'a> MaskAveragedAif<'a> {
    pub fn new(concentration: &'a ConcentrationVolume, mask: &'a MaskVolume) -> Self {
        Self {
            concentration,
            mask,
        }
    }

    /// Number of voxels the average is taken over
    pub fn n_voxels(&self) -> usize {
        self.mask.iter().filter(|m| **m != 0).count()
    }
}

impl ArterialInputFunction for MaskAveragedAif<'_> {
    fn curve(&self, timing: &Timing) -> Result<AifCurve, ConfigError> {
        let n_times = data::channels(self.concentration);
        if n_times == 0 || self.concentration.is_empty() {
            return Err(ConfigError::NoAifSource);
        }
        if n_times != timing.len() {
            return Err(ConfigError::TimingMismatch {
                timing: timing.len(),
                channels: n_times,
            });
        }
        data::check_spatial_shape(
            "AIF mask",
            self.mask,
            data::spatial_shape(self.concentration),
        )?;

        let mut sum = Array1::<f64>::zeros(n_times);
        let mut count = 0usize;
        Zip::from(self.concentration.lanes(Axis(3)))
            .and(self.mask)
            .for_each(|series, &flag| {
                if flag != 0 {
                    sum += &series;
                    count += 1;
                }
            });

        if count == 0 {
            return Err(ConfigError::NoAifSource);
        }

        tracing::debug!("AIF averaged over {} voxels", count);
        sum /= count as f64;
        AifCurve::on_timing(timing, sum.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume() -> ConcentrationVolume {
        ConcentrationVolume::from_shape_fn((2, 2, 1, 3), |(x, y, _, t)| {
            (x * 10 + y) as f64 + 0.25 * t as f64
        })
    }

    #[test]
    fn single_voxel_mask_returns_that_voxel() {
        let conc = volume();
        let mut mask = MaskVolume::zeros((2, 2, 1));
        mask[[1, 0, 0]] = 1;
        let timing = Timing::new(vec![0.0, 1.0, 2.0]).unwrap();

        let aif = MaskAveragedAif::new(&conc, &mask).curve(&timing).unwrap();
        let expected: Vec<f64> = data::voxel_series(&conc, [1, 0, 0]).to_vec();
        assert_eq!(aif.values(), expected.as_slice());
    }

    #[test]
    fn average_over_two_voxels() {
        let conc = volume();
        let mut mask = MaskVolume::zeros((2, 2, 1));
        mask[[0, 0, 0]] = 1;
        mask[[0, 1, 0]] = 7;
        let timing = Timing::new(vec![0.0, 1.0, 2.0]).unwrap();

        let aif = MaskAveragedAif::new(&conc, &mask).curve(&timing).unwrap();
        assert_eq!(aif.values(), &[0.5, 0.75, 1.0]);
    }

    #[test]
    fn empty_mask_has_no_aif() {
        let conc = volume();
        let mask = MaskVolume::zeros((2, 2, 1));
        let timing = Timing::new(vec![0.0, 1.0, 2.0]).unwrap();
        assert_eq!(
            MaskAveragedAif::new(&conc, &mask).curve(&timing).unwrap_err(),
            ConfigError::NoAifSource
        );
    }

    #[test]
    fn mask_must_match_volume() {
        let conc = volume();
        let mask = MaskVolume::ones((3, 2, 1));
        let timing = Timing::new(vec![0.0, 1.0, 2.0]).unwrap();
        assert!(matches!(
            MaskAveragedAif::new(&conc, &mask).curve(&timing),
            Err(ConfigError::ShapeMismatch { .. })
        ));
    }
}
