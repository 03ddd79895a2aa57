//! Voxel-wise fitting over a whole volume
//!
//! The driver selects the voxels of the region of interest, fits them in
//! parallel with [rayon] and scatters every [VoxelFit] into [ParameterMaps].
//! Voxels outside the region keep the sentinel record of [VoxelFit::skipped].

mod progress;

pub use progress::{ProgressBarObserver, ProgressObserver, ProgressTracker};

use std::collections::BTreeMap;

use ndarray::{s, Array1, Array3, Array4};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::{self, ConcentrationVolume, MaskVolume, ParameterVolume};
use crate::error::ConfigError;
use crate::fit::{PkModelFitter, VoxelFit};
use crate::model::ModelVariant;
use crate::optimize::FitStatus;

/// Per-voxel results, each volume sharing the spatial extent of the input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterMaps {
    pub ktrans: ParameterVolume,
    pub ve: ParameterVolume,
    /// Present for the extended model only
    pub fpv: Option<ParameterVolume>,
    pub auc: ParameterVolume,
    pub max_slope: ParameterVolume,
    pub r_squared: ParameterVolume,
    /// Bolus arrival frame
    pub bat: Array3<u32>,
    /// Optimizer iterations
    pub iterations: Array3<u32>,
    /// [FitStatus::code] of every voxel
    pub status: Array3<u8>,
    /// Model prediction per voxel, when requested
    pub fitted: Option<Array4<f64>>,
}

impl ParameterMaps {
    /// Maps filled with the sentinel of voxels that were not fitted
    pub fn new(shape: [usize; 3], variant: ModelVariant, n_times: usize, keep_fitted: bool) -> Self {
        let dim = (shape[0], shape[1], shape[2]);
        Self {
            ktrans: ParameterVolume::zeros(dim),
            ve: ParameterVolume::zeros(dim),
            fpv: match variant {
                ModelVariant::Tofts2 => None,
                ModelVariant::Tofts3 => Some(ParameterVolume::zeros(dim)),
            },
            auc: ParameterVolume::zeros(dim),
            max_slope: ParameterVolume::zeros(dim),
            r_squared: ParameterVolume::zeros(dim),
            bat: Array3::zeros(dim),
            iterations: Array3::zeros(dim),
            status: Array3::from_elem(dim, FitStatus::Skipped.code()),
            fitted: keep_fitted.then(|| Array4::zeros((shape[0], shape[1], shape[2], n_times))),
        }
    }

    /// Write one voxel's record
    pub fn insert(&mut self, xyz: [usize; 3], fit: &VoxelFit) {
        self.ktrans[xyz] = fit.params.ktrans;
        self.ve[xyz] = fit.params.ve;
        if let Some(fpv) = self.fpv.as_mut() {
            fpv[xyz] = fit.params.fpv.unwrap_or(0.0);
        }
        self.auc[xyz] = fit.auc;
        self.max_slope[xyz] = fit.max_slope;
        self.r_squared[xyz] = fit.r_squared;
        self.bat[xyz] = fit.bat as u32;
        self.iterations[xyz] = fit.iterations.min(u32::MAX as u64) as u32;
        self.status[xyz] = fit.status.code();
        if let Some(fitted) = self.fitted.as_mut() {
            if !fit.fitted.is_empty() {
                fitted
                    .slice_mut(s![xyz[0], xyz[1], xyz[2], ..])
                    .assign(&Array1::from(fit.fitted.clone()));
            }
        }
    }

    /// Number of voxels per status code
    pub fn status_counts(&self) -> BTreeMap<u8, usize> {
        let mut counts = BTreeMap::new();
        for code in self.status.iter() {
            *counts.entry(*code).or_insert(0) += 1;
        }
        counts
    }
}

/// Runs a [PkModelFitter] over every voxel of the region of interest
pub struct VoxelwiseDriver<'a> {
    fitter: &'a PkModelFitter<'a>,
    roi: Option<&'a MaskVolume>,
    keep_fitted: bool,
}

impl<'a> VoxelwiseDriver<'a> {
    pub fn new(fitter: &'a PkModelFitter<'a>) -> Self {
        Self {
            fitter,
            roi: None,
            keep_fitted: false,
        }
    }

    /// Only fit voxels selected by the mask
    pub fn with_roi(mut self, roi: Option<&'a MaskVolume>) -> Self {
        self.roi = roi;
        self
    }

    /// Keep the fitted curve of every voxel
    pub fn with_fitted_curves(mut self, keep: bool) -> Self {
        self.keep_fitted = keep;
        self
    }

    pub fn run(
        &self,
        concentration: &ConcentrationVolume,
        observer: Option<&dyn ProgressObserver>,
    ) -> Result<ParameterMaps, ConfigError> {
        let shape = data::spatial_shape(concentration);
        let n_times = data::channels(concentration);
        if n_times != self.fitter.n_times() {
            return Err(ConfigError::TimingMismatch {
                timing: self.fitter.n_times(),
                channels: n_times,
            });
        }
        if let Some(roi) = self.roi {
            data::check_spatial_shape("ROI mask", roi, shape)?;
        }

        let n_voxels: usize = shape.iter().product();
        let selected: Vec<usize> = (0..n_voxels)
            .filter(|i| data::is_selected(self.roi, data::index_to_xyz(*i, shape)))
            .collect();

        tracing::info!(
            "Fitting {:?} model to {} of {} voxels",
            self.fitter.variant(),
            selected.len(),
            n_voxels
        );

        let tracker = ProgressTracker::new(selected.len(), observer);
        let fits: Vec<(usize, VoxelFit)> = selected
            .par_iter()
            .map(|&index| {
                let xyz = data::index_to_xyz(index, shape);
                let curve = data::voxel_series(concentration, xyz).to_vec();
                let mut fit = self.fitter.fit(&curve);
                if !self.keep_fitted {
                    fit.fitted = Vec::new();
                }
                tracker.inc();
                (index, fit)
            })
            .collect();
        tracker.finish();

        let mut maps = ParameterMaps::new(shape, self.fitter.variant(), n_times, self.keep_fitted);
        for (index, fit) in &fits {
            maps.insert(data::index_to_xyz(*index, shape), fit);
        }

        log_summary(&fits, n_voxels - selected.len());
        Ok(maps)
    }
}

fn log_summary(fits: &[(usize, VoxelFit)], skipped: usize) {
    let count = |status: FitStatus| fits.iter().filter(|(_, f)| f.status == status).count();
    let converged = fits.iter().filter(|(_, f)| f.status.is_converged()).count();
    let zero = count(FitStatus::ZeroCurve);
    let max_iters = count(FitStatus::MaxIterations);
    let failed = count(FitStatus::NumericalFailure);

    tracing::info!(
        "{} voxels converged, {} zero curves, {} outside the region",
        converged,
        zero,
        skipped
    );
    if max_iters + failed > 0 {
        tracing::warn!(
            "{} voxels exhausted the iteration budget and {} failed numerically; their parameters are zero",
            max_iters,
            failed
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aif::{AifCurve, PopulationAif};
    use crate::bat::{BatEstimator, PeakGradientBat};
    use crate::data::Timing;
    use crate::model::ToftsModel;
    use approx::assert_relative_eq;

    fn setup() -> (Timing, AifCurve) {
        let timing = Timing::new((0..40).map(|i| i as f64 * 6.0).collect()).unwrap();
        let aif = PopulationAif::parker(24.0).curve_on(&timing);
        (timing, aif)
    }

    fn volume(timing: &Timing, aif: &AifCurve) -> ConcentrationVolume {
        let minutes = timing.minutes();
        let model = ToftsModel::new(ModelVariant::Tofts2, &minutes, aif.values());
        let mut conc = ConcentrationVolume::zeros((2, 2, 1, timing.len()));
        for (x, y, ktrans) in [(0, 0, 0.1), (1, 0, 0.2), (1, 1, 0.3)] {
            let curve = model.predict(&[ktrans, 0.4]);
            conc.slice_mut(s![x, y, 0, ..]).assign(&Array1::from(curve));
        }
        conc
    }

    #[test]
    fn fits_every_voxel_without_roi() {
        let (timing, aif) = setup();
        let conc = volume(&timing, &aif);
        let bat = BatEstimator::PeakGradient(PeakGradientBat);
        let fitter = PkModelFitter::new(&aif, &timing, ModelVariant::Tofts2, &bat);

        let maps = VoxelwiseDriver::new(&fitter).run(&conc, None).unwrap();

        assert_relative_eq!(maps.ktrans[[1, 1, 0]], 0.3, max_relative = 0.01);
        assert_relative_eq!(maps.ve[[1, 0, 0]], 0.4, max_relative = 0.01);
        assert_eq!(maps.status[[0, 1, 0]], FitStatus::ZeroCurve.code());
        assert!(maps.fpv.is_none());
        assert!(maps.fitted.is_none());
    }

    #[test]
    fn roi_voxels_only_and_sentinel_elsewhere() {
        let (timing, aif) = setup();
        let conc = volume(&timing, &aif);
        let bat = BatEstimator::PeakGradient(PeakGradientBat);
        let fitter = PkModelFitter::new(&aif, &timing, ModelVariant::Tofts2, &bat);
        let mut roi = MaskVolume::zeros((2, 2, 1));
        roi[[1, 0, 0]] = 1;

        let maps = VoxelwiseDriver::new(&fitter)
            .with_roi(Some(&roi))
            .with_fitted_curves(true)
            .run(&conc, None)
            .unwrap();

        assert!(maps.ktrans[[1, 0, 0]] > 0.0);
        assert_eq!(maps.ktrans[[1, 1, 0]], 0.0);
        assert_eq!(maps.status[[1, 1, 0]], FitStatus::Skipped.code());
        let fitted = maps.fitted.as_ref().unwrap();
        assert!(fitted.slice(s![1, 1, 0, ..]).iter().all(|v| *v == 0.0));
        assert!(fitted.slice(s![1, 0, 0, ..]).iter().any(|v| *v > 0.0));
        assert_eq!(maps.status_counts()[&FitStatus::Skipped.code()], 3);
    }

    #[test]
    fn reports_progress_to_completion() {
        let (timing, aif) = setup();
        let conc = volume(&timing, &aif);
        let bat = BatEstimator::PeakGradient(PeakGradientBat);
        let fitter = PkModelFitter::new(&aif, &timing, ModelVariant::Tofts2, &bat);
        let last = std::sync::Mutex::new(0.0);
        let observer = |f: f64| {
            let mut last = last.lock().unwrap();
            *last = f64::max(*last, f);
        };

        VoxelwiseDriver::new(&fitter).run(&conc, Some(&observer)).unwrap();
        assert_eq!(*last.lock().unwrap(), 1.0);
    }

    #[test]
    fn channel_count_must_match_fitter_timing() {
        let (timing, aif) = setup();
        let bat = BatEstimator::PeakGradient(PeakGradientBat);
        let fitter = PkModelFitter::new(&aif, &timing, ModelVariant::Tofts2, &bat);
        let conc = ConcentrationVolume::zeros((2, 2, 1, timing.len() - 3));

        let err = VoxelwiseDriver::new(&fitter).run(&conc, None).unwrap_err();
        assert_eq!(
            err,
            ConfigError::TimingMismatch {
                timing: timing.len(),
                channels: timing.len() - 3,
            }
        );
    }

    #[test]
    fn roi_shape_is_checked() {
        let (timing, aif) = setup();
        let conc = volume(&timing, &aif);
        let bat = BatEstimator::PeakGradient(PeakGradientBat);
        let fitter = PkModelFitter::new(&aif, &timing, ModelVariant::Tofts2, &bat);
        let roi = MaskVolume::ones((1, 1, 1));
        assert!(VoxelwiseDriver::new(&fitter).with_roi(Some(&roi)).run(&conc, None).is_err());
    }
}
