//! Per-voxel pharmacokinetic fitting
//!
//! [PkModelFitter] holds everything shared by all voxels of a run (AIF, time
//! grid, model, tolerances) and turns one concentration curve into a
//! [VoxelFit]. It never fails: degenerate curves and non-convergent fits are
//! reported through [FitStatus] with zeroed parameters.

pub mod metrics;

pub use metrics::{auc_segment, auc_window, max_slope, r_squared};

use serde::{Deserialize, Serialize};

use crate::aif::AifCurve;
use crate::bat::{BatEstimator, BolusArrivalEstimator};
use crate::data::Timing;
use crate::model::{ModelVariant, PkParameters, ToftsModel};
use crate::optimize::{
    minimize, CurveFitProblem, FitStatus, LevenbergMarquardt, Minimum, SolverOptions,
};

/// Everything estimated for one voxel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoxelFit {
    /// Plasma-referenced kinetic parameters
    pub params: PkParameters,
    /// Area under the concentration curve from bolus arrival (concentration × s)
    pub auc: f64,
    /// Steepest rise of the concentration curve (concentration / s)
    pub max_slope: f64,
    pub r_squared: f64,
    /// Bolus arrival frame of the concentration curve
    pub bat: usize,
    pub iterations: u64,
    pub status: FitStatus,
    /// Model prediction at the fitted parameters, zero when not fitted
    pub fitted: Vec<f64>,
}

impl VoxelFit {
    /// Record for a voxel outside the region of interest
    pub fn skipped(variant: ModelVariant, n_times: usize) -> Self {
        Self {
            params: PkParameters::zero(variant),
            auc: 0.0,
            max_slope: 0.0,
            r_squared: 0.0,
            bat: 0,
            iterations: 0,
            status: FitStatus::Skipped,
            fitted: vec![0.0; n_times],
        }
    }
}

/// Fits one compartmental model to many voxels against a shared AIF
#[derive(Debug, Clone)]
pub struct PkModelFitter<'a> {
    aif: &'a AifCurve,
    timing: &'a Timing,
    minutes: Vec<f64>,
    variant: ModelVariant,
    solver: SolverOptions,
    hematocrit: f64,
    auc_interval: f64,
    bat: &'a BatEstimator,
}

impl<'a> PkModelFitter<'a> {
    /// # Panics
    ///
    /// Panics if the AIF is not sampled on `timing`.
    pub fn new(
        aif: &'a AifCurve,
        timing: &'a Timing,
        variant: ModelVariant,
        bat: &'a BatEstimator,
    ) -> Self {
        assert_eq!(
            aif.len(),
            timing.len(),
            "AIF must be sampled on the acquisition timing"
        );
        Self {
            aif,
            timing,
            minutes: timing.minutes(),
            variant,
            solver: SolverOptions::default(),
            hematocrit: 0.0,
            auc_interval: f64::INFINITY,
            bat,
        }
    }

    pub fn with_solver(mut self, solver: SolverOptions) -> Self {
        self.solver = solver;
        self
    }

    /// Hematocrit of the blood the AIF was measured in
    pub fn with_hematocrit(mut self, hematocrit: f64) -> Self {
        self.hematocrit = hematocrit;
        self
    }

    /// Length of the AUC window after bolus arrival, in seconds
    pub fn with_auc_interval(mut self, seconds: f64) -> Self {
        self.auc_interval = seconds;
        self
    }

    pub fn variant(&self) -> ModelVariant {
        self.variant
    }

    /// Number of frames every fitted curve must have
    pub fn n_times(&self) -> usize {
        self.timing.len()
    }

    /// Fit one concentration curve sampled on the fitter's timing.
    ///
    /// The optimizer is started from every point of
    /// [ModelVariant::starting_points]; the converged run with the lowest sum of
    /// squares wins and its iteration count is reported. A converged fit that
    /// explains less than the curve's mean (R² < 0) is a
    /// [FitStatus::NumericalFailure].
    pub fn fit(&self, curve: &[f64]) -> VoxelFit {
        let times = self.timing.seconds();
        let n = times.len();

        let bat = self.bat.estimate(curve);
        let auc = auc_window(times, curve, bat, self.auc_interval);
        let max_slope = max_slope(times, curve);

        let unfitted = |status: FitStatus, iterations: u64| VoxelFit {
            params: PkParameters::zero(self.variant),
            auc,
            max_slope,
            r_squared: 0.0,
            bat,
            iterations,
            status,
            fitted: vec![0.0; n],
        };

        if curve.iter().any(|c| !c.is_finite()) {
            return unfitted(FitStatus::NumericalFailure, 0);
        }
        if curve.iter().all(|c| *c == 0.0) {
            return unfitted(FitStatus::ZeroCurve, 0);
        }

        let model = ToftsModel::new(self.variant, &self.minutes, self.aif.values());
        let solver = LevenbergMarquardt::new(&self.solver)
            .with_bounds(self.variant.lower_bounds(), self.variant.upper_bounds());

        let minimum = self
            .variant
            .starting_points()
            .into_iter()
            .map(|x0| {
                let problem = CurveFitProblem::new(model, curve, self.solver.epsilon);
                minimize(problem, solver.clone(), x0, self.solver.max_iters)
            })
            .min_by(|a, b| {
                let (ra, rb) = (rank(a), rank(b));
                ra.0.cmp(&rb.0).then(ra.1.total_cmp(&rb.1))
            });
        let Some(minimum) = minimum else {
            return unfitted(FitStatus::NumericalFailure, 0);
        };

        if !minimum.status.is_converged() {
            tracing::trace!(
                "Fit stopped after {} iterations: {:?}",
                minimum.iterations,
                minimum.status
            );
            return unfitted(minimum.status, minimum.iterations);
        }

        let fitted = model.predict(&minimum.params);
        let r_squared = r_squared(curve, &fitted);
        if r_squared < 0.0 {
            tracing::trace!(
                "Fit converged to {:?} with R² {:.3}",
                minimum.params,
                r_squared
            );
            return unfitted(FitStatus::NumericalFailure, minimum.iterations);
        }
        let params = PkParameters::from_slice(&minimum.params).hematocrit_corrected(self.hematocrit);

        VoxelFit {
            params,
            auc,
            max_slope,
            r_squared,
            bat,
            iterations: minimum.iterations,
            status: minimum.status,
            fitted,
        }
    }
}

/// Ordering key for competing runs: converged first, then by sum of squares
fn rank(minimum: &Minimum) -> (bool, f64) {
    let cost = if minimum.cost.is_nan() {
        f64::INFINITY
    } else {
        minimum.cost
    };
    (!minimum.status.is_converged(), cost)
}
