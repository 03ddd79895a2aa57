//! Nonlinear least-squares fitting
//!
//! [LevenbergMarquardt] is an [argmin] solver that minimizes the sum of
//! squared residuals of any problem implementing argmin's [Operator] and
//! [Jacobian] traits. [CurveFitProblem] provides those for a kinetic model
//! against an observed concentration curve, with a forward difference Jacobian.
//!
//! [Operator]: argmin::core::Operator
//! [Jacobian]: argmin::core::Jacobian

mod lm;
mod problem;

pub use lm::{minimize, Convergence, LevenbergMarquardt, Minimum};
pub use problem::CurveFitProblem;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Stopping tolerances of the least-squares solver
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Relative reduction of the sum of squares below which the fit has converged
    pub f_tol: f64,
    /// Largest cosine between the residuals and a Jacobian column at convergence
    pub g_tol: f64,
    /// Relative parameter step below which the fit has converged
    pub x_tol: f64,
    /// Relative step used for the forward difference Jacobian
    pub epsilon: f64,
    /// Iteration budget
    pub max_iters: u64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            f_tol: 1e-4,
            g_tol: 1e-4,
            x_tol: 1e-5,
            epsilon: 1e-9,
            max_iters: 200,
        }
    }
}

impl SolverOptions {
    pub fn with_f_tol(mut self, f_tol: f64) -> Self {
        self.f_tol = f_tol;
        self
    }

    pub fn with_g_tol(mut self, g_tol: f64) -> Self {
        self.g_tol = g_tol;
        self
    }

    pub fn with_x_tol(mut self, x_tol: f64) -> Self {
        self.x_tol = x_tol;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_max_iters(mut self, max_iters: u64) -> Self {
        self.max_iters = max_iters;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("f_tol", self.f_tol),
            ("g_tol", self.g_tol),
            ("x_tol", self.x_tol),
            ("epsilon", self.epsilon),
        ];
        for (param, value) in checks {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::InvalidOption {
                    param: param.to_string(),
                    value: value.to_string(),
                });
            }
        }
        if self.epsilon == 0.0 {
            return Err(ConfigError::InvalidOption {
                param: "epsilon".to_string(),
                value: "0".to_string(),
            });
        }
        if self.max_iters == 0 {
            return Err(ConfigError::InvalidOption {
                param: "max_iters".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

/// Outcome of one voxel fit, stored in the diagnostics volume as its code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FitStatus {
    /// Outside the region of interest, not fitted
    #[default]
    Skipped,
    /// Concentration curve is zero everywhere, not fitted
    ZeroCurve,
    /// Sum of squares stopped decreasing
    ConvergedCost,
    /// Parameter step became negligible
    ConvergedStep,
    /// Residuals orthogonal to the Jacobian
    ConvergedGradient,
    /// Iteration budget exhausted
    MaxIterations,
    /// Non-finite data or an unsolvable step
    NumericalFailure,
}

impl FitStatus {
    /// Numeric code written to the diagnostics volume
    pub fn code(&self) -> u8 {
        match self {
            FitStatus::Skipped => 0,
            FitStatus::ZeroCurve => 1,
            FitStatus::ConvergedCost => 2,
            FitStatus::ConvergedStep => 3,
            FitStatus::ConvergedGradient => 4,
            FitStatus::MaxIterations => 5,
            FitStatus::NumericalFailure => 6,
        }
    }

    pub fn is_converged(&self) -> bool {
        matches!(
            self,
            FitStatus::ConvergedCost | FitStatus::ConvergedStep | FitStatus::ConvergedGradient
        )
    }

    /// Whether the voxel was handed to the optimizer
    pub fn was_fitted(&self) -> bool {
        !matches!(self, FitStatus::Skipped | FitStatus::ZeroCurve)
    }
}

impl From<Convergence> for FitStatus {
    fn from(c: Convergence) -> Self {
        match c {
            Convergence::Cost => FitStatus::ConvergedCost,
            Convergence::Step => FitStatus::ConvergedStep,
            Convergence::Gradient => FitStatus::ConvergedGradient,
            Convergence::Failure => FitStatus::NumericalFailure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn status_codes_are_distinct() {
        let all = [
            FitStatus::Skipped,
            FitStatus::ZeroCurve,
            FitStatus::ConvergedCost,
            FitStatus::ConvergedStep,
            FitStatus::ConvergedGradient,
            FitStatus::MaxIterations,
            FitStatus::NumericalFailure,
        ];
        let codes: HashSet<u8> = all.iter().map(|s| s.code()).collect();
        assert_eq!(codes.len(), all.len());
    }

    #[test]
    fn default_tolerances_are_valid() {
        assert!(SolverOptions::default().validate().is_ok());
        assert!(SolverOptions::default().with_max_iters(0).validate().is_err());
        assert!(SolverOptions::default()
            .with_f_tol(f64::NAN)
            .validate()
            .is_err());
    }
}
