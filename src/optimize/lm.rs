use argmin::core::{
    Error, Executor, IterState, Jacobian, Operator, Problem, Solver, State, TerminationReason,
    TerminationStatus, KV,
};
use argmin_math::{ArgminL2Norm, ArgminSub};
use nalgebra::{DMatrix, DVector};

use super::{FitStatus, SolverOptions};

type LmState = IterState<Vec<f64>, (), (), (), (), f64>;

const LAMBDA_INIT: f64 = 1e-3;
const LAMBDA_FACTOR: f64 = 10.0;
const LAMBDA_MIN: f64 = 1e-12;
const LAMBDA_MAX: f64 = 1e16;
const MIN_DIAGONAL: f64 = 1e-12;
/// Fraction of the distance to the nearest bound a truncated step covers
const BOUNDARY_FRACTION: f64 = 0.9;
/// Truncation below this fraction of the full step clips componentwise instead
const MIN_STEP_FRACTION: f64 = 1e-2;

/// Why the solver stopped on its own (as opposed to running out of iterations)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convergence {
    Cost,
    Step,
    Gradient,
    Failure,
}

impl Convergence {
    fn reason(&self) -> &'static str {
        match self {
            Convergence::Cost => "sum of squares converged",
            Convergence::Step => "parameter step converged",
            Convergence::Gradient => "gradient converged",
            Convergence::Failure => "numerical failure",
        }
    }

    /// Recover the convergence kind from argmin's termination reason
    pub fn from_reason(reason: &TerminationReason) -> Option<Self> {
        match reason {
            TerminationReason::SolverConverged => Some(Convergence::Cost),
            TerminationReason::SolverExit(msg) => [
                Convergence::Cost,
                Convergence::Step,
                Convergence::Gradient,
                Convergence::Failure,
            ]
            .into_iter()
            .find(|c| c.reason() == msg),
            _ => None,
        }
    }
}

/// Levenberg-Marquardt least-squares solver with box constraints.
///
/// Each iteration solves the damped normal equations
///
/// ```text
/// (JᵀJ + λ diag(JᵀJ)) δ = -Jᵀr
/// ```
///
/// and keeps the trial point inside the bounds: a step that would leave the box
/// is shortened to stop short of the nearest bound, and components already on a
/// bound that point outward are dropped. Steps that reduce the sum of squares
/// are accepted and λ shrinks; rejected steps grow λ. The cost and step
/// tolerances are only tested on steps taken with λ at or below its initial
/// value, since heavily damped steps are small regardless of the distance to
/// the minimum. When λ grows past its ceiling no downhill step is left and the
/// current point is reported as converged.
#[derive(Debug, Clone)]
pub struct LevenbergMarquardt {
    f_tol: f64,
    g_tol: f64,
    x_tol: f64,
    lambda: f64,
    lower: Vec<f64>,
    upper: Vec<f64>,
    residuals: Vec<f64>,
    convergence: Option<Convergence>,
}

impl LevenbergMarquardt {
    pub fn new(options: &SolverOptions) -> Self {
        Self {
            f_tol: options.f_tol,
            g_tol: options.g_tol,
            x_tol: options.x_tol,
            lambda: LAMBDA_INIT,
            lower: Vec::new(),
            upper: Vec::new(),
            residuals: Vec::new(),
            convergence: None,
        }
    }

    /// Restrict the parameters to `[lower, upper]` element-wise
    pub fn with_bounds(mut self, lower: Vec<f64>, upper: Vec<f64>) -> Self {
        self.lower = lower;
        self.upper = upper;
        self
    }

    fn project(&self, x: &mut [f64]) {
        for (i, xi) in x.iter_mut().enumerate() {
            if let Some(lo) = self.lower.get(i) {
                *xi = xi.max(*lo);
            }
            if let Some(hi) = self.upper.get(i) {
                *xi = xi.min(*hi);
            }
        }
    }

    fn bounds(&self, i: usize) -> (f64, f64) {
        (
            self.lower.get(i).copied().unwrap_or(f64::NEG_INFINITY),
            self.upper.get(i).copied().unwrap_or(f64::INFINITY),
        )
    }

    /// Shorten `step` so that `x + step` stays inside the bounds
    fn truncate_step(&self, x: &[f64], step: &mut [f64]) {
        let mut alpha: f64 = 1.0;
        for (i, s) in step.iter_mut().enumerate() {
            let (lo, hi) = self.bounds(i);
            if (x[i] <= lo && *s < 0.0) || (x[i] >= hi && *s > 0.0) {
                *s = 0.0;
            } else if x[i] + *s < lo {
                alpha = alpha.min((lo - x[i]) / *s);
            } else if x[i] + *s > hi {
                alpha = alpha.min((hi - x[i]) / *s);
            }
        }

        if alpha >= 1.0 {
            return;
        }
        if alpha >= MIN_STEP_FRACTION {
            let scale = BOUNDARY_FRACTION * alpha;
            step.iter_mut().for_each(|s| *s *= scale);
        } else {
            for (i, s) in step.iter_mut().enumerate() {
                let (lo, hi) = self.bounds(i);
                *s = (x[i] + *s).clamp(lo, hi) - x[i];
            }
        }
    }

    fn finish(
        &mut self,
        state: LmState,
        param: Vec<f64>,
        cost: f64,
        convergence: Convergence,
    ) -> Result<(LmState, Option<KV>), Error> {
        self.convergence = Some(convergence);
        Ok((state.param(param).cost(cost), None))
    }
}

fn sum_of_squares(r: &[f64]) -> f64 {
    r.iter().map(|v| v * v).sum()
}

impl<O> Solver<O, LmState> for LevenbergMarquardt
where
    O: Operator<Param = Vec<f64>, Output = Vec<f64>>
        + Jacobian<Param = Vec<f64>, Jacobian = DMatrix<f64>>,
{
    const NAME: &'static str = "Levenberg-Marquardt";

    fn init(
        &mut self,
        problem: &mut Problem<O>,
        state: LmState,
    ) -> Result<(LmState, Option<KV>), Error> {
        let mut param = state
            .get_param()
            .cloned()
            .ok_or_else(|| Error::msg("Levenberg-Marquardt: initial parameters not set"))?;
        self.project(&mut param);

        let residuals = problem.apply(&param)?;
        let cost = sum_of_squares(&residuals);
        if !cost.is_finite() {
            self.convergence = Some(Convergence::Failure);
        }
        self.residuals = residuals;
        Ok((state.param(param).cost(cost), None))
    }

    fn next_iter(
        &mut self,
        problem: &mut Problem<O>,
        mut state: LmState,
    ) -> Result<(LmState, Option<KV>), Error> {
        let param = state
            .take_param()
            .ok_or_else(|| Error::msg("Levenberg-Marquardt: parameters missing from state"))?;
        let cost = state.get_cost();

        let r_norm = self.residuals.l2_norm();
        if r_norm == 0.0 {
            return self.finish(state, param, cost, Convergence::Gradient);
        }

        let jacobian = problem.jacobian(&param)?;
        if jacobian.iter().any(|v| !v.is_finite()) {
            return self.finish(state, param, cost, Convergence::Failure);
        }

        let r = DVector::from_column_slice(&self.residuals);
        let gradient = jacobian.tr_mul(&r);

        // largest cosine between the residual vector and a Jacobian column
        let g_cos = (0..param.len())
            .map(|j| {
                let column_norm = jacobian.column(j).norm();
                if column_norm > 0.0 {
                    (gradient[j] / (column_norm * r_norm)).abs()
                } else {
                    0.0
                }
            })
            .fold(0.0, f64::max);
        if g_cos <= self.g_tol {
            return self.finish(state, param, cost, Convergence::Gradient);
        }

        let jtj = jacobian.tr_mul(&jacobian);
        let rhs = -gradient;

        loop {
            let mut damped = jtj.clone();
            for j in 0..param.len() {
                damped[(j, j)] += self.lambda * jtj[(j, j)].max(MIN_DIAGONAL);
            }

            if let Some(cholesky) = damped.cholesky() {
                let mut step: Vec<f64> = cholesky.solve(&rhs).iter().copied().collect();
                self.truncate_step(&param, &mut step);
                let mut candidate: Vec<f64> =
                    param.iter().zip(&step).map(|(p, s)| p + s).collect();
                self.project(&mut candidate);

                let step_norm = candidate.sub(&param).l2_norm();
                if step_norm == 0.0 {
                    return self.finish(state, param, cost, Convergence::Step);
                }

                let residuals = problem.apply(&candidate)?;
                let candidate_cost = sum_of_squares(&residuals);

                if candidate_cost.is_finite() && candidate_cost < cost {
                    let undamped = self.lambda <= LAMBDA_INIT;
                    self.lambda = (self.lambda / LAMBDA_FACTOR).max(LAMBDA_MIN);
                    self.residuals = residuals;

                    if undamped && step_norm <= self.x_tol * (param.l2_norm() + self.x_tol) {
                        self.convergence = Some(Convergence::Step);
                    } else if undamped && cost - candidate_cost <= self.f_tol * cost {
                        self.convergence = Some(Convergence::Cost);
                    }
                    return Ok((state.param(candidate).cost(candidate_cost), None));
                }
            }

            self.lambda *= LAMBDA_FACTOR;
            if self.lambda > LAMBDA_MAX {
                // no downhill direction left within the bounds
                return self.finish(state, param, cost, Convergence::Step);
            }
        }
    }

    fn terminate(&mut self, _state: &LmState) -> TerminationStatus {
        match self.convergence {
            Some(c) => {
                TerminationStatus::Terminated(TerminationReason::SolverExit(c.reason().to_string()))
            }
            None => TerminationStatus::NotTerminated,
        }
    }
}

/// Result of a bounded least-squares minimization
#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    pub params: Vec<f64>,
    /// Sum of squared residuals at `params`
    pub cost: f64,
    pub iterations: u64,
    pub status: FitStatus,
}

/// Minimize the sum of squared residuals of `problem` starting from `x0`.
///
/// Never fails: solver errors are reported as [FitStatus::NumericalFailure]
/// with the starting point as parameters.
pub fn minimize<O>(problem: O, solver: LevenbergMarquardt, x0: Vec<f64>, max_iters: u64) -> Minimum
where
    O: Operator<Param = Vec<f64>, Output = Vec<f64>>
        + Jacobian<Param = Vec<f64>, Jacobian = DMatrix<f64>>,
{
    let result = Executor::new(problem, solver)
        .configure(|state| state.param(x0.clone()).max_iters(max_iters))
        .run();

    let res = match result {
        Ok(res) => res,
        Err(e) => {
            tracing::debug!("Levenberg-Marquardt failed: {}", e);
            return Minimum {
                params: x0,
                cost: f64::NAN,
                iterations: 0,
                status: FitStatus::NumericalFailure,
            };
        }
    };

    let state = res.state;
    let status = match &state.termination_status {
        TerminationStatus::Terminated(TerminationReason::MaxItersReached) => {
            FitStatus::MaxIterations
        }
        TerminationStatus::Terminated(reason) => Convergence::from_reason(reason)
            .map(FitStatus::from)
            .unwrap_or(FitStatus::NumericalFailure),
        TerminationStatus::NotTerminated => FitStatus::NumericalFailure,
    };

    let (params, cost) = match state.best_param {
        Some(p) if state.best_cost.is_finite() => (p, state.best_cost),
        _ => (state.param.unwrap_or(x0), state.cost),
    };

    Minimum {
        params,
        cost,
        iterations: state.iter,
        status,
    }
}
