use argmin::core::{Error, Jacobian, Operator};
use nalgebra::DMatrix;

use crate::model::ToftsModel;

/// Residuals of a kinetic model against one observed concentration curve.
///
/// Residuals are `prediction - observation`. The Jacobian is taken by forward
/// differences with a step of `epsilon * max(|p|, 1)` per parameter.
pub struct CurveFitProblem<'a> {
    model: ToftsModel<'a>,
    observed: &'a [f64],
    epsilon: f64,
}

impl<'a> CurveFitProblem<'a> {
    pub fn new(model: ToftsModel<'a>, observed: &'a [f64], epsilon: f64) -> Self {
        Self {
            model,
            observed,
            epsilon,
        }
    }

    pub fn residuals(&self, params: &[f64]) -> Vec<f64> {
        let mut r = self.model.predict(params);
        r.iter_mut()
            .zip(self.observed)
            .for_each(|(p, o)| *p -= o);
        r
    }
}

impl Operator for CurveFitProblem<'_> {
    type Param = Vec<f64>;
    type Output = Vec<f64>;

    fn apply(&self, param: &Self::Param) -> Result<Self::Output, Error> {
        Ok(self.residuals(param))
    }
}

impl Jacobian for CurveFitProblem<'_> {
    type Param = Vec<f64>;
    type Jacobian = DMatrix<f64>;

    fn jacobian(&self, param: &Self::Param) -> Result<Self::Jacobian, Error> {
        let base = self.residuals(param);
        let mut jacobian = DMatrix::zeros(base.len(), param.len());
        let mut shifted = param.clone();

        for j in 0..param.len() {
            let h = self.epsilon * param[j].abs().max(1.0);
            shifted[j] = param[j] + h;
            let r = self.residuals(&shifted);
            for (i, (ri, bi)) in r.iter().zip(&base).enumerate() {
                jacobian[(i, j)] = (ri - bi) / h;
            }
            shifted[j] = param[j];
        }

        Ok(jacobian)
    }
}
