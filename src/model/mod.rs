//! Compartmental pharmacokinetic models
//!
//! # Parameters
//!
//! | Parameter | Description | Unit |
//! |-----------|-------------|------|
//! | Ktrans | Volume transfer constant between plasma and the EES | 1/min |
//! | Ve | Extravascular extracellular volume fraction | - |
//! | Fpv | Fractional plasma volume (extended model only) | - |

mod tofts;

pub use tofts::ToftsModel;

use serde::{Deserialize, Serialize};

/// Which compartmental model is fitted at every voxel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModelVariant {
    /// Standard Tofts model: Ktrans and Ve
    #[default]
    Tofts2,
    /// Extended Tofts model: Ktrans, Ve and the plasma volume fraction
    Tofts3,
}

impl ModelVariant {
    pub fn n_params(&self) -> usize {
        match self {
            ModelVariant::Tofts2 => 2,
            ModelVariant::Tofts3 => 3,
        }
    }

    /// Fixed starting point of the optimizer, independent of voxel content
    pub fn initial_guess(&self) -> Vec<f64> {
        match self {
            ModelVariant::Tofts2 => vec![0.1, 0.5],
            ModelVariant::Tofts3 => vec![0.1, 0.5, 0.05],
        }
    }

    /// Fixed starting points tried by the fitter, [Self::initial_guess] first.
    ///
    /// They span slow (kep 0.2/min), intermediate and fast (kep 5/min) exchange.
    pub fn starting_points(&self) -> Vec<Vec<f64>> {
        let mut points = vec![self.initial_guess()];
        for (ktrans, ve) in [(0.3, 0.2), (1.0, 0.2)] {
            let mut p = vec![ktrans, ve];
            if *self == ModelVariant::Tofts3 {
                p.push(0.05);
            }
            points.push(p);
        }
        points
    }

    pub fn lower_bounds(&self) -> Vec<f64> {
        match self {
            ModelVariant::Tofts2 => vec![0.0, 1e-5],
            ModelVariant::Tofts3 => vec![0.0, 1e-5, 0.0],
        }
    }

    pub fn upper_bounds(&self) -> Vec<f64> {
        match self {
            ModelVariant::Tofts2 => vec![f64::INFINITY, 1.0],
            ModelVariant::Tofts3 => vec![f64::INFINITY, 1.0, 1.0],
        }
    }
}

/// Fitted kinetic parameters of one voxel
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PkParameters {
    pub ktrans: f64,
    pub ve: f64,
    /// Only estimated by [ModelVariant::Tofts3]
    pub fpv: Option<f64>,
}

impl PkParameters {
    pub fn tofts(ktrans: f64, ve: f64) -> Self {
        Self {
            ktrans,
            ve,
            fpv: None,
        }
    }

    pub fn extended_tofts(ktrans: f64, ve: f64, fpv: f64) -> Self {
        Self {
            ktrans,
            ve,
            fpv: Some(fpv),
        }
    }

    /// All-zero parameters for the given model, used for voxels that are not fitted
    pub fn zero(variant: ModelVariant) -> Self {
        match variant {
            ModelVariant::Tofts2 => Self::tofts(0.0, 0.0),
            ModelVariant::Tofts3 => Self::extended_tofts(0.0, 0.0, 0.0),
        }
    }

    /// Read parameters from optimizer order: Ktrans, Ve, then Fpv
    pub fn from_slice(values: &[f64]) -> Self {
        Self {
            ktrans: values[0],
            ve: values[1],
            fpv: values.get(2).copied(),
        }
    }

    pub fn to_vec(&self) -> Vec<f64> {
        let mut v = vec![self.ktrans, self.ve];
        v.extend(self.fpv);
        v
    }

    /// Exchange rate constant kep = Ktrans / Ve (1/min)
    pub fn kep(&self) -> f64 {
        if self.ve > 0.0 {
            self.ktrans / self.ve
        } else {
            0.0
        }
    }

    /// Convert parameters fitted against a whole-blood AIF into plasma terms.
    ///
    /// Ktrans and Fpv scale with `1 - hematocrit`; Ve scales identically so kep is unchanged.
    pub fn hematocrit_corrected(&self, hematocrit: f64) -> Self {
        let plasma = 1.0 - hematocrit;
        Self {
            ktrans: self.ktrans * plasma,
            ve: self.ve * plasma,
            fpv: self.fpv.map(|f| f * plasma),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn slice_round_trip_keeps_optional_fpv() {
        let p = PkParameters::from_slice(&[0.2, 0.3]);
        assert_eq!(p.fpv, None);
        assert_eq!(p.to_vec(), vec![0.2, 0.3]);

        let p = PkParameters::from_slice(&[0.2, 0.3, 0.04]);
        assert_eq!(p.to_vec(), vec![0.2, 0.3, 0.04]);
    }

    #[test]
    fn hematocrit_correction_preserves_kep() {
        let blood = PkParameters::extended_tofts(0.4, 0.5, 0.1);
        let plasma = blood.hematocrit_corrected(0.4);
        assert_relative_eq!(plasma.ktrans, 0.24, epsilon = 1e-12);
        assert_relative_eq!(plasma.fpv.unwrap(), 0.06, epsilon = 1e-12);
        assert_relative_eq!(plasma.kep(), blood.kep(), epsilon = 1e-12);
    }

    #[test]
    fn bounds_match_parameter_count() {
        for variant in [ModelVariant::Tofts2, ModelVariant::Tofts3] {
            assert_eq!(variant.initial_guess().len(), variant.n_params());
            assert_eq!(variant.lower_bounds().len(), variant.n_params());
            assert_eq!(variant.upper_bounds().len(), variant.n_params());
            let starts = variant.starting_points();
            assert_eq!(starts[0], variant.initial_guess());
            assert!(starts.iter().all(|p| p.len() == variant.n_params()));
        }
    }
}
