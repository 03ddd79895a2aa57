//! Run configuration
//!
//! [Configuration] gathers every option of a quantification run. It is
//! validated once, before any volume is touched, so a bad value aborts the run
//! with a single [ConfigError].
//!
//! ```rust
//! use dcesol::config::Configuration;
//! use dcesol::model::ModelVariant;
//!
//! let config = Configuration::default()
//!     .with_model(ModelVariant::Tofts3)
//!     .with_population_aif(true)
//!     .with_hematocrit(0.45);
//! assert!(config.validate().is_ok());
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::bat::BatMode;
use crate::concentration::BaselinePolicy;
use crate::error::{ConfigError, DceError};
use crate::model::ModelVariant;
use crate::optimize::SolverOptions;

/// Optional volumes handed back in addition to the parameter maps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputOptions {
    /// Keep the concentration volume
    pub concentrations: bool,
    /// Keep the model prediction of every voxel
    pub fitted_curves: bool,
}

/// Options of a quantification run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Pre-contrast T1 of blood (ms)
    pub t1_pre_blood: f64,
    /// Pre-contrast T1 of tissue (ms), unless a T1 map is supplied
    pub t1_pre_tissue: f64,
    /// Repetition time override (ms)
    pub repetition_time: Option<f64>,
    /// Flip angle override (degrees)
    pub flip_angle: Option<f64>,
    /// Contrast agent relaxivity (1 / (mM · ms))
    pub relaxivity: f64,
    /// Relative signal rise (percent) that ends the S0 baseline
    pub s0_gradient_threshold: f64,
    pub baseline_policy: BaselinePolicy,
    pub bat_mode: BatMode,
    /// Arrival frame used with [BatMode::Constant]
    pub constant_bat: usize,
    /// Two-column file holding the AIF
    pub prescribed_aif_file: Option<PathBuf>,
    /// Use the population AIF when no prescribed AIF is given
    pub use_population_aif: bool,
    /// Seconds from the first frame to arrival of the population AIF
    pub population_aif_onset: f64,
    /// Length of the AUC window after bolus arrival (s)
    pub auc_time_interval: f64,
    pub solver: SolverOptions,
    /// Blood hematocrit used to convert fitted parameters to plasma terms
    pub hematocrit: f64,
    pub model: ModelVariant,
    pub outputs: OutputOptions,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            t1_pre_blood: 1600.0,
            t1_pre_tissue: 1597.0,
            repetition_time: None,
            flip_angle: None,
            relaxivity: 0.0039,
            s0_gradient_threshold: 15.0,
            baseline_policy: BaselinePolicy::default(),
            bat_mode: BatMode::default(),
            constant_bat: 1,
            prescribed_aif_file: None,
            use_population_aif: false,
            population_aif_onset: 0.0,
            auc_time_interval: 90.0,
            solver: SolverOptions::default(),
            hematocrit: 0.4,
            model: ModelVariant::default(),
            outputs: OutputOptions::default(),
        }
    }
}

impl Configuration {
    pub fn with_t1_pre_blood(mut self, t1: f64) -> Self {
        self.t1_pre_blood = t1;
        self
    }

    pub fn with_t1_pre_tissue(mut self, t1: f64) -> Self {
        self.t1_pre_tissue = t1;
        self
    }

    /// Use this repetition time instead of the acquisition metadata
    pub fn with_repetition_time(mut self, tr: f64) -> Self {
        self.repetition_time = Some(tr);
        self
    }

    /// Use this flip angle instead of the acquisition metadata
    pub fn with_flip_angle(mut self, fa: f64) -> Self {
        self.flip_angle = Some(fa);
        self
    }

    pub fn with_relaxivity(mut self, relaxivity: f64) -> Self {
        self.relaxivity = relaxivity;
        self
    }

    pub fn with_s0_gradient_threshold(mut self, threshold: f64) -> Self {
        self.s0_gradient_threshold = threshold;
        self
    }

    pub fn with_baseline_policy(mut self, policy: BaselinePolicy) -> Self {
        self.baseline_policy = policy;
        self
    }

    pub fn with_bat_mode(mut self, mode: BatMode) -> Self {
        self.bat_mode = mode;
        self
    }

    /// Use [BatMode::Constant] with the given frame
    pub fn with_constant_bat(mut self, index: usize) -> Self {
        self.bat_mode = BatMode::Constant;
        self.constant_bat = index;
        self
    }

    pub fn with_prescribed_aif_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.prescribed_aif_file = Some(path.into());
        self
    }

    pub fn with_population_aif(mut self, enabled: bool) -> Self {
        self.use_population_aif = enabled;
        self
    }

    pub fn with_population_aif_onset(mut self, seconds: f64) -> Self {
        self.population_aif_onset = seconds;
        self
    }

    pub fn with_auc_time_interval(mut self, seconds: f64) -> Self {
        self.auc_time_interval = seconds;
        self
    }

    pub fn with_solver(mut self, solver: SolverOptions) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_hematocrit(mut self, hematocrit: f64) -> Self {
        self.hematocrit = hematocrit;
        self
    }

    pub fn with_model(mut self, model: ModelVariant) -> Self {
        self.model = model;
        self
    }

    pub fn with_outputs(mut self, outputs: OutputOptions) -> Self {
        self.outputs = outputs;
        self
    }

    /// Parse a configuration; absent fields take their default value
    pub fn from_json(json: &str) -> Result<Self, DceError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, DceError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read a JSON configuration file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DceError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| {
            crate::error::ResourceError::Open {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Self::from_json(&contents)
    }

    /// Check every option, returning the first invalid one
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(param: &str, value: impl ToString) -> ConfigError {
            ConfigError::InvalidOption {
                param: param.to_string(),
                value: value.to_string(),
            }
        }
        let positive = [
            ("t1_pre_blood", self.t1_pre_blood),
            ("t1_pre_tissue", self.t1_pre_tissue),
            ("relaxivity", self.relaxivity),
            ("auc_time_interval", self.auc_time_interval),
        ];
        for (param, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(param, value));
            }
        }

        if let Some(tr) = self.repetition_time {
            if !(tr.is_finite() && tr > 0.0) {
                return Err(invalid("repetition_time", tr));
            }
        }
        if let Some(fa) = self.flip_angle {
            if !(fa.is_finite() && fa > 0.0 && fa < 180.0) {
                return Err(invalid("flip_angle", fa));
            }
        }
        if !self.s0_gradient_threshold.is_finite() {
            return Err(invalid("s0_gradient_threshold", self.s0_gradient_threshold));
        }
        if !self.population_aif_onset.is_finite() {
            return Err(invalid("population_aif_onset", self.population_aif_onset));
        }
        if !(0.0..1.0).contains(&self.hematocrit) {
            return Err(invalid("hematocrit", self.hematocrit));
        }
        self.solver.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Configuration::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bat_mode, BatMode::PeakGradient);
        assert_eq!(config.model, ModelVariant::Tofts2);
        assert_eq!(config.solver.max_iters, 200);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = Configuration::from_json(
            r#"{ "hematocrit": 0.45, "model": "Tofts3", "bat_mode": "Constant", "constant_bat": 4 }"#,
        )
        .unwrap();
        assert_eq!(config.hematocrit, 0.45);
        assert_eq!(config.model, ModelVariant::Tofts3);
        assert_eq!(config.bat_mode, BatMode::Constant);
        assert_eq!(config.constant_bat, 4);
        assert_eq!(config.t1_pre_blood, 1600.0);
    }

    #[test]
    fn json_round_trip() {
        let config = Configuration::default()
            .with_flip_angle(20.0)
            .with_prescribed_aif_file("aif.csv");
        let back = Configuration::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn invalid_values_are_reported() {
        let err = Configuration::default().with_hematocrit(1.0).validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOption { ref param, .. } if param == "hematocrit"));

        assert!(Configuration::default().with_relaxivity(0.0).validate().is_err());
        assert!(Configuration::default().with_flip_angle(-3.0).validate().is_err());
        assert!(Configuration::default()
            .with_solver(SolverOptions::default().with_max_iters(0))
            .validate()
            .is_err());
    }

    #[test]
    fn unknown_model_is_a_serialization_error() {
        let err = Configuration::from_json(r#"{ "model": "Patlak" }"#).unwrap_err();
        assert!(matches!(err, DceError::Serialization(_)));
    }
}
