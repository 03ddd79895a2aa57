//! End-to-end quantification
//!
//! [run] chains the stages of a quantification: acquisition parameters are
//! resolved and every input is validated first, so a configuration problem
//! aborts the run before any voxel is converted or fitted.

use serde::{Deserialize, Serialize};

use crate::aif::{AifCurve, AifSource, ArterialInputFunction, PopulationAif};
use crate::bat::BatEstimator;
use crate::concentration::{ConcentrationConverter, SignalEquation};
use crate::config::Configuration;
use crate::data::metadata::{AcquisitionParameters, Metadata};
use crate::data::parser::read_prescribed_aif;
use crate::data::{self, ConcentrationVolume, MaskVolume, SignalVolume, T1Map};
use crate::driver::{ParameterMaps, ProgressObserver, VoxelwiseDriver};
use crate::error::{ConfigError, DceError};
use crate::fit::PkModelFitter;

/// Volumes handed to a run, already loaded and aligned to the signal grid
#[derive(Debug, Clone)]
pub struct Inputs<'a> {
    pub signal: &'a SignalVolume,
    /// Voxels averaged into the AIF
    pub aif_mask: Option<&'a MaskVolume>,
    /// Voxels to fit; all voxels when absent
    pub roi_mask: Option<&'a MaskVolume>,
    /// Pre-contrast tissue T1 per voxel (ms)
    pub t1_map: Option<&'a T1Map>,
    /// An AIF already in memory, used instead of the configured file
    pub prescribed_aif: Option<AifCurve>,
}

impl<'a> Inputs<'a> {
    pub fn new(signal: &'a SignalVolume) -> Self {
        Self {
            signal,
            aif_mask: None,
            roi_mask: None,
            t1_map: None,
            prescribed_aif: None,
        }
    }

    pub fn with_aif_mask(mut self, mask: &'a MaskVolume) -> Self {
        self.aif_mask = Some(mask);
        self
    }

    pub fn with_roi_mask(mut self, mask: &'a MaskVolume) -> Self {
        self.roi_mask = Some(mask);
        self
    }

    pub fn with_t1_map(mut self, map: &'a T1Map) -> Self {
        self.t1_map = Some(map);
        self
    }

    pub fn with_prescribed_aif(mut self, aif: AifCurve) -> Self {
        self.prescribed_aif = Some(aif);
        self
    }

    fn check_shapes(&self) -> Result<(), ConfigError> {
        let shape = data::spatial_shape(self.signal);
        if let Some(mask) = self.aif_mask {
            data::check_spatial_shape("AIF mask", mask, shape)?;
        }
        if let Some(mask) = self.roi_mask {
            data::check_spatial_shape("ROI mask", mask, shape)?;
        }
        if let Some(map) = self.t1_map {
            data::check_spatial_shape("T1 map", map, shape)?;
        }
        Ok(())
    }
}

/// Everything a run produces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantificationOutput {
    pub repetition_time: f64,
    pub flip_angle: f64,
    pub timing: data::Timing,
    /// Name of the AIF source that was used
    pub aif_source: String,
    /// The AIF sampled on the acquisition timing
    pub aif: AifCurve,
    pub maps: ParameterMaps,
    /// Present when requested in the configuration
    pub concentration: Option<ConcentrationVolume>,
    /// Frames per voxel whose signal could not be converted
    pub degenerate_samples: ndarray::Array3<u32>,
}

/// Quantify a DCE acquisition.
///
/// Configuration and resource problems are returned as errors before any
/// fitting starts; per-voxel problems are reported in the status map.
pub fn run(
    inputs: &Inputs<'_>,
    metadata: &Metadata,
    configuration: &Configuration,
    observer: Option<&dyn ProgressObserver>,
) -> Result<QuantificationOutput, DceError> {
    configuration.validate()?;

    let acquisition = AcquisitionParameters::resolve(
        metadata,
        configuration.repetition_time,
        configuration.flip_angle,
    )?;
    let timing = acquisition.timing;
    let channels = data::channels(inputs.signal);
    if timing.len() != channels {
        return Err(ConfigError::TimingMismatch {
            timing: timing.len(),
            channels,
        }
        .into());
    }
    inputs.check_shapes()?;

    let bat = BatEstimator::new(configuration.bat_mode, configuration.constant_bat, timing.len())?;

    let prescribed = match (&inputs.prescribed_aif, &configuration.prescribed_aif_file) {
        (Some(curve), _) => Some(curve.clone()),
        (None, Some(path)) => Some(read_prescribed_aif(path)?),
        (None, None) => None,
    };
    let population = configuration
        .use_population_aif
        .then(|| PopulationAif::parker(configuration.population_aif_onset));
    let blood_mask = match (&prescribed, &population) {
        (None, None) => Some(inputs.aif_mask.ok_or(ConfigError::NoAifSource)?),
        _ => None,
    };

    tracing::info!(
        "Converting signal to concentration: TR {} ms, flip angle {} deg, {} frames",
        acquisition.repetition_time,
        acquisition.flip_angle,
        timing.len()
    );
    let equation = SignalEquation::new(
        acquisition.repetition_time,
        acquisition.flip_angle,
        configuration.relaxivity,
    );
    let conversion = ConcentrationConverter::new(
        equation,
        configuration.t1_pre_tissue,
        configuration.t1_pre_blood,
        &bat,
    )
    .with_s0_threshold(configuration.s0_gradient_threshold)
    .with_baseline_policy(configuration.baseline_policy)
    .with_t1_map(inputs.t1_map)
    .with_blood_mask(blood_mask)
    .with_roi(inputs.roi_mask)
    .convert(inputs.signal)?;

    let (aif, aif_source) = {
        let source = AifSource::select(
            prescribed,
            population,
            blood_mask.map(|mask| (&conversion.concentration, mask)),
        )?;
        (source.curve(&timing)?, source.name().to_string())
    };
    tracing::info!("Using {} AIF", aif_source);

    let fitter = PkModelFitter::new(&aif, &timing, configuration.model, &bat)
        .with_solver(configuration.solver)
        .with_hematocrit(configuration.hematocrit)
        .with_auc_interval(configuration.auc_time_interval);
    let maps = VoxelwiseDriver::new(&fitter)
        .with_roi(inputs.roi_mask)
        .with_fitted_curves(configuration.outputs.fitted_curves)
        .run(&conversion.concentration, observer)?;

    let concentration = configuration
        .outputs
        .concentrations
        .then_some(conversion.concentration);

    Ok(QuantificationOutput {
        repetition_time: acquisition.repetition_time,
        flip_angle: acquisition.flip_angle,
        timing,
        aif_source,
        aif,
        maps,
        concentration,
        degenerate_samples: conversion.degenerate_samples,
    })
}
