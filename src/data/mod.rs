//! In-memory volumes and acquisition data consumed by the pipeline
//!
//! Volumes are plain [ndarray] arrays indexed `[x, y, z]` for spatial maps and
//! `[x, y, z, t]` for time series, so the samples of one voxel are contiguous.
//! Reading, writing and resampling them is left to the caller.

pub mod metadata;
pub mod parser;

use ndarray::{Array3, Array4, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Signal intensities, one time series per voxel
pub type SignalVolume = Array4<f64>;

/// Contrast agent concentration, same layout as [SignalVolume]
pub type ConcentrationVolume = Array4<f64>;

/// Voxel flags, nonzero means selected
pub type MaskVolume = Array3<u16>;

/// One scalar per voxel
pub type ParameterVolume = Array3<f64>;

/// Pre-contrast T1 per voxel (ms); non-positive entries fall back to the configured tissue T1
pub type T1Map = Array3<f64>;

/// Acquisition time of every frame, in seconds relative to the first frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timing {
    seconds: Vec<f64>,
}

impl Timing {
    /// Create a timing sequence, checking that it is non-empty, finite and non-decreasing
    pub fn new(seconds: Vec<f64>) -> Result<Self, ConfigError> {
        if seconds.is_empty() {
            return Err(ConfigError::InvalidOption {
                param: "timing".to_string(),
                value: "[]".to_string(),
            });
        }
        if seconds.iter().any(|t| !t.is_finite()) || seconds.windows(2).any(|w| w[1] < w[0]) {
            return Err(ConfigError::InvalidOption {
                param: "timing".to_string(),
                value: format!("{:?}", seconds),
            });
        }
        Ok(Self { seconds })
    }

    pub fn seconds(&self) -> &[f64] {
        &self.seconds
    }

    /// The same time points in minutes, the unit the kinetic models are fitted in
    pub fn minutes(&self) -> Vec<f64> {
        self.seconds.iter().map(|t| t / 60.0).collect()
    }

    pub fn len(&self) -> usize {
        self.seconds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seconds.is_empty()
    }

    /// Time of frame `index`, clamped to the last frame
    pub fn at(&self, index: usize) -> f64 {
        self.seconds[index.min(self.seconds.len() - 1)]
    }
}

/// Spatial extent `[nx, ny, nz]` of a 4D volume
pub fn spatial_shape(volume: &Array4<f64>) -> [usize; 3] {
    let (nx, ny, nz, _) = volume.dim();
    [nx, ny, nz]
}

/// Number of time points stored per voxel
pub fn channels(volume: &Array4<f64>) -> usize {
    volume.len_of(Axis(3))
}

/// Time series of a single voxel
pub fn voxel_series(volume: &Array4<f64>, [x, y, z]: [usize; 3]) -> ArrayView1<'_, f64> {
    volume.slice(ndarray::s![x, y, z, ..])
}

/// Convert a linear voxel index into `[x, y, z]`, with z varying fastest
/// to match the standard layout of the volumes.
pub fn index_to_xyz(index: usize, [_, ny, nz]: [usize; 3]) -> [usize; 3] {
    let z = index % nz;
    let y = (index / nz) % ny;
    let x = index / (ny * nz);
    [x, y, z]
}

/// Whether the voxel is selected by an optional mask. A missing mask selects everything.
pub fn is_selected(mask: Option<&MaskVolume>, [x, y, z]: [usize; 3]) -> bool {
    mask.map_or(true, |m| m[[x, y, z]] != 0)
}

/// Ensure a 3D map shares the spatial extent of the signal volume
pub fn check_spatial_shape<T>(
    name: &str,
    map: &Array3<T>,
    expected: [usize; 3],
) -> Result<(), ConfigError> {
    let (nx, ny, nz) = map.dim();
    if [nx, ny, nz] != expected {
        return Err(ConfigError::ShapeMismatch {
            volume: name.to_string(),
            found: vec![nx, ny, nz],
            expected: expected.to_vec(),
        });
    }
    Ok(())
}
