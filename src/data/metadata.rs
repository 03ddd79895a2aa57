//! Typed access to acquisition attributes
//!
//! The volume reader hands over its header attributes as strings keyed by
//! name. Each attribute the pipeline needs has its own parsing function so a
//! missing or malformed key surfaces as a single [ConfigError].

use std::collections::HashMap;

use crate::data::Timing;
use crate::error::ConfigError;

/// Header attributes of a multi-volume acquisition
pub type Metadata = HashMap<String, String>;

pub const REPETITION_TIME_KEY: &str = "MultiVolume.DICOM.RepetitionTime";
pub const FLIP_ANGLE_KEY: &str = "MultiVolume.DICOM.FlipAngle";
pub const FRAME_TAG_KEY: &str = "MultiVolume.FrameIdentifyingDICOMTagName";
pub const FRAME_LABELS_KEY: &str = "MultiVolume.FrameLabels";

const TIMING_TAGS: [&str; 4] = ["TriggerTime", "AcquisitionTime", "SeriesTime", "ContentTime"];

/// Scalars and timing of the acquisition, resolved once before processing.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionParameters {
    pub timing: Timing,
    /// Repetition time (ms)
    pub repetition_time: f64,
    /// Flip angle (degrees)
    pub flip_angle: f64,
}

impl AcquisitionParameters {
    /// Resolve the acquisition parameters from header attributes.
    ///
    /// Overrides take precedence over the header; an attribute is only
    /// required when no override is given.
    pub fn resolve(
        metadata: &Metadata,
        repetition_time: Option<f64>,
        flip_angle: Option<f64>,
    ) -> Result<Self, ConfigError> {
        let timing = timing(metadata)?;
        let repetition_time = match repetition_time {
            Some(tr) => tr,
            None => self::repetition_time(metadata)?,
        };
        let flip_angle = match flip_angle {
            Some(fa) => fa,
            None => self::flip_angle(metadata)?,
        };
        Ok(Self {
            timing,
            repetition_time,
            flip_angle,
        })
    }
}

fn required<'a>(metadata: &'a Metadata, key: &str) -> Result<&'a str, ConfigError> {
    metadata
        .get(key)
        .map(|v| v.trim())
        .ok_or_else(|| ConfigError::MissingAttribute {
            key: key.to_string(),
        })
}

fn parse_scalar(metadata: &Metadata, key: &str) -> Result<f64, ConfigError> {
    let raw = required(metadata, key)?;
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ConfigError::InvalidAttribute {
            key: key.to_string(),
            value: raw.to_string(),
        })
}

/// Repetition time in milliseconds
pub fn repetition_time(metadata: &Metadata) -> Result<f64, ConfigError> {
    parse_scalar(metadata, REPETITION_TIME_KEY)
}

/// Flip angle in degrees
pub fn flip_angle(metadata: &Metadata) -> Result<f64, ConfigError> {
    parse_scalar(metadata, FLIP_ANGLE_KEY)
}

/// Frame times in seconds relative to the first frame.
///
/// Frame labels are comma separated milliseconds.
pub fn timing(metadata: &Metadata) -> Result<Timing, ConfigError> {
    let tag = required(metadata, FRAME_TAG_KEY)?;
    let labels = required(metadata, FRAME_LABELS_KEY)?;

    if !TIMING_TAGS.contains(&tag) {
        return Err(ConfigError::UnrecognizedFrameTag {
            tag: tag.to_string(),
        });
    }

    let millis = labels
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>().map_err(|_| ConfigError::InvalidAttribute {
                key: FRAME_LABELS_KEY.to_string(),
                value: s.to_string(),
            })
        })
        .collect::<Result<Vec<f64>, _>>()?;

    let t0 = millis.first().copied().unwrap_or(0.0);
    Timing::new(millis.iter().map(|t| (t - t0) / 1000.0).collect())
}
