use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while validating the run configuration and its inputs.
///
/// All of these abort the run before any voxel is fitted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A required acquisition attribute is absent from the metadata
    #[error("Missing attribute '{key}'")]
    MissingAttribute { key: String },

    /// An acquisition attribute is present but cannot be parsed
    #[error("Attribute '{key}' has an invalid value: {value}")]
    InvalidAttribute { key: String, value: String },

    /// The frame identifying tag is not one of the supported timing tags
    #[error("Unrecognized frame identifying DICOM tag name {tag}")]
    UnrecognizedFrameTag { tag: String },

    /// Neither an AIF mask, a prescribed AIF nor the population AIF is usable
    #[error(
        "No AIF source derivable: either a mask localizing the arterial input function, \
         a prescribed arterial input function or the population AIF must be specified"
    )]
    NoAifSource,

    /// The BAT mode or its constant index is unusable
    #[error("Invalid bolus arrival time setting: {reason}")]
    InvalidBat { reason: String },

    /// A scalar option is outside its valid range
    #[error("Invalid option: {param} = {value}")]
    InvalidOption { param: String, value: String },

    /// The timing sequence does not describe the volume's channels
    #[error("Timing has {timing} points but the volume has {channels} channels")]
    TimingMismatch { timing: usize, channels: usize },

    /// A mask or map does not share the signal volume's spatial extent
    #[error("{volume} has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        volume: String,
        found: Vec<usize>,
        expected: Vec<usize>,
    },
}

/// Errors raised when a required external resource cannot be read.
#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("Cannot open file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Crate level error, aggregating the per-concern error types.
#[derive(Error, Debug)]
pub enum DceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DceError {
    /// Whether the error stems from configuration rather than I/O
    pub fn is_config(&self) -> bool {
        matches!(self, DceError::Config(_))
    }
}
