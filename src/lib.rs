//! Voxel-wise pharmacokinetic quantification of dynamic contrast-enhanced MRI
//!
//! A time series of signal volumes is converted to contrast agent
//! concentration, an arterial input function is resolved, and a Tofts model is
//! fitted independently at every voxel, producing Ktrans, Ve and optionally Fpv
//! maps together with AUC, maximum slope, R², bolus arrival and fit status.
//!
//! ```rust
//! use dcesol::prelude::*;
//!
//! let timing = Timing::new((0..40).map(|i| i as f64 * 6.0).collect()).unwrap();
//! let aif = PopulationAif::parker(24.0).curve_on(&timing);
//! let options = SynthesisOptions::default();
//! let signal = synthesize_signal(
//!     [2, 2, 1],
//!     &timing,
//!     &aif,
//!     |_| VoxelContent::Tissue(PkParameters::tofts(0.15, 0.3)),
//!     &options,
//! )
//! .unwrap();
//!
//! let config = Configuration::default().with_population_aif(true).with_population_aif_onset(24.0);
//! let output = run(&Inputs::new(&signal), &simulator::metadata(&timing, &options), &config, None).unwrap();
//! assert_eq!(output.aif_source, "population");
//! assert_eq!(output.maps.ktrans.dim(), (2, 2, 1));
//! ```

pub mod aif;
pub mod bat;
pub mod concentration;
pub mod config;
pub mod data;
pub mod driver;
pub mod error;
pub mod fit;
pub mod model;
pub mod optimize;
pub mod pipeline;
pub mod simulator;

pub use crate::config::Configuration;
pub use crate::error::{ConfigError, DceError, ResourceError};
pub use crate::pipeline::{run, Inputs, QuantificationOutput};

pub mod prelude {
    pub mod data {
        pub use crate::data::metadata::{AcquisitionParameters, Metadata};
        pub use crate::data::parser::{prescribed_aif_from_str, read_prescribed_aif};
        pub use crate::data::{
            ConcentrationVolume, MaskVolume, ParameterVolume, SignalVolume, T1Map, Timing,
        };
    }

    pub use crate::aif::{AifCurve, AifSource, ArterialInputFunction, MaskAveragedAif, PopulationAif};
    pub use crate::bat::{BatEstimator, BatMode, BolusArrivalEstimator};
    pub use crate::concentration::{BaselinePolicy, ConcentrationConverter, SignalEquation};
    pub use crate::config::{Configuration, OutputOptions};
    pub use crate::data::metadata::Metadata;
    pub use crate::data::{ConcentrationVolume, MaskVolume, SignalVolume, T1Map, Timing};
    pub use crate::driver::{ParameterMaps, ProgressBarObserver, ProgressObserver};
    pub use crate::error::{ConfigError, DceError};
    pub use crate::fit::{PkModelFitter, VoxelFit};
    pub use crate::model::{ModelVariant, PkParameters};
    pub use crate::optimize::{FitStatus, SolverOptions};
    pub use crate::pipeline::{run, Inputs, QuantificationOutput};
    pub use crate::simulator::{self, synthesize_signal, SynthesisOptions, VoxelContent};
}
