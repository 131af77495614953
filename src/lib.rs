//! Maximum-likelihood decomposition of spectral photon-counting measurements
//! into material line integrals, with Cramer-Rao precision estimates.

pub mod types;
pub mod error;
pub mod calibration;
pub mod forward;
pub mod likelihood;
pub mod fisher;
pub mod minimize;
pub mod decompose;
pub mod batch;
pub mod simulate;
pub mod config;
pub mod io;
pub mod utils;

pub use types::*;
pub use error::{CalibrationError, ConfigError, MinimizerError, PixelError, SettingsError};
pub use calibration::Calibration;
pub use forward::ForwardModel;
pub use likelihood::{CostFunction, NegativeLogLikelihood, INFEASIBLE_COST};
pub use fisher::{FisherInformation, DEFAULT_DEGENERACY_TOLERANCE};
pub use minimize::{Minimum, SimplexSettings};
pub use decompose::{Decomposer, Decomposition, PixelInput, PixelProcessor, PixelResult};
pub use config::decompose::Config;
