//! Error types.
//!
//! Calibration problems are fatal for a run and are detected once, before any
//! pixel is processed. Pixel problems are attached to the result of the pixel
//! in which they occurred and never abort a batch.

use std::path::PathBuf;

use argmin::core::{ArgminError, Error as ArgminFailure};
use thiserror::Error;

use crate::types::Thicknesses;

/// Inconsistent or unphysical calibration data
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {

    #[error("{what} has {found} {axis}, expected {expected}")]
    WrongLength { what: &'static str, axis: &'static str, expected: usize, found: usize },

    #[error("{what} contains the non-finite value {value} at {index:?}")]
    NonFinite { what: &'static str, index: (usize, usize), value: f64 },

    #[error("{what} contains the negative value {value} at {index:?}")]
    Negative { what: &'static str, index: (usize, usize), value: f64 },

    #[error("bin thresholds must increase strictly: threshold {index} ({value} keV) does not exceed its predecessor")]
    ThresholdsNotIncreasing { index: usize, value: f64 },

    #[error("threshold {value} keV lies beyond the raw detector response, which covers {available} keV")]
    ThresholdOutOfRange { value: f64, available: usize },

    #[error("detector response row {bin} is all zero: that bin can never record a count")]
    EmptyBin { bin: usize },

    #[error("exactly one of `detector_response` and `raw_detector_response` must be given")]
    AmbiguousResponse,

    #[error("`raw_detector_response` can only be binned if `thresholds` are given")]
    MissingThresholds,

    #[error("{found} material names given for {expected} materials")]
    MaterialNames { expected: usize, found: usize },

    #[error("no compiled decomposition for {materials} materials, {bins} bins and {energies} energies")]
    UnsupportedShape { materials: usize, bins: usize, energies: usize },
}

/// Failure to decompose a single pixel
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PixelError<const M: usize> {

    /// The iteration budget was exhausted before the simplex met the
    /// tolerance. `best` is the best vertex found, and may be unreliable.
    #[error("not converged after {iterations} iterations; best estimate {best:?}")]
    NotConverged { best: Thicknesses<M>, iterations: u64 },

    /// The Fisher information at `thicknesses` cannot be inverted reliably:
    /// the materials are not spectrally distinguishable there.
    #[error("degenerate estimate at {thicknesses:?}: Fisher information is singular or ill-conditioned")]
    DegenerateEstimate { thicknesses: Thicknesses<M> },

    #[error("initial guess component {index} is not finite ({value})")]
    InvalidInitialGuess { index: usize, value: f64 },

    #[error("observed counts in bin {bin} are invalid ({value})")]
    InvalidCounts { bin: usize, value: f64 },

    #[error("incident spectrum at energy sample {energy} is invalid ({value})")]
    InvalidSpectrum { energy: usize, value: f64 },

    /// The minimizer library itself failed
    #[error("minimizer failed: {0}")]
    Minimizer(#[from] MinimizerError),
}

/// Failures reported by `argmin`, kept comparable so that pixel results can
/// be compared and cloned
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MinimizerError {

    #[error("invalid parameter: {text}")]
    InvalidParameter { text: String },

    #[error("not implemented: {text}")]
    NotImplemented { text: String },

    #[error("not initialized: {text}")]
    NotInitialized { text: String },

    #[error("condition violated: {text}")]
    ConditionViolated { text: String },

    #[error("potential bug: {text}")]
    PotentialBug { text: String },

    #[error("simplex finished without a best vertex")]
    MissingBestVertex,

    #[error("{text}")]
    Backend { text: String },
}

impl From<ArgminFailure> for MinimizerError {
    fn from(error: ArgminFailure) -> Self {
        use MinimizerError::*;
        match error.downcast::<ArgminError>() {
            Ok(ArgminError::InvalidParameter  { text }) => InvalidParameter  { text },
            Ok(ArgminError::NotImplemented    { text }) => NotImplemented    { text },
            Ok(ArgminError::NotInitialized    { text }) => NotInitialized    { text },
            Ok(ArgminError::ConditionViolated { text }) => ConditionViolated { text },
            Ok(ArgminError::PotentialBug      { text }) => PotentialBug      { text },
            Ok(other)                                   => Backend { text: other.to_string() },
            Err(other)                                  => Backend { text: other.to_string() },
        }
    }
}

/// Nelder-Mead settings which cannot be used
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettingsError {

    #[error("`iterations` must be at least 1")]
    NoIterations,

    #[error("`tolerance` must be finite and non-negative, got {0}")]
    Tolerance(f64),

    #[error("`initial_step` must be finite and positive, got {0}")]
    InitialStep(f64),
}

/// Problems reading the run configuration
#[derive(Error, Debug)]
pub enum ConfigError {

    #[error("couldn't read config file `{path:?}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("couldn't parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid calibration: {0}")]
    Calibration(#[from] CalibrationError),

    #[error("invalid optimizer settings: {0}")]
    Optimizer(#[from] SettingsError),

    #[error("`degeneracy_tolerance` must be finite and non-negative, got {0}")]
    DegeneracyTolerance(f64),
}
