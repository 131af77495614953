//! Statically-sized numeric containers for one pixel's decomposition.
//!
//! `M` is the number of basis materials, `B` the number of spectral (detector)
//! bins and `E` the number of incident-energy samples. All three are fixed at
//! compile time, so every per-pixel vector lives on the stack.

use nalgebra::{SMatrix, SVector};

pub use units::todo::{Attenuationf64, Countsf64, Fluxf64, Thicknessf64};

/// Material line integrals, one per basis material
pub type Thicknesses<const M: usize> = SVector<Thicknessf64, M>;

/// Photon flux per incident-energy sample
pub type Spectrum<const E: usize> = SVector<Fluxf64, E>;

/// Expected or observed photon counts, one per spectral bin
pub type Counts<const B: usize> = SVector<Countsf64, B>;

/// Per-material estimate precision (reciprocal variance) or variance
pub type Precision<const M: usize> = SVector<f64, M>;

/// Linear attenuation coefficient of each material (rows) at each energy
/// (columns)
pub type AttenuationTable<const M: usize, const E: usize> = SMatrix<Attenuationf64, M, E>;

/// Maps the attenuated spectrum onto expected counts in each bin
pub type DetectorResponse<const B: usize, const E: usize> = SMatrix<f64, B, E>;

/// Fisher information of the `M` line integrals
pub type FisherMatrix<const M: usize> = SMatrix<f64, M, M>;
