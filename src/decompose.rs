//! Decomposition of a single pixel.
//!
//! Each pixel goes through
//!
//! ```text
//!     Initialized → Optimizing → Converged → VarianceComputed
//!                        ↘
//!                         Failed (iteration budget exhausted)
//! ```
//!
//! which is expressed with the types [`Initialized`] and [`Converged`]: the
//! transitions consume the previous state, so the precision can only be
//! computed for a converged estimate. All per-pixel state lives on the stack
//! of the calling thread; the calibration is only ever borrowed.

use log::{debug, trace};

use crate::calibration::{Calibration, invalid_spectrum_entry};
use crate::error::PixelError;
use crate::fisher::{FisherInformation, DEFAULT_DEGENERACY_TOLERANCE};
use crate::forward::ForwardModel;
use crate::likelihood::NegativeLogLikelihood;
use crate::minimize::SimplexSettings;
use crate::types::{Counts, Precision, Spectrum, Thicknesses};

pub type PixelResult<const M: usize> = Result<Decomposition<M>, PixelError<M>>;

/// Something the batch harness can apply to every pixel independently
pub trait PixelProcessor: Sync {
    type Input: Sync;
    type Output: Send;
    fn process(&self, input: &Self::Input) -> Self::Output;
}

/// Everything that is specific to one pixel
#[derive(Debug, Clone, PartialEq)]
pub struct PixelInput<const M: usize, const B: usize, const E: usize> {
    pub counts: Counts<B>,
    /// Replaces the calibration's incident spectrum, if the spectrum varies
    /// across the detector
    pub spectrum: Option<Spectrum<E>>,
    pub initial_guess: Thicknesses<M>,
}

impl<const M: usize, const B: usize, const E: usize> PixelInput<M, B, E> {
    pub fn new(counts: Counts<B>, initial_guess: Thicknesses<M>) -> Self {
        Self { counts, spectrum: None, initial_guess }
    }

    pub fn with_spectrum(self, spectrum: Spectrum<E>) -> Self {
        Self { spectrum: Some(spectrum), ..self }
    }
}

/// Final, successful result for one pixel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decomposition<const M: usize> {
    /// Maximum-likelihood material line integrals
    pub thicknesses: Thicknesses<M>,
    /// Reciprocal of the Cramer-Rao lower bound on each material's variance
    pub precision: Precision<M>,
    /// Negative log-likelihood at `thicknesses`
    pub cost: f64,
    pub iterations: u64,
}

/// Decomposes pixels against one shared calibration
#[derive(Debug, Clone, Copy)]
pub struct Decomposer<'c, const M: usize, const B: usize, const E: usize> {
    calibration: &'c Calibration<M, B, E>,
    settings: SimplexSettings,
    degeneracy_tolerance: f64,
}

impl<'c, const M: usize, const B: usize, const E: usize> Decomposer<'c, M, B, E> {

    pub fn new(calibration: &'c Calibration<M, B, E>, settings: SimplexSettings) -> Self {
        Self { calibration, settings, degeneracy_tolerance: DEFAULT_DEGENERACY_TOLERANCE }
    }

    pub fn with_degeneracy_tolerance(self, degeneracy_tolerance: f64) -> Self {
        Self { degeneracy_tolerance, ..self }
    }

    pub fn calibration(&self) -> &'c Calibration<M, B, E> { self.calibration }
    pub fn settings   (&self) -> &SimplexSettings         { &self.settings    }

    /// Run the whole state machine for one pixel
    pub fn decompose(&self, input: &PixelInput<M, B, E>) -> PixelResult<M> {
        Initialized::new(self.calibration, input)?
            .optimize(&self.settings)?
            .compute_precision(self.degeneracy_tolerance)
    }
}

impl<'c, const M: usize, const B: usize, const E: usize> PixelProcessor for Decomposer<'c, M, B, E> {
    type Input = PixelInput<M, B, E>;
    type Output = PixelResult<M>;
    fn process(&self, input: &Self::Input) -> Self::Output { self.decompose(input) }
}

/// Validated pixel data, with the initial guess moved into the physical domain
#[derive(Debug, Clone, Copy)]
pub struct Initialized<'p, const M: usize, const B: usize, const E: usize> {
    nll: NegativeLogLikelihood<'p, M, B, E>,
    guess: Thicknesses<M>,
}

impl<'p, const M: usize, const B: usize, const E: usize> Initialized<'p, M, B, E> {

    pub fn new(calibration: &'p Calibration<M, B, E>, input: &'p PixelInput<M, B, E>) -> Result<Self, PixelError<M>> {
        if let Some((bin, &value)) = input.counts.iter().enumerate().find(|(_, n)| !n.is_finite() || **n < 0.0) {
            return Err(PixelError::InvalidCounts { bin, value })
        }
        let model = match &input.spectrum {
            None => ForwardModel::new(calibration),
            Some(spectrum) => {
                if let Some((energy, value)) = invalid_spectrum_entry(spectrum) {
                    return Err(PixelError::InvalidSpectrum { energy, value })
                }
                ForwardModel::with_spectrum(calibration, spectrum)
            },
        };
        let guess = physical_initial_guess(&input.initial_guess)?;
        Ok(Self { nll: NegativeLogLikelihood::new(model, &input.counts), guess })
    }

    pub fn guess(&self) -> &Thicknesses<M> { &self.guess }

    /// Search for the maximum-likelihood thicknesses
    pub fn optimize(self, settings: &SimplexSettings) -> Result<Converged<'p, M, B, E>, PixelError<M>> {
        let minimum = settings.minimize(&self.nll, &self.guess).map_err(PixelError::Minimizer)?;
        if !minimum.converged {
            debug!("not converged after {} iterations, best {:?}", minimum.iterations, minimum.parameters.as_slice());
            return Err(PixelError::NotConverged { best: minimum.parameters, iterations: minimum.iterations })
        }
        trace!("converged after {} iterations to {:?}", minimum.iterations, minimum.parameters.as_slice());
        Ok(Converged {
            nll: self.nll,
            thicknesses: minimum.parameters,
            cost: minimum.cost,
            iterations: minimum.iterations,
        })
    }
}

/// Maximum-likelihood estimate, before its precision is known
#[derive(Debug, Clone, Copy)]
pub struct Converged<'p, const M: usize, const B: usize, const E: usize> {
    nll: NegativeLogLikelihood<'p, M, B, E>,
    pub thicknesses: Thicknesses<M>,
    pub cost: f64,
    pub iterations: u64,
}

impl<'p, const M: usize, const B: usize, const E: usize> Converged<'p, M, B, E> {

    pub fn fisher_information(&self) -> FisherInformation<M> {
        FisherInformation::at(&self.nll, &self.thicknesses)
    }

    pub fn compute_precision(self, degeneracy_tolerance: f64) -> PixelResult<M> {
        let Self { thicknesses, cost, iterations, .. } = self;
        match self.fisher_information().precision(degeneracy_tolerance) {
            Some(precision) => Ok(Decomposition { thicknesses, precision, cost, iterations }),
            None => {
                debug!("degenerate Fisher information at {:?}", thicknesses.as_slice());
                Err(PixelError::DegenerateEstimate { thicknesses })
            },
        }
    }
}

/// Non-finite guesses are rejected; negative ones are clamped to zero, as no
/// material can have negative thickness.
fn physical_initial_guess<const M: usize>(guess: &Thicknesses<M>) -> Result<Thicknesses<M>, PixelError<M>> {
    if let Some((index, &value)) = guess.iter().enumerate().find(|(_, t)| !t.is_finite()) {
        return Err(PixelError::InvalidInitialGuess { index, value })
    }
    if guess.iter().any(|&t| t < 0.0) {
        trace!("clamping negative initial guess {:?} to zero", guess.as_slice());
    }
    Ok(guess.map(|t| t.max(0.0)))
}
