//! Decomposition of many pixels.
//!
//! Pixels are independent: each one is processed against the shared,
//! read-only calibration, and a failure in one pixel is recorded in that
//! pixel's result without disturbing any other.

use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(not(feature = "serial"))]
use rayon::prelude::*;

use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};

use crate::decompose::{PixelProcessor, PixelResult};
use crate::error::PixelError;
use crate::types::{Precision, Thicknesses};
use crate::utils::group_digits;

/// Apply `processor` to every input, returning the outputs in input order.
///
/// Runs on the current rayon thread pool, unless the `serial` feature is
/// enabled.
pub fn process_all<P: PixelProcessor>(processor: &P, inputs: &[P::Input], progress: Option<&ProgressBar>) -> Vec<P::Output> {
    let process_one = |input: &P::Input| {
        let output = processor.process(input);
        if let Some(bar) = progress { bar.inc(1) }
        output
    };

    // Choose between serial and parallel iteration
    #[cfg    (feature = "serial") ] let iter = inputs.    iter();
    #[cfg(not(feature = "serial"))] let iter = inputs.par_iter();

    let outputs = iter.map(process_one).collect();
    if let Some(bar) = progress { bar.finish() }
    outputs
}

/// Like [`process_all`], but pixels not yet started when `abandon` is set
/// are skipped and yield `None`. A pixel already being processed runs to
/// completion.
pub fn process_until<P: PixelProcessor>(processor: &P, inputs: &[P::Input], progress: Option<&ProgressBar>, abandon: &AtomicBool) -> Vec<Option<P::Output>> {
    let process_one = |input: &P::Input| {
        if abandon.load(Ordering::Relaxed) { return None }
        let output = processor.process(input);
        if let Some(bar) = progress { bar.inc(1) }
        Some(output)
    };

    #[cfg    (feature = "serial") ] let iter = inputs.    iter();
    #[cfg(not(feature = "serial"))] let iter = inputs.par_iter();

    let outputs: Vec<_> = iter.map(process_one).collect();
    if let Some(bar) = progress {
        if abandon.load(Ordering::Relaxed) { bar.abandon() }
        else                               { bar.finish()  }
    }
    outputs
}

/// Progress bar sized for `n_pixels`
pub fn pixel_progress_bar(n_pixels: usize) -> ProgressBar {
    let bar = ProgressBar::new(n_pixels as u64).with_message("Decomposing pixels");
    match ProgressStyle::default_bar().template("{msg}\n[{elapsed_precise}] {wide_bar} {pos}/{len} ({eta_precise})") {
        Ok(style) => bar.set_style(style),
        Err(e)    => warn!("default progress bar style: {e}"),
    }
    bar.tick();
    bar
}

/// Values to store in the output images for one pixel.
///
/// A pixel without a usable variance gets zero precision, so that it carries
/// no weight downstream. Its thicknesses are the last estimate, if there is
/// one, or NaN.
pub fn pixel_values<const M: usize>(result: &PixelResult<M>) -> (Thicknesses<M>, Precision<M>) {
    use PixelError::*;
    let none = Precision::<M>::zeros();
    match result {
        Ok(d)                                   => (d.thicknesses, d.precision),
        Err(NotConverged       { best, .. })    => (*best, none),
        Err(DegenerateEstimate { thicknesses }) => (*thicknesses, none),
        Err(_)                                  => (Thicknesses::<M>::from_element(f64::NAN), none),
    }
}

/// How many pixels ended up in each state
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub converged: usize,
    pub not_converged: usize,
    pub degenerate: usize,
    /// Bad counts, spectrum or initial guess
    pub invalid: usize,
    /// The minimizer library itself failed
    pub failed: usize,
}

impl Summary {

    pub fn of<const M: usize>(results: &[PixelResult<M>]) -> Self {
        let mut summary = Self::default();
        for result in results {
            summary.record(result);
        }
        summary
    }

    pub fn record<const M: usize>(&mut self, result: &PixelResult<M>) {
        use PixelError::*;
        match result {
            Ok(_)                        => self.converged     += 1,
            Err(NotConverged       {..}) => self.not_converged += 1,
            Err(DegenerateEstimate {..}) => self.degenerate    += 1,
            Err(InvalidInitialGuess{..}) |
            Err(InvalidCounts      {..}) |
            Err(InvalidSpectrum    {..}) => self.invalid       += 1,
            Err(Minimizer(_))            => self.failed        += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.converged + self.not_converged + self.degenerate + self.invalid + self.failed
    }

    pub fn all_converged(&self) -> bool { self.converged == self.total() }

    /// Report through `log`: `info` when every pixel converged, `warn`
    /// otherwise
    pub fn log(&self) {
        if self.all_converged() { info!("{self}") }
        else                    { warn!("{self}") }
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Self { converged, not_converged, degenerate, invalid, failed } = *self;
        write!(f, "{} pixels: {} converged, {} not converged, {} degenerate, {} invalid, {} failed",
               group_digits(self.total()),
               group_digits(converged),
               group_digits(not_converged),
               group_digits(degenerate),
               group_digits(invalid),
               group_digits(failed),
        )
    }
}
