//! Poisson negative log-likelihood of the observed counts in one pixel.
//!
//! For expected counts λ(t) = `ForwardModel::expected_counts(t)` and observed
//! counts n, the cost is
//!
//! ```text
//!     c(t) = Σ_b  λ_b(t) - n_b ln λ_b(t)
//! ```
//!
//! which is −ln L(t) up to terms which do not depend on `t`.
//!
//! No derivative is provided: λ is an exponential of a linear combination of
//! the thicknesses, pushed through the detector response, and the cost is
//! minimized with a zero-order (simplex) method only.

use crate::forward::ForwardModel;
use crate::types::{Counts, Thicknesses};

/// Returned instead of the cost wherever some λ_b is not strictly positive
/// (or not finite), so that the simplex retreats from such regions.
pub const INFEASIBLE_COST: f64 = 1e30;

/// Scalar objective over a fixed-size parameter vector
pub trait CostFunction<const N: usize> {
    fn evaluate(&self, parameters: &Thicknesses<N>) -> f64;
}

/// Negative log-likelihood of one pixel's observed counts
#[derive(Debug, Clone, Copy)]
pub struct NegativeLogLikelihood<'c, const M: usize, const B: usize, const E: usize> {
    model: ForwardModel<'c, M, B, E>,
    counts: &'c Counts<B>,
}

impl<'c, const M: usize, const B: usize, const E: usize> NegativeLogLikelihood<'c, M, B, E> {

    pub fn new(model: ForwardModel<'c, M, B, E>, counts: &'c Counts<B>) -> Self {
        Self { model, counts }
    }

    pub fn model (&self) -> &ForwardModel<'c, M, B, E> { &self.model }
    pub fn counts(&self) -> &'c Counts<B>               { self.counts }

    /// The cost for given expected counts, or `None` if some λ_b ≤ 0
    pub fn cost_of_lambdas(&self, lambdas: &Counts<B>) -> Option<f64> {
        let mut measure = 0.0;
        for (&lambda, &n) in lambdas.iter().zip(self.counts.iter()) {
            if !(lambda > 0.0 && lambda.is_finite()) { return None }
            measure += lambda - n * lambda.ln();
        }
        Some(measure)
    }
}

impl<'c, const M: usize, const B: usize, const E: usize> CostFunction<M> for NegativeLogLikelihood<'c, M, B, E> {
    fn evaluate(&self, thicknesses: &Thicknesses<M>) -> f64 {
        let lambdas = self.model.expected_counts(thicknesses);
        match self.cost_of_lambdas(&lambdas) {
            Some(cost) if cost.is_finite() => cost,
            _ => INFEASIBLE_COST,
        }
    }
}
