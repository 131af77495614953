//! Derivative-free minimization of a [`CostFunction`] with the Nelder-Mead
//! downhill simplex, as implemented by `argmin`.
//!
//! The simplex search needs nothing but cost evaluations, which suits the
//! spectral likelihood: its gradient is never computed.

use argmin::core::{self as am, Executor, State, TerminationReason, TerminationStatus};
use argmin::solver::neldermead::NelderMead;
use serde::Deserialize;

use crate::error::{MinimizerError, SettingsError};
use crate::likelihood::CostFunction;
use crate::types::Thicknesses;

/// Initial simplex step for parameters which start at exactly zero
const ZERO_PARAMETER_STEP: f64 = 0.00025;

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SimplexSettings {

    /// Maximum number of simplex iterations per pixel
    #[serde(default = "default_iterations")]
    pub iterations: u64,

    /// Convergence is declared when the standard deviation of the cost over
    /// the simplex vertices falls below this value
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// Size of the initial simplex, relative to each non-zero parameter of
    /// the initial guess
    #[serde(default = "default_initial_step")]
    pub initial_step: f64,
}

fn default_iterations  () -> u64 { 300  }
fn default_tolerance   () -> f64 { 1e-9 }
fn default_initial_step() -> f64 { 0.05 }

impl Default for SimplexSettings {
    fn default() -> Self {
        Self {
            iterations  : default_iterations(),
            tolerance   : default_tolerance(),
            initial_step: default_initial_step(),
        }
    }
}

impl SimplexSettings {

    pub fn with_iterations(self, iterations: u64) -> Self { Self { iterations, ..self } }
    pub fn with_tolerance (self, tolerance : f64) -> Self { Self { tolerance , ..self } }

    /// Reject settings which `argmin` would refuse, or which make no sense
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.iterations == 0 {
            return Err(SettingsError::NoIterations)
        }
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return Err(SettingsError::Tolerance(self.tolerance))
        }
        if !(self.initial_step.is_finite() && self.initial_step > 0.0) {
            return Err(SettingsError::InitialStep(self.initial_step))
        }
        Ok(())
    }

    /// The `N + 1` vertices of the starting simplex: the initial guess, and
    /// one vertex displaced along each parameter axis
    pub fn initial_simplex<const N: usize>(&self, guess: &Thicknesses<N>) -> Vec<Vec<f64>> {
        let origin = guess.iter().copied().collect::<Vec<_>>();
        let mut vertices = Vec::with_capacity(N + 1);
        vertices.push(origin.clone());
        for i in 0..N {
            let mut vertex = origin.clone();
            vertex[i] += if vertex[i] == 0.0 { ZERO_PARAMETER_STEP }
                         else                { self.initial_step * vertex[i].abs() };
            vertices.push(vertex);
        }
        vertices
    }

    /// Minimize `cost`, starting from `guess`.
    ///
    /// Running out of iterations is not an error: it is reported through
    /// [`Minimum::converged`], together with the best point found.
    pub fn minimize<C, const N: usize>(&self, cost: &C, guess: &Thicknesses<N>) -> Result<Minimum<N>, MinimizerError>
    where
        C: CostFunction<N>,
    {
        let solver = NelderMead::new(self.initial_simplex(guess))
            .with_sd_tolerance(self.tolerance)?;

        let result = Executor::new(ArgminAdapter::<C, N> { cost }, solver)
            .configure(|state| state.max_iters(self.iterations))
            .run()?;

        let state = result.state();
        let best = state.get_best_param()
            .ok_or(MinimizerError::MissingBestVertex)?;
        let converged = matches!(
            state.get_termination_status(),
            TerminationStatus::Terminated(TerminationReason::SolverConverged)
        );
        Ok(Minimum {
            parameters: Thicknesses::<N>::from_column_slice(best),
            cost: state.get_best_cost(),
            iterations: state.get_iter(),
            converged,
        })
    }
}

/// Best point found by the simplex
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Minimum<const N: usize> {
    pub parameters: Thicknesses<N>,
    pub cost: f64,
    pub iterations: u64,
    /// `false` if the iteration budget ran out before the tolerance was met
    pub converged: bool,
}

/// Exposes a [`CostFunction`] to `argmin`, whose simplex works on `Vec<f64>`
struct ArgminAdapter<'a, C, const N: usize> {
    cost: &'a C,
}

impl<'a, C: CostFunction<N>, const N: usize> am::CostFunction for ArgminAdapter<'a, C, N> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, parameters: &Self::Param) -> Result<Self::Output, am::Error> {
        Ok(self.cost.evaluate(&Thicknesses::<N>::from_column_slice(parameters)))
    }
}
