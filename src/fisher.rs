//! Cramer-Rao lower bound on the precision of the decomposition.
//!
//! The Fisher information of the line integrals, for Poisson counts n with
//! expectations λ(t), is approximated as
//!
//! ```text
//!     F[a][a'] = Σ_b  n_b / λ_b²  ·  ∂λ_b/∂t_a  ·  ∂λ_b/∂t_a'
//! ```
//!
//! where the forward model's partial derivatives are exact:
//!
//! ```text
//!     ∂λ/∂t_a = -R (S_att ⊙ μ_a)
//! ```
//!
//! (the sign cancels in the product). The diagonal of F⁻¹ bounds the variance
//! of each material's estimate; its reciprocal is the precision which
//! downstream weighted least-squares reconstructions use directly as weights.

use nalgebra::SMatrix;

use crate::likelihood::NegativeLogLikelihood;
use crate::types::{FisherMatrix, Precision, Thicknesses};

/// Below this, the Jacobi-scaled Fisher matrix is treated as singular: its
/// smallest Cholesky pivot (squared) measures how far the materials are from
/// being spectrally indistinguishable.
pub const DEFAULT_DEGENERACY_TOLERANCE: f64 = 1e-10;

/// Fisher information matrix, in the form needed for inversion
#[derive(Debug, Clone, PartialEq)]
pub struct FisherInformation<const M: usize> {
    matrix: FisherMatrix<M>,
}

impl<const M: usize> FisherInformation<M> {

    /// Fisher information at `thicknesses` for the counts held by `nll`
    pub fn at<const B: usize, const E: usize>(nll: &NegativeLogLikelihood<'_, M, B, E>, thicknesses: &Thicknesses<M>) -> Self {
        let model = nll.model();
        let attenuated = model.attenuated_spectrum(thicknesses);
        let lambdas = model.response_times(&attenuated);

        // n_b / λ_b²
        let weights = nll.counts().zip_map(&lambdas, |n, lambda| n / (lambda * lambda));

        // Column a holds ∂λ/∂t_a (up to sign)
        let attenuations = model.calibration().attenuations();
        let partials = SMatrix::<f64, B, M>::from_columns(
            &std::array::from_fn::<_, M, _>(|a| {
                let weighted = attenuated.component_mul(&attenuations.row(a).transpose());
                model.response_times(&weighted)
            })
        );

        // Σ_b w_b ∂_a ∂_a', accumulated symmetrically so that F is exactly symmetric
        let mut matrix = FisherMatrix::<M>::zeros();
        for a in 0..M {
            for a_prime in a..M {
                let f = (0..B)
                    .map(|b| weights[b] * partials[(b, a)] * partials[(b, a_prime)])
                    .sum::<f64>();
                matrix[(a, a_prime)] = f;
                matrix[(a_prime, a)] = f;
            }
        }
        Self { matrix }
    }

    pub fn matrix(&self) -> &FisherMatrix<M> { &self.matrix }

    /// Diagonal of the inverse Fisher matrix: the Cramer-Rao lower bound on
    /// each material's variance.
    ///
    /// Returns `None` if the matrix is singular or too ill-conditioned to
    /// invert meaningfully.
    pub fn variances(&self, tolerance: f64) -> Option<Precision<M>> {
        if self.matrix.iter().any(|f| !f.is_finite()) { return None }

        // Jacobi scaling D^-1/2 F D^-1/2 has a unit diagonal, so the Cholesky
        // pivots are comparable with `tolerance` whatever the counts' scale.
        let diagonal = self.matrix.diagonal();
        if diagonal.iter().any(|&d| !(d > 0.0)) { return None }
        let scale = diagonal.map(|d| 1.0 / d.sqrt());
        let scaled = FisherMatrix::<M>::from_fn(|i, j| self.matrix[(i, j)] * scale[i] * scale[j]);

        let cholesky = scaled.cholesky()?;
        let smallest_pivot = cholesky.l_dirty().diagonal().iter().copied().fold(f64::INFINITY, f64::min);
        if !(smallest_pivot * smallest_pivot > tolerance) { return None }

        // F⁻¹ = D^-1/2 (scaled)⁻¹ D^-1/2
        let inverse = cholesky.inverse();
        let variances = Precision::<M>::from_fn(|i, _| inverse[(i, i)] * scale[i] * scale[i]);
        if variances.iter().all(|v| v.is_finite() && *v > 0.0) { Some(variances) }
        else                                                   { None }
    }

    /// Element-wise reciprocal of [`variances`](Self::variances)
    pub fn precision(&self, tolerance: f64) -> Option<Precision<M>> {
        self.variances(tolerance).map(|v| v.map(|v| 1.0 / v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::Calibration;
    use crate::forward::{ForwardModel, tests::two_materials};
    use crate::types::Counts;
    use float_eq::assert_float_eq;
    use proptest::prelude::*;

    fn distinguishable() -> Calibration<2, 3, 4> {
        Calibration::from_rows(
            &[vec![0.40, 0.25, 0.18, 0.15],   // bone-like: steep
              vec![0.22, 0.20, 0.19, 0.18]],  // water-like: flat
            &[vec![1.0, 0.2, 0.0, 0.0],
              vec![0.0, 0.8, 0.3, 0.0],
              vec![0.0, 0.0, 0.7, 1.0]],
            &[1000.0, 2000.0, 1500.0, 800.0],
        ).unwrap()
    }

    #[test]
    fn single_material_matches_closed_form() {
        // One material, one bin, one energy: λ = R S exp(-μt), so ∂λ/∂t = -μλ and F = n μ²
        let cal = Calibration::<1, 1, 1>::from_rows(&[vec![0.5]], &[vec![0.9]], &[1000.0]).unwrap();
        let model = ForwardModel::new(&cal);
        let t = Thicknesses::<1>::new(2.0);
        let counts = model.expected_counts(&t);
        let nll = NegativeLogLikelihood::new(model, &counts);
        let fisher = FisherInformation::at(&nll, &t);
        let n = counts[0];
        assert_float_eq!(fisher.matrix()[(0, 0)], n * 0.25, r2nd <= 1e-12);
        let precision = fisher.precision(DEFAULT_DEGENERACY_TOLERANCE).unwrap();
        assert_float_eq!(precision[0], n * 0.25, r2nd <= 1e-10);
    }

    #[test]
    fn variances_invert_the_fisher_matrix() {
        let cal = distinguishable();
        let model = ForwardModel::new(&cal);
        let t = Thicknesses::<2>::new(0.7, 3.0);
        let counts = model.expected_counts(&t);
        let nll = NegativeLogLikelihood::new(model, &counts);
        let fisher = FisherInformation::at(&nll, &t);
        let inverse = fisher.matrix().try_inverse().unwrap();
        let variances = fisher.variances(DEFAULT_DEGENERACY_TOLERANCE).unwrap();
        for a in 0..2 {
            assert_float_eq!(variances[a], inverse[(a, a)], r2nd <= 1e-9);
        }
        let precision = fisher.precision(DEFAULT_DEGENERACY_TOLERANCE).unwrap();
        assert_float_eq!(precision[0] * variances[0], 1.0, r2nd <= 1e-12);
    }

    #[test]
    fn identical_attenuation_curves_are_degenerate() {
        let cal = Calibration::<2, 3, 4>::from_rows(
            &[vec![0.3, 0.2, 0.15, 0.1],
              vec![0.3, 0.2, 0.15, 0.1]],
            &[vec![1.0, 0.2, 0.0, 0.0],
              vec![0.0, 0.8, 0.3, 0.0],
              vec![0.0, 0.0, 0.7, 1.0]],
            &[1000.0, 2000.0, 1500.0, 800.0],
        ).unwrap();
        let model = ForwardModel::new(&cal);
        let t = Thicknesses::<2>::new(1.0, 1.0);
        let counts = model.expected_counts(&t);
        let nll = NegativeLogLikelihood::new(model, &counts);
        let fisher = FisherInformation::at(&nll, &t);
        assert_eq!(fisher.variances(DEFAULT_DEGENERACY_TOLERANCE), None);
        assert_eq!(fisher.precision(DEFAULT_DEGENERACY_TOLERANCE), None);
    }

    #[test]
    fn proportional_attenuation_curves_are_degenerate() {
        // The second material is the first one at half density
        let cal = two_materials();
        let model = ForwardModel::new(&cal);
        let t = Thicknesses::<2>::new(1.0, 2.0);
        let counts = model.expected_counts(&t);
        let nll = NegativeLogLikelihood::new(model, &counts);
        assert_eq!(FisherInformation::at(&nll, &t).precision(DEFAULT_DEGENERACY_TOLERANCE), None);
    }

    #[test]
    fn no_counts_means_no_information() {
        let cal = distinguishable();
        let counts = Counts::<3>::zeros();
        let nll = NegativeLogLikelihood::new(ForwardModel::new(&cal), &counts);
        let fisher = FisherInformation::at(&nll, &Thicknesses::zeros());
        assert_eq!(fisher.matrix(), &FisherMatrix::<2>::zeros());
        assert_eq!(fisher.variances(DEFAULT_DEGENERACY_TOLERANCE), None);
    }

    proptest! {
        #[test]
        fn fisher_matrix_is_symmetric(
            t0 in 0.0 .. 5.0_f64,
            t1 in 0.0 .. 5.0_f64,
            n0 in 0.0 .. 5000.0_f64,
            n1 in 0.0 .. 5000.0_f64,
            n2 in 0.0 .. 5000.0_f64,
        ) {
            let cal = distinguishable();
            let counts = Counts::<3>::new(n0, n1, n2);
            let nll = NegativeLogLikelihood::new(ForwardModel::new(&cal), &counts);
            let f = *FisherInformation::at(&nll, &Thicknesses::<2>::new(t0, t1)).matrix();
            prop_assert_eq!(f, f.transpose());
        }

        #[test]
        fn every_entry_matches_numerical_derivatives(
            t0 in 0.0 .. 5.0_f64,
            t1 in 0.0 .. 5.0_f64,
            n0 in 1.0 .. 5000.0_f64,
            n1 in 1.0 .. 5000.0_f64,
            n2 in 1.0 .. 5000.0_f64,
        ) {
            let cal = distinguishable();
            let model = ForwardModel::new(&cal);
            let t = Thicknesses::<2>::new(t0, t1);
            let counts = Counts::<3>::new(n0, n1, n2);
            let nll = NegativeLogLikelihood::new(ForwardModel::new(&cal), &counts);
            let f = *FisherInformation::at(&nll, &t).matrix();

            // Central differences of the forward model, one material at a time
            let h = 1e-6;
            let lambda = model.expected_counts(&t);
            let derivative = |a: usize| {
                let mut step = Thicknesses::<2>::zeros();
                step[a] = h;
                (model.expected_counts(&(t + step)) - model.expected_counts(&(t - step))) / (2.0 * h)
            };
            let d = [derivative(0), derivative(1)];

            // Every entry, both triangles, from its own sum over bins
            for a in 0..2 {
                for a_prime in 0..2 {
                    let expected = (0..3)
                        .map(|b| counts[b] / (lambda[b] * lambda[b]) * d[a][b] * d[a_prime][b])
                        .sum::<f64>();
                    prop_assert!((f[(a, a_prime)] - expected).abs() <= 1e-6 * expected.abs().max(1e-12),
                                 "F[{a}][{a_prime}] = {} but numerically {expected}", f[(a, a_prime)]);
                }
            }
        }
    }
}
