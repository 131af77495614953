//! Synthetic measurements for known material thicknesses.
//!
//! Used to exercise the decomposition end to end when no measured data are
//! available, and to check that the estimates scatter as the Cramer-Rao bound
//! predicts.

use rand::Rng;
use rand_distr::{Distribution, Poisson};

use crate::calibration::Calibration;
use crate::decompose::PixelInput;
use crate::forward::ForwardModel;
use crate::types::{Counts, Thicknesses};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Noise {
    /// Observed counts are exactly the expected counts
    None,
    /// Observed counts are Poisson realizations of the expected counts
    Poisson,
}

/// Draw integer photon counts with the given expectations.
///
/// Bins which cannot record photons (zero or negative expectation) stay
/// empty.
pub fn poisson_counts<R: Rng, const B: usize>(expected: &Counts<B>, rng: &mut R) -> Counts<B> {
    expected.map(|lambda| {
        match Poisson::new(lambda) {
            Ok(poisson) => poisson.sample(rng),
            Err(_)      => 0.0,
        }
    })
}

/// Counts measured behind `thicknesses`, with or without noise
pub fn measure<R: Rng, const M: usize, const B: usize, const E: usize>(
    model      : &ForwardModel<'_, M, B, E>,
    thicknesses: &Thicknesses<M>,
    noise      : Noise,
    rng        : &mut R,
) -> Counts<B> {
    let expected = model.expected_counts(thicknesses);
    match noise {
        Noise::None    => expected,
        Noise::Poisson => poisson_counts(&expected, rng),
    }
}

/// `n_pixels` independent measurements of the same `truth`, ready for
/// decomposition starting from `initial_guess`
pub fn uniform_phantom<R: Rng, const M: usize, const B: usize, const E: usize>(
    calibration  : &Calibration<M, B, E>,
    truth        : &Thicknesses<M>,
    initial_guess: &Thicknesses<M>,
    n_pixels     : usize,
    noise        : Noise,
    rng          : &mut R,
) -> Vec<PixelInput<M, B, E>> {
    let model = ForwardModel::new(calibration);
    (0..n_pixels)
        .map(|_| PixelInput::new(measure(&model, truth, noise, rng), *initial_guess))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use rand::SeedableRng;
    use rand_isaac::Isaac64Rng;

    fn calibration() -> Calibration<2, 2, 3> {
        Calibration::from_rows(
            &[vec![0.30, 0.20, 0.15], vec![0.20, 0.19, 0.18]],
            &[vec![1.0, 0.5, 0.0], vec![0.0, 0.5, 1.0]],
            &[4000.0, 6000.0, 5000.0],
        ).unwrap()
    }

    #[test]
    fn noiseless_phantom_has_expected_counts() {
        let cal = calibration();
        let truth = Thicknesses::<2>::new(1.0, 2.0);
        let mut rng = Isaac64Rng::seed_from_u64(42);
        let pixels = uniform_phantom(&cal, &truth, &Thicknesses::zeros(), 5, Noise::None, &mut rng);
        let expected = ForwardModel::new(&cal).expected_counts(&truth);
        assert_eq!(pixels.len(), 5);
        for pixel in pixels {
            assert_eq!(pixel.counts, expected);
            assert_eq!(pixel.spectrum, None);
            assert_eq!(pixel.initial_guess, Thicknesses::<2>::zeros());
        }
    }

    #[test]
    fn poisson_counts_are_whole_and_scatter_around_expectation() {
        let expected = Counts::<3>::new(5.0, 500.0, 50_000.0);
        let mut rng = Isaac64Rng::seed_from_u64(7);
        let n = 2000;
        let mut sum = Counts::<3>::zeros();
        let mut sum_sq = Counts::<3>::zeros();
        for _ in 0..n {
            let counts = poisson_counts(&expected, &mut rng);
            assert!(counts.iter().all(|c| c.fract() == 0.0 && *c >= 0.0), "{counts:?}");
            sum += counts;
            sum_sq += counts.component_mul(&counts);
        }
        for b in 0..3 {
            let mean = sum[b] / n as f64;
            let variance = sum_sq[b] / n as f64 - mean * mean;
            // Poisson: mean and variance both equal the expectation
            assert_float_eq!(mean    , expected[b], r2nd <= 0.05);
            assert_float_eq!(variance, expected[b], r2nd <= 0.15);
        }
    }

    #[test]
    fn empty_bins_stay_empty() {
        let mut rng = Isaac64Rng::seed_from_u64(1);
        let counts = poisson_counts(&Counts::<3>::new(0.0, -1.0, 3.0), &mut rng);
        assert_eq!(counts[0], 0.0);
        assert_eq!(counts[1], 0.0);
    }

    #[test]
    fn same_seed_same_measurements() {
        let cal = calibration();
        let truth = Thicknesses::<2>::new(0.5, 1.5);
        let run = |seed| {
            let mut rng = Isaac64Rng::seed_from_u64(seed);
            uniform_phantom(&cal, &truth, &truth, 10, Noise::Poisson, &mut rng)
        };
        assert_eq!(run(3), run(3));
        assert_ne!(run(3), run(4));
    }
}
