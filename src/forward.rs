//! Forward model: from material line integrals to expected counts per bin.
//!
//! The incident spectrum (which already includes the pixel's solid angle,
//! exposure time and tube current) is attenuated by each material according
//! to the Beer-Lambert law, and the attenuated spectrum is then mapped onto
//! the spectral bins by the detector response.

use crate::calibration::Calibration;
use crate::types::{Counts, Spectrum, Thicknesses};

/// Evaluates expected counts for candidate thicknesses.
///
/// Borrows the shared calibration, and optionally a pixel-specific incident
/// spectrum which replaces the calibration's one.
#[derive(Debug, Clone, Copy)]
pub struct ForwardModel<'c, const M: usize, const B: usize, const E: usize> {
    calibration: &'c Calibration<M, B, E>,
    spectrum: &'c Spectrum<E>,
}

impl<'c, const M: usize, const B: usize, const E: usize> ForwardModel<'c, M, B, E> {

    pub fn new(calibration: &'c Calibration<M, B, E>) -> Self {
        Self { calibration, spectrum: calibration.spectrum() }
    }

    /// Use a spatially varying incident spectrum for this pixel
    pub fn with_spectrum(calibration: &'c Calibration<M, B, E>, spectrum: &'c Spectrum<E>) -> Self {
        Self { calibration, spectrum }
    }

    pub fn calibration(&self) -> &'c Calibration<M, B, E> { self.calibration }

    /// Incident spectrum after passing through `thicknesses` of each material.
    ///
    /// Very large total attenuation underflows to zero transmitted photons,
    /// never to NaN.
    pub fn attenuated_spectrum(&self, thicknesses: &Thicknesses<M>) -> Spectrum<E> {
        // Total attenuation at each energy: Σ_m t_m μ_m(E)
        let total_attenuation = self.calibration.attenuations().tr_mul(thicknesses);
        Spectrum::<E>::from_fn(|e, _| {
            let mu_t = total_attenuation[e];
            // exp(-inf) is 0, but inf * 0 flux would be NaN
            if mu_t == f64::INFINITY { 0.0 }
            else                     { self.spectrum[e] * (-mu_t).exp() }
        })
    }

    /// Expected number of counts in each spectral bin (the lambdas)
    pub fn expected_counts(&self, thicknesses: &Thicknesses<M>) -> Counts<B> {
        self.response_times(&self.attenuated_spectrum(thicknesses))
    }

    /// Apply the detector response to any per-energy quantity
    pub fn response_times(&self, per_energy: &Spectrum<E>) -> Counts<B> {
        self.calibration.response() * per_energy
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use proptest::prelude::*;

    pub(crate) fn two_materials() -> Calibration<2, 2, 3> {
        Calibration::from_rows(
            &[vec![0.1, 0.2, 0.3], vec![0.05, 0.1, 0.15]],
            &[vec![1.0, 1.0, 0.0], vec![0.0, 1.0, 1.0]],
            &[100.0, 100.0, 100.0],
        ).unwrap()
    }

    #[test]
    fn zero_thickness_means_no_attenuation() {
        let cal = two_materials();
        let model = ForwardModel::new(&cal);
        let lambdas = model.expected_counts(&Thicknesses::zeros());
        assert_eq!(lambdas, cal.response() * cal.spectrum());
        assert_eq!(lambdas, Counts::<2>::new(200.0, 200.0));
    }

    #[test]
    fn beer_lambert_by_hand() {
        let cal = two_materials();
        let model = ForwardModel::new(&cal);
        let t = Thicknesses::<2>::new(1.0, 2.0);
        let attenuated = model.attenuated_spectrum(&t);
        let expected = [100.0 * (-0.2_f64).exp(), 100.0 * (-0.4_f64).exp(), 100.0 * (-0.6_f64).exp()];
        for e in 0..3 {
            assert_float_eq!(attenuated[e], expected[e], r2nd <= 1e-12);
        }
        let lambdas = model.expected_counts(&t);
        assert_float_eq!(lambdas[0], expected[0] + expected[1], r2nd <= 1e-12);
        assert_float_eq!(lambdas[1], expected[1] + expected[2], r2nd <= 1e-12);
    }

    #[test]
    fn pixel_spectrum_replaces_calibration_spectrum() {
        let cal = two_materials();
        let spectrum = Spectrum::<3>::new(10.0, 0.0, 30.0);
        let model = ForwardModel::with_spectrum(&cal, &spectrum);
        assert_eq!(model.expected_counts(&Thicknesses::zeros()), Counts::<2>::new(10.0, 30.0));
    }

    #[test]
    fn huge_attenuation_underflows_to_zero() {
        let cal = two_materials();
        let model = ForwardModel::new(&cal);
        for t in [1e4, 1e300, f64::MAX, f64::INFINITY] {
            let attenuated = model.attenuated_spectrum(&Thicknesses::<2>::new(t, t));
            assert!(attenuated.iter().all(|&a| a == 0.0), "{t}: {attenuated:?}");
            let lambdas = model.expected_counts(&Thicknesses::<2>::new(t, 0.0));
            assert!(lambdas.iter().all(|&l| l == 0.0));
        }
    }

    proptest! {
        #[test]
        fn attenuation_is_monotonic_in_each_thickness(
            t0       in 0.0 .. 20.0_f64,
            t1       in 0.0 .. 20.0_f64,
            material in 0 .. 2_usize,
            extra    in 0.0 .. 10.0_f64,
        ) {
            let cal = two_materials();
            let model = ForwardModel::new(&cal);
            let thin = Thicknesses::<2>::new(t0, t1);
            let mut thick = thin;
            thick[material] += extra;
            let (thin, thick) = (model.attenuated_spectrum(&thin), model.attenuated_spectrum(&thick));
            for e in 0..3 {
                prop_assert!(thick[e] <= thin[e], "energy {}: {} > {}", e, thick[e], thin[e]);
            }
        }
    }
}
