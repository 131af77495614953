//! Calibration data shared, read-only, by every pixel of a run.
//!
//! A [`Calibration`] can only be obtained through constructors which check
//! that the tables are consistent with the compiled dimensions `<M, B, E>`
//! and physically sensible. The per-pixel code relies on this and performs no
//! further checks.

use itertools::Itertools;

use units::{Energy, kev_};

use crate::error::CalibrationError;
use crate::types::{AttenuationTable, DetectorResponse, Spectrum};

type Result<T> = std::result::Result<T, CalibrationError>;

#[derive(Debug, Clone, PartialEq)]
pub struct Calibration<const M: usize, const B: usize, const E: usize> {
    attenuations: AttenuationTable<M, E>,
    response: DetectorResponse<B, E>,
    spectrum: Spectrum<E>,
    /// Bin boundaries in keV: `B + 1` strictly increasing values, if known
    thresholds: Option<Vec<f64>>,
}

impl<const M: usize, const B: usize, const E: usize> Calibration<M, B, E> {

    pub fn new(
        attenuations: AttenuationTable<M, E>,
        response    : DetectorResponse<B, E>,
        spectrum    : Spectrum<E>,
    ) -> Result<Self> {
        check_entries("material attenuation table", attenuations.row_iter().map(|r| r.iter().copied().collect()))?;
        check_entries("detector response"         , response    .row_iter().map(|r| r.iter().copied().collect()))?;
        check_entries("incident spectrum"         , std::iter::once(spectrum.iter().copied().collect()))?;
        for (bin, row) in response.row_iter().enumerate() {
            if row.iter().all(|&r| r == 0.0) { return Err(CalibrationError::EmptyBin { bin }) }
        }
        Ok(Self { attenuations, response, spectrum, thresholds: None })
    }

    /// Build from nested slices, as found in configuration files: `M` rows of
    /// `E` attenuation coefficients, `B` rows of `E` response values and `E`
    /// spectrum values.
    pub fn from_rows(
        attenuations: &[Vec<f64>],
        response    : &[Vec<f64>],
        spectrum    : &[f64],
    ) -> Result<Self> {
        let attenuations = table::<M, E>("material attenuation table", "materials", attenuations)?;
        let response     = table::<B, E>("detector response"         , "bins"     , response    )?;
        check_length("incident spectrum", "energies", E, spectrum.len())?;
        Self::new(attenuations, response, Spectrum::from_column_slice(spectrum))
    }

    /// Attach the spectral bin boundaries. These are not used by the
    /// decomposition itself, but are validated and carried along for the
    /// benefit of the harness.
    pub fn with_thresholds(mut self, thresholds: &[Energy]) -> Result<Self> {
        let thresholds = thresholds.iter().copied().map(kev_).collect::<Vec<_>>();
        check_thresholds::<B>(&thresholds)?;
        self.thresholds = Some(thresholds);
        Ok(self)
    }

    /// Bin a full detector response into `B` spectral bins.
    ///
    /// Row `k` of `raw` is the probability of a photon being detected with
    /// energy `k` keV (1 keV steps starting at 0 keV); column `e` is the
    /// incident energy sample. Bin `b` collects detected energies from
    /// `thresholds[b]` up to, but excluding, `thresholds[b+1]`.
    pub fn bin_detector_response(raw: &[Vec<f64>], thresholds: &[Energy]) -> Result<DetectorResponse<B, E>> {
        let thresholds = thresholds.iter().copied().map(kev_).collect::<Vec<_>>();
        check_thresholds::<B>(&thresholds)?;
        if let Some(row) = raw.iter().find(|row| row.len() != E) {
            return Err(CalibrationError::WrongLength {
                what: "raw detector response row", axis: "energies", expected: E, found: row.len(),
            })
        }
        let available = raw.len();
        let mut binned = DetectorResponse::<B, E>::zeros();
        for (b, (lo, hi)) in thresholds.iter().tuple_windows().enumerate() {
            let (lo, hi) = (lo.round(), hi.round());
            if hi > available as f64 {
                return Err(CalibrationError::ThresholdOutOfRange { value: hi, available })
            }
            for row in &raw[lo as usize .. hi as usize] {
                for (e, r) in row.iter().enumerate() {
                    binned[(b, e)] += r;
                }
            }
        }
        Ok(binned)
    }

    pub fn attenuations(&self) -> &AttenuationTable<M, E> { &self.attenuations }
    pub fn response    (&self) -> &DetectorResponse<B, E> { &self.response     }
    pub fn spectrum    (&self) -> &Spectrum<E>            { &self.spectrum     }
    pub fn thresholds  (&self) -> Option<&[f64]>          { self.thresholds.as_deref() }
}

/// Check a per-pixel incident spectrum with the same rules as the calibration
/// spectrum. Returns the offending energy index and value.
pub fn invalid_spectrum_entry<const E: usize>(spectrum: &Spectrum<E>) -> Option<(usize, f64)> {
    spectrum.iter().copied().enumerate().find(|(_, s)| !s.is_finite() || *s < 0.0)
}

fn table<const R: usize, const C: usize>(what: &'static str, axis: &'static str, rows: &[Vec<f64>]) -> Result<nalgebra::SMatrix<f64, R, C>> {
    check_length(what, axis, R, rows.len())?;
    for row in rows {
        check_length(what, "energies", C, row.len())?;
    }
    Ok(nalgebra::SMatrix::<f64, R, C>::from_fn(|r, c| rows[r][c]))
}

fn check_length(what: &'static str, axis: &'static str, expected: usize, found: usize) -> Result<()> {
    if expected == found { Ok(()) }
    else { Err(CalibrationError::WrongLength { what, axis, expected, found }) }
}

fn check_entries(what: &'static str, rows: impl Iterator<Item = Vec<f64>>) -> Result<()> {
    for (r, row) in rows.enumerate() {
        for (c, value) in row.into_iter().enumerate() {
            if !value.is_finite() { return Err(CalibrationError::NonFinite { what, index: (r, c), value }) }
            if value < 0.0        { return Err(CalibrationError::Negative  { what, index: (r, c), value }) }
        }
    }
    Ok(())
}

fn check_thresholds<const B: usize>(thresholds: &[f64]) -> Result<()> {
    check_length("bin thresholds", "values", B + 1, thresholds.len())?;
    check_entries("bin thresholds", std::iter::once(thresholds.to_vec()))?;
    for (index, (lo, hi)) in thresholds.iter().tuple_windows().enumerate() {
        if hi <= lo { return Err(CalibrationError::ThresholdsNotIncreasing { index: index + 1, value: *hi }) }
    }
    Ok(())
}
