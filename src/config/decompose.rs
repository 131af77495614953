//! Configuration file parser for material decomposition

use std::fs;
use std::str::FromStr;
use std::path::Path;

use serde::{Deserialize, Deserializer, de};

use units::Energy;

use crate::calibration::Calibration;
use crate::error::{CalibrationError, ConfigError};
use crate::fisher::DEFAULT_DEGENERACY_TOLERANCE;
use crate::minimize::SimplexSettings;

fn deserialize_uom_vec_opt<'d, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'d>,
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    Option::<Vec<&str>>::deserialize(deserializer)?
        .map(|v| v.into_iter().map(str::parse::<T>).collect::<Result<Vec<_>, _>>())
        .transpose()
        .map_err(de::Error::custom)
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {

    /// Nelder-Mead settings, applied to every pixel
    #[serde(default)]
    pub optimizer: SimplexSettings,

    /// Smallest acceptable (squared) Cholesky pivot of the scaled Fisher
    /// matrix; below it the estimate is reported as degenerate
    #[serde(default = "default_degeneracy_tolerance")]
    pub degeneracy_tolerance: f64,

    pub calibration: CalibrationConfig,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CalibrationConfig {

    /// Names used for the per-material output files
    #[serde(default)]
    pub materials: Option<Vec<String>>,

    /// Spectral bin boundaries, e.g. `["20 keV", "40 keV", "60 keV"]`
    #[serde(default)]
    #[serde(deserialize_with = "deserialize_uom_vec_opt")]
    pub thresholds: Option<Vec<Energy>>,

    /// Photons per incident-energy sample reaching the pixel when nothing is
    /// in the way
    pub incident_spectrum: Vec<f64>,

    /// One row per material, one column per incident-energy sample
    pub material_attenuations: Vec<Vec<f64>>,

    /// One row per spectral bin, one column per incident-energy sample
    #[serde(default)]
    pub detector_response: Option<Vec<Vec<f64>>>,

    /// One row per detected energy (1 keV steps from 0 keV), one column per
    /// incident-energy sample; binned according to `thresholds`
    #[serde(default)]
    pub raw_detector_response: Option<Vec<Vec<f64>>>,
}

fn default_degeneracy_tolerance() -> f64 { DEFAULT_DEGENERACY_TOLERANCE }

/// Numbers of materials, spectral bins and incident-energy samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    pub materials: usize,
    pub bins: usize,
    pub energies: usize,
}

impl Config {

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.optimizer.validate()?;
        let tolerance = self.degeneracy_tolerance;
        if !(tolerance.is_finite() && tolerance >= 0.0) {
            return Err(ConfigError::DegeneracyTolerance(tolerance))
        }
        if let Some(names) = &self.calibration.materials {
            let expected = self.calibration.material_attenuations.len();
            if names.len() != expected {
                return Err(CalibrationError::MaterialNames { expected, found: names.len() }.into())
            }
        }
        Ok(())
    }
}

impl CalibrationConfig {

    /// Dimensions implied by the tables, used to choose among the compiled
    /// decompositions. The tables themselves are checked by [`Self::build`].
    pub fn shape(&self) -> Result<Shape, CalibrationError> {
        let bins = match (&self.detector_response, &self.raw_detector_response, &self.thresholds) {
            (Some(response), None, _         ) => response.len(),
            (None, Some(_)     , Some(thr)   ) => thr.len().saturating_sub(1),
            (None, Some(_)     , None        ) => return Err(CalibrationError::MissingThresholds),
            _                                  => return Err(CalibrationError::AmbiguousResponse),
        };
        Ok(Shape {
            materials: self.material_attenuations.len(),
            bins,
            energies: self.incident_spectrum.len(),
        })
    }

    /// Name of each material, defaulting to its index
    pub fn material_names(&self) -> Vec<String> {
        match &self.materials {
            Some(names) => names.clone(),
            None => (0..self.material_attenuations.len()).map(|m| format!("material{m}")).collect(),
        }
    }

    pub fn build<const M: usize, const B: usize, const E: usize>(&self) -> Result<Calibration<M, B, E>, CalibrationError> {
        let binned;
        let response = match (&self.detector_response, &self.raw_detector_response) {
            (Some(response), None) => response,
            (None, Some(raw)) => {
                let thresholds = self.thresholds.as_ref().ok_or(CalibrationError::MissingThresholds)?;
                binned = Calibration::<M, B, E>::bin_detector_response(raw, thresholds)?
                    .row_iter()
                    .map(|row| row.iter().copied().collect())
                    .collect::<Vec<Vec<f64>>>();
                &binned
            },
            _ => return Err(CalibrationError::AmbiguousResponse),
        };
        let calibration = Calibration::from_rows(&self.material_attenuations, response, &self.incident_spectrum)?;
        match &self.thresholds {
            Some(thresholds) => calibration.with_thresholds(thresholds),
            None             => Ok(calibration),
        }
    }
}

pub fn read_config_file(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    let config: Config = toml::from_str(&text)?;
    config.validate()?;
    Ok(config)
}
