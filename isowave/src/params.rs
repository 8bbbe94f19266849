use std::fmt::Display;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WaveletError {
    #[error("The maximum charge must be at least 1")]
    InvalidMaxCharge,
    #[error("Invalid m/z range {0}-{1}, the lower bound must be finite and below the upper bound")]
    InvalidMzRange(f64, f64),
    #[error("The sampling interval must be positive and finite, got {0}")]
    InvalidSamplingInterval(f64),
    #[error("Unknown intensity type {0:?}, expected one of \"ref\", \"corrected\" or \"transform-sum\"")]
    UnknownIntensityType(String),
}

/// How the intensity of a finished feature is computed
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum IntensityType {
    /// Sum the local maxima of the untransformed signal at each isotope position
    #[default]
    Ref,
    /// Divide the summed transform by the Skellam normalization of the envelope
    Corrected,
    /// The summed transform as-is
    TransformSum,
}

impl FromStr for IntensityType {
    type Err = WaveletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ref" => Ok(Self::Ref),
            "corrected" => Ok(Self::Corrected),
            "transform-sum" | "transform_sum" => Ok(Self::TransformSum),
            _ => Err(WaveletError::UnknownIntensityType(s.to_string())),
        }
    }
}

impl Display for IntensityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Ref => "ref",
            Self::Corrected => "corrected",
            Self::TransformSum => "transform-sum",
        };
        f.write_str(s)
    }
}

/// Parameters for transforming and scoring a single scan
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WaveletParams {
    pub min_mz: f64,
    pub max_mz: f64,
    pub max_charge: u32,
    /// Use the pointwise sum for irregularly sampled high resolution data instead
    /// of integrating over a regular grid
    pub hr_data: bool,
    /// How many standard deviations above the mean transform value a pattern must
    /// score to be accepted. Negative values disable the threshold.
    pub amplitude_cutoff: f64,
    pub check_ppm: bool,
    /// When set, sparse centroid lists are zero filled to this spacing before the
    /// transform
    pub sampling_interval: Option<f64>,
}

impl Default for WaveletParams {
    fn default() -> Self {
        Self {
            min_mz: 0.0,
            max_mz: 10000.0,
            max_charge: 3,
            hr_data: false,
            amplitude_cutoff: -1.0,
            check_ppm: false,
            sampling_interval: Some(0.04),
        }
    }
}

impl WaveletParams {
    pub fn new(
        min_mz: f64,
        max_mz: f64,
        max_charge: u32,
        hr_data: bool,
        amplitude_cutoff: f64,
        check_ppm: bool,
        sampling_interval: Option<f64>,
    ) -> Self {
        Self {
            min_mz,
            max_mz,
            max_charge,
            hr_data,
            amplitude_cutoff,
            check_ppm,
            sampling_interval,
        }
    }

    pub fn validate(&self) -> Result<(), WaveletError> {
        if self.max_charge == 0 {
            return Err(WaveletError::InvalidMaxCharge);
        }
        if !self.min_mz.is_finite() || !self.max_mz.is_finite() || self.min_mz >= self.max_mz {
            return Err(WaveletError::InvalidMzRange(self.min_mz, self.max_mz));
        }
        if let Some(dx) = self.sampling_interval {
            if !dx.is_finite() || dx <= 0.0 {
                return Err(WaveletError::InvalidSamplingInterval(dx));
            }
        }
        Ok(())
    }
}
