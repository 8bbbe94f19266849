//! Isotope wavelet transform of single mass spectra.
//!
//! A scan is convolved with a wavelet shaped like an averagine isotopic envelope at
//! each charge state. Local maxima of the transform are scored against the expected
//! alternating peak and valley pattern, clustered within the scan, and re-anchored on
//! the untransformed signal. The committed [`BoxElement`]s are what a map-level tracker
//! links across retention time.
pub mod boxes;
pub mod charge;
pub mod cluster;
pub mod engine;
pub mod mass_rule;
pub mod params;
pub mod scorer;
pub mod spectrum;
pub mod transform;
pub mod wavelet;

pub use boxes::{BoxElement, BoxMap, IsotopeBox, SeedScore};
pub use charge::ChargeIdentifier;
pub use cluster::SeedClusterer;
pub use engine::WaveletEngine;
pub use params::{IntensityType, WaveletError, WaveletParams};
pub use scorer::{PatternScore, PeakScorer, ScoreType};
pub use spectrum::{ReferenceSpectrum, SignalAccess, TransformedSpectrum};
pub use transform::{ScanContext, SpectrumConvolver};
pub use wavelet::WaveletModel;
