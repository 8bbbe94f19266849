//! Link isotope wavelet seeds across retention time into LC-MS features.
mod assembler;
mod feature;
mod finder;
mod tracker;

pub use assembler::FeatureAssembler;
pub use feature::{convex_hull, Feature, MapPoint};
pub use finder::{FeatureFinder, FeatureFinderBuilder, FeatureFinderError, FeatureFinderParams};
pub use tracker::BoxTracker;

pub use isowave::params::IntensityType;
