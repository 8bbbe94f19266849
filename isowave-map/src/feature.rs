use itertools::Itertools;
use mzpeaks::coordinate::BoundingBox;
use mzpeaks::prelude::*;
use mzpeaks::MZ;

use isowave::scorer::ScoreType;

/// A point in retention time by m/z space
pub type MapPoint = (f64, f64);

fn cross(o: MapPoint, a: MapPoint, b: MapPoint) -> f64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

/// The convex hull of `points` in counter-clockwise order, starting from the point with
/// the lowest time (and lowest m/z among those). Collinear points are dropped.
pub fn convex_hull(mut points: Vec<MapPoint>) -> Vec<MapPoint> {
    points.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
    points.dedup();
    if points.len() < 3 {
        return points;
    }

    let mut lower: Vec<MapPoint> = Vec::with_capacity(points.len());
    for p in points.iter().copied() {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }

    let mut upper: Vec<MapPoint> = Vec::with_capacity(points.len());
    for p in points.iter().rev().copied() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// An isotopic pattern traced across retention time
#[derive(Debug, Clone, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Feature {
    /// The monoisotopic m/z
    pub mz: f64,
    pub charge: i32,
    pub time: f64,
    pub intensity: f64,
    pub score: ScoreType,
    /// The hull around the envelopes of every observation, as `(time, m/z)` vertices
    pub hull: Vec<MapPoint>,
}

impl Feature {
    pub fn new(
        mz: f64,
        charge: i32,
        time: f64,
        intensity: f64,
        score: ScoreType,
        hull: Vec<MapPoint>,
    ) -> Self {
        Self {
            mz,
            charge,
            time,
            intensity,
            score,
            hull,
        }
    }

    pub fn start_time(&self) -> Option<f64> {
        self.hull.iter().map(|p| p.0).min_by(|a, b| a.total_cmp(b))
    }

    pub fn end_time(&self) -> Option<f64> {
        self.hull.iter().map(|p| p.0).max_by(|a, b| a.total_cmp(b))
    }

    /// The m/z by time rectangle enclosing the hull
    pub fn bounding_box(&self) -> Option<BoundingBox<f64, f64>> {
        let (start, end) = self
            .hull
            .iter()
            .map(|p| p.0)
            .minmax_by(|a, b| a.total_cmp(b))
            .into_option()?;
        let (low, high) = self
            .hull
            .iter()
            .map(|p| p.1)
            .minmax_by(|a, b| a.total_cmp(b))
            .into_option()?;
        Some(BoundingBox::new((low, start), (high, end)))
    }
}

impl CoordinateLike<MZ> for Feature {
    fn coordinate(&self) -> f64 {
        self.mz
    }
}

impl IntensityMeasurement for Feature {
    fn intensity(&self) -> f32 {
        self.intensity as f32
    }
}

impl KnownCharge for Feature {
    fn charge(&self) -> i32 {
        self.charge
    }
}
