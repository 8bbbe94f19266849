//! Scan storage and the paired (reference, transform) accessor used by the scoring
//! and clustering steps.
use itertools::Itertools;
use mzpeaks::prelude::*;

/// A single scan as seen by the transform: m/z ascending, intensities widened to `f64`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceSpectrum {
    pub mz_array: Vec<f64>,
    pub intensity_array: Vec<f64>,
    pub time: f64,
    pub index: usize,
}

/// First position whose m/z is not less than `mz`
fn lower_bound(mz_array: &[f64], mz: f64) -> usize {
    mz_array.partition_point(|x| *x < mz)
}

/// First position whose m/z is greater than `mz`
fn upper_bound(mz_array: &[f64], mz: f64) -> usize {
    mz_array.partition_point(|x| *x <= mz)
}

impl ReferenceSpectrum {
    pub fn new(mz_array: Vec<f64>, intensity_array: Vec<f64>, time: f64, index: usize) -> Self {
        Self {
            mz_array,
            intensity_array,
            time,
            index,
        }
    }

    /// Build a scan from any centroid peak list, sorting by m/z if needed
    pub fn from_peaks<C: CentroidLike>(peaks: &[C], time: f64, index: usize) -> Self {
        let (mz_array, intensity_array): (Vec<f64>, Vec<f64>) = peaks
            .iter()
            .map(|p| (p.mz(), p.intensity() as f64))
            .sorted_by(|a, b| a.0.total_cmp(&b.0))
            .unzip();
        Self::new(mz_array, intensity_array, time, index)
    }

    pub fn from_arrays(mz_array: &[f64], intensity_array: &[f32], time: f64, index: usize) -> Self {
        let (mz_array, intensity_array): (Vec<f64>, Vec<f64>) = mz_array
            .iter()
            .zip(intensity_array.iter())
            .map(|(mz, i)| (*mz, *i as f64))
            .sorted_by(|a, b| a.0.total_cmp(&b.0))
            .unzip();
        Self::new(mz_array, intensity_array, time, index)
    }

    pub fn len(&self) -> usize {
        self.mz_array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mz_array.is_empty()
    }

    #[inline]
    pub fn mz(&self, i: usize) -> f64 {
        self.mz_array[i]
    }

    #[inline]
    pub fn intensity(&self, i: usize) -> f64 {
        self.intensity_array[i]
    }

    pub fn first_mz(&self) -> Option<f64> {
        self.mz_array.first().copied()
    }

    pub fn last_mz(&self) -> Option<f64> {
        self.mz_array.last().copied()
    }

    pub fn mz_begin(&self, mz: f64) -> usize {
        lower_bound(&self.mz_array, mz)
    }

    pub fn mz_end(&self, mz: f64) -> usize {
        upper_bound(&self.mz_array, mz)
    }

    /// The smallest positive gap between consecutive points
    pub fn min_spacing(&self) -> Option<f64> {
        self.mz_array
            .iter()
            .tuple_windows()
            .map(|(a, b)| b - a)
            .filter(|d| *d > 0.0)
            .min_by(|a, b| a.total_cmp(b))
    }

    /// Insert zero-intensity points so that no two consecutive points are more than
    /// `interval` apart, and pad both ends with zero points spanning `left_margin`
    /// and `right_margin` m/z units respectively.
    ///
    /// The original points keep their m/z and intensity.
    pub fn fill_gaps(&self, interval: f64, left_margin: f64, right_margin: f64) -> Self {
        if self.is_empty() {
            return self.clone();
        }
        let n_left = (left_margin / interval).ceil() as usize;
        let n_right = (right_margin / interval).ceil() as usize;
        let mut mz_array = Vec::with_capacity(self.len() * 2 + n_left + n_right);
        let mut intensity_array = Vec::with_capacity(mz_array.capacity());

        let first = self.mz_array[0];
        for k in (1..=n_left).rev() {
            mz_array.push(first - k as f64 * interval);
            intensity_array.push(0.0);
        }

        for (i, (mz, intensity)) in self
            .mz_array
            .iter()
            .zip(self.intensity_array.iter())
            .enumerate()
        {
            mz_array.push(*mz);
            intensity_array.push(*intensity);
            if let Some(next) = self.mz_array.get(i + 1) {
                let gap = next - mz;
                if gap > interval {
                    let n_fill = (gap / interval).ceil() as usize - 1;
                    let step = gap / (n_fill + 1) as f64;
                    for k in 1..=n_fill {
                        mz_array.push(mz + k as f64 * step);
                        intensity_array.push(0.0);
                    }
                }
            }
        }

        let last = mz_array[mz_array.len() - 1];
        for k in 1..=n_right {
            mz_array.push(last + k as f64 * interval);
            intensity_array.push(0.0);
        }

        Self::new(mz_array, intensity_array, self.time, self.index)
    }
}

/// Indexed access to a scan and its wavelet transform side by side.
///
/// Positions are shared between the two signals, so an index found by searching
/// the m/z axis is valid for both.
pub trait SignalAccess {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn mz(&self, i: usize) -> f64;
    fn ref_intensity(&self, i: usize) -> f64;
    fn trans_intensity(&self, i: usize) -> f64;

    /// The m/z axis shared by both signals, ascending
    fn mz_array(&self) -> &[f64];

    /// First position whose m/z is not less than `mz`
    fn mz_begin(&self, mz: f64) -> usize {
        lower_bound(self.mz_array(), mz)
    }

    /// First position whose m/z is greater than `mz`
    fn mz_end(&self, mz: f64) -> usize {
        upper_bound(self.mz_array(), mz)
    }

    /// The transform linearly interpolated at `mz` between `right - 1` and `right`.
    ///
    /// Returns [`None`] if `right` does not have a left neighbor inside the signal.
    fn interpolate_trans(&self, right: usize, mz: f64) -> Option<f64> {
        if right == 0 || right >= self.len() {
            return None;
        }
        let left = right - 1;
        let x0 = self.mz(left);
        let x1 = self.mz(right);
        let y0 = self.trans_intensity(left);
        let y1 = self.trans_intensity(right);
        if x1 == x0 {
            return Some(y0);
        }
        Some(y0 + (y1 - y0) / (x1 - x0) * (mz - x0))
    }
}

/// The wavelet transform of a [`ReferenceSpectrum`] at one charge state
#[derive(Debug, Clone)]
pub struct TransformedSpectrum<'a> {
    pub reference: &'a ReferenceSpectrum,
    pub transformed: Vec<f64>,
    pub charge: u32,
}

impl<'a> TransformedSpectrum<'a> {
    pub fn new(reference: &'a ReferenceSpectrum, transformed: Vec<f64>, charge: u32) -> Self {
        debug_assert_eq!(
            reference.len(),
            transformed.len(),
            "A transform must be aligned with its scan"
        );
        Self {
            reference,
            transformed,
            charge,
        }
    }

    pub fn time(&self) -> f64 {
        self.reference.time
    }

    pub fn scan_index(&self) -> usize {
        self.reference.index
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.reference
            .mz_array
            .iter()
            .copied()
            .zip(self.transformed.iter().copied())
    }
}

impl SignalAccess for TransformedSpectrum<'_> {
    fn len(&self) -> usize {
        self.transformed.len()
    }

    #[inline]
    fn mz(&self, i: usize) -> f64 {
        self.reference.mz(i)
    }

    #[inline]
    fn ref_intensity(&self, i: usize) -> f64 {
        self.reference.intensity(i)
    }

    #[inline]
    fn trans_intensity(&self, i: usize) -> f64 {
        self.transformed[i]
    }

    fn mz_array(&self) -> &[f64] {
        &self.reference.mz_array
    }
}
