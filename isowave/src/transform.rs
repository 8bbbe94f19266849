//! Convolution of a scan with the isotope wavelet
use tracing::warn;

use crate::spectrum::{ReferenceSpectrum, TransformedSpectrum};
use crate::wavelet::{averagine_lambda, WaveletModel, QUARTER_NEUTRON_MASS};

/// Quantities derived from one scan that bound the support of the wavelet
/// on its sampling grid at one charge state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanContext {
    pub charge: u32,
    /// The smallest positive m/z gap between consecutive points
    pub min_spacing: f64,
    /// How many points before a position the wavelet can reach
    pub from_max_to_left: usize,
    /// How many points after a position the wavelet can reach
    pub from_max_to_right: usize,
    pub wavelet_length: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct SpectrumConvolver<'a> {
    pub model: &'a WaveletModel,
    pub hr_data: bool,
}

impl<'a> SpectrumConvolver<'a> {
    pub fn new(model: &'a WaveletModel, hr_data: bool) -> Self {
        Self { model, hr_data }
    }

    pub fn initialize_scan(&self, spectrum: &ReferenceSpectrum, charge: u32) -> ScanContext {
        let n = spectrum.len();
        let z = charge as f64;
        let min_spacing = spectrum.min_spacing().unwrap_or(QUARTER_NEUTRON_MASS);

        let (wavelet_length, from_max_to_left) = if self.hr_data {
            // Irregular sampling, count the points actually covered
            let mut wavelet_length = 0;
            let mut quarter_length = 0;
            let mut left = 0;
            let mut right = 0;
            for i in 0..n {
                let mz = spectrum.mz(i);
                let reach = mz + self.model.mz_peak_cutoff(mz, charge) / z;
                right = right.max(i);
                while right < n && spectrum.mz(right) <= reach {
                    right += 1;
                }
                wavelet_length = wavelet_length.max(right - i);
                let behind = mz - QUARTER_NEUTRON_MASS / z;
                while spectrum.mz(left) < behind {
                    left += 1;
                }
                quarter_length = quarter_length.max(i - left);
            }
            (wavelet_length, quarter_length + 1)
        } else {
            let max_mz_cutoff = spectrum
                .last_mz()
                .map(|mz| self.model.mz_peak_cutoff(mz, charge) / z)
                .unwrap_or_default();
            (
                (max_mz_cutoff / min_spacing).ceil() as usize,
                (QUARTER_NEUTRON_MASS / min_spacing).ceil() as usize + 1,
            )
        };

        if wavelet_length > n {
            warn!(
                "The wavelet at charge {charge} spans {wavelet_length} points but scan {} only has {n}, the transform will lose accuracy",
                spectrum.index
            );
        }

        ScanContext {
            charge,
            min_spacing,
            from_max_to_left,
            from_max_to_right: wavelet_length.saturating_sub(from_max_to_left + 1),
            wavelet_length,
        }
    }

    /// Convolve `spectrum` with the wavelet at the charge `context` was initialized for.
    ///
    /// The result has one value per point of `spectrum`.
    pub fn transform<'s>(
        &self,
        spectrum: &'s ReferenceSpectrum,
        context: &ScanContext,
    ) -> TransformedSpectrum<'s> {
        let transformed = if self.hr_data {
            self.transform_hr(spectrum, context)
        } else {
            self.transform_lr(spectrum, context)
        };
        TransformedSpectrum::new(spectrum, transformed, context.charge)
    }

    /// Trapezoidal integration of the wavelet against the signal
    fn transform_lr(&self, spectrum: &ReferenceSpectrum, context: &ScanContext) -> Vec<f64> {
        let n = spectrum.len();
        let charge = context.charge;
        let z = charge as f64;
        let left_reach = context.from_max_to_left;

        let mut transformed = Vec::with_capacity(n);
        for pos in 0..n {
            let mz_pos = spectrum.mz(pos);
            let lambda = averagine_lambda(mz_pos * z);
            let right_boundary = self.model.mz_peak_cutoff(mz_pos, charge) / z;
            let origin = -mz_pos + QUARTER_NEUTRON_MASS / z;

            let start = pos.saturating_sub(left_reach);
            let mut old_position = if pos > left_reach {
                spectrum.mz(pos - left_reach - 1)
            } else {
                spectrum.mz(0) - context.min_spacing
            };

            let mut value = 0.0;
            let mut old = 0.0;
            let mut c_diff = f64::NEG_INFINITY;
            let mut j = start;
            while c_diff < right_boundary {
                if j >= n {
                    // Truncated at the end of the scan
                    value += 0.5 * old * context.min_spacing;
                    break;
                }
                let c_mz = spectrum.mz(j);
                c_diff = c_mz + origin;
                let current = if c_diff > 0.0 && c_diff <= right_boundary {
                    self.model.value(lambda, c_diff * z + 1.0) * spectrum.intensity(j)
                } else {
                    0.0
                };
                value += 0.5 * (current + old) * (c_mz - old_position);
                old = current;
                old_position = c_mz;
                j += 1;
            }
            transformed.push(value);
        }
        transformed
    }

    /// Pointwise sum of the wavelet against the signal
    fn transform_hr(&self, spectrum: &ReferenceSpectrum, context: &ScanContext) -> Vec<f64> {
        let n = spectrum.len();
        let charge = context.charge;
        let z = charge as f64;

        let mut transformed = Vec::with_capacity(n);
        for pos in 0..n {
            let mz_pos = spectrum.mz(pos);
            let lambda = averagine_lambda(mz_pos * z);
            let right_boundary = self.model.mz_peak_cutoff(mz_pos, charge) / z;
            let origin = -mz_pos + QUARTER_NEUTRON_MASS / z;

            let mut value = 0.0;
            let mut c_diff = f64::NEG_INFINITY;
            let mut j = pos.saturating_sub(context.from_max_to_left);
            while c_diff < right_boundary && j < n {
                c_diff = spectrum.mz(j) + origin;
                if c_diff > 0.0 && c_diff <= right_boundary {
                    value += self.model.value(lambda, c_diff * z + 1.0) * spectrum.intensity(j);
                }
                j += 1;
            }
            transformed.push(value);
        }
        transformed
    }
}
