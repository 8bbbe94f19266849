//! Run every step for one scan across all charge states
use std::ops::RangeInclusive;

use tracing::{debug, warn};

use crate::boxes::BoxElement;
use crate::charge::ChargeIdentifier;
use crate::params::{WaveletError, WaveletParams};
use crate::spectrum::ReferenceSpectrum;
use crate::transform::SpectrumConvolver;
use crate::wavelet::WaveletModel;

/// Owns the wavelet model built from a [`WaveletParams`] and drives the
/// transform, seed search and clustering steps for each scan.
#[derive(Debug, Clone)]
pub struct WaveletEngine {
    params: WaveletParams,
    model: WaveletModel,
}

impl WaveletEngine {
    pub fn new(params: WaveletParams) -> Result<Self, WaveletError> {
        params.validate()?;
        let model = WaveletModel::new(params.min_mz, params.max_mz, params.max_charge);
        Ok(Self { params, model })
    }

    pub fn params(&self) -> &WaveletParams {
        &self.params
    }

    pub fn model(&self) -> &WaveletModel {
        &self.model
    }

    pub fn charges(&self) -> RangeInclusive<u32> {
        1..=self.params.max_charge
    }

    /// Zero fill `scan` if a sampling interval is configured.
    ///
    /// The margins cover the charge 1 envelope width so the scorer can sample
    /// positions on both sides of any peak in the scan.
    pub fn prepare_scan(&self, scan: ReferenceSpectrum) -> ReferenceSpectrum {
        let (Some(first), Some(last)) = (scan.first_mz(), scan.last_mz()) else {
            return scan;
        };
        if !self.model.is_modelled(first) || !self.model.is_modelled(last) {
            warn!(
                "Scan {} spans {first:0.3}-{last:0.3}, outside the modelled range {}-{}",
                scan.index,
                self.model.min_mz(),
                self.model.max_mz()
            );
        }
        match self.params.sampling_interval {
            Some(dx) => scan.fill_gaps(
                dx,
                self.model.mz_peak_cutoff(first, 1),
                self.model.mz_peak_cutoff(last, 1),
            ),
            None => scan,
        }
    }

    pub fn charge_identifier(&self) -> ChargeIdentifier<'_> {
        ChargeIdentifier::new(
            &self.model,
            self.params.hr_data,
            self.params.amplitude_cutoff,
            self.params.check_ppm,
        )
    }

    /// Transform a prepared scan at `charge` and return the observations to commit
    pub fn process_charge(&self, scan: &ReferenceSpectrum, charge: u32) -> Vec<BoxElement> {
        if scan.len() < 3 {
            return Vec::new();
        }
        let convolver = SpectrumConvolver::new(&self.model, self.params.hr_data);
        let context = convolver.initialize_scan(scan, charge);
        let signal = convolver.transform(scan, &context);
        self.charge_identifier().identify_charge(&signal, &context)
    }

    /// [`WaveletEngine::process_charge`] for each charge in ascending order
    pub fn process_scan(&self, scan: &ReferenceSpectrum) -> Vec<BoxElement> {
        let mut acc = Vec::new();
        for charge in self.charges() {
            let found = self.process_charge(scan, charge);
            debug!(
                "Scan {} charge {charge}: {} seeds committed",
                scan.index,
                found.len()
            );
            acc.extend(found);
        }
        acc
    }
}
