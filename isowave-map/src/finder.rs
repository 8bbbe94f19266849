use std::ops::Range;

use mzpeaks::prelude::*;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, trace};

use isowave::boxes::{BoxElement, IsotopeBox};
use isowave::engine::WaveletEngine;
use isowave::params::{IntensityType, WaveletError, WaveletParams};
use isowave::spectrum::ReferenceSpectrum;

use crate::assembler::FeatureAssembler;
use crate::feature::Feature;
use crate::tracker::BoxTracker;

#[derive(Debug, Error)]
pub enum FeatureFinderError {
    #[error(transparent)]
    Wavelet(#[from] WaveletError),
    #[error("The minimum number of scans per feature must be at least 1")]
    InvalidVotesCutoff,
    #[error("Scan {index} at time {time} comes before the previous scan at time {previous}")]
    NonMonotonicTime {
        index: usize,
        time: f64,
        previous: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeatureFinderParams {
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub wavelet: WaveletParams,
    /// How many scans a pattern may be missing from before its box is finished
    pub rt_interleave: usize,
    /// How many scans a pattern must be seen in to be reported
    pub rt_votes_cutoff: usize,
    pub intensity_type: IntensityType,
    /// Transform and score the charge states of each scan in parallel
    pub parallel_charges: bool,
}

impl Default for FeatureFinderParams {
    fn default() -> Self {
        Self {
            wavelet: WaveletParams::default(),
            rt_interleave: 1,
            rt_votes_cutoff: 3,
            intensity_type: IntensityType::Ref,
            parallel_charges: false,
        }
    }
}

impl FeatureFinderParams {
    pub fn new(
        wavelet: WaveletParams,
        rt_interleave: usize,
        rt_votes_cutoff: usize,
        intensity_type: IntensityType,
        parallel_charges: bool,
    ) -> Self {
        Self {
            wavelet,
            rt_interleave,
            rt_votes_cutoff,
            intensity_type,
            parallel_charges,
        }
    }

    pub fn validate(&self) -> Result<(), FeatureFinderError> {
        self.wavelet.validate()?;
        if self.rt_votes_cutoff == 0 {
            return Err(FeatureFinderError::InvalidVotesCutoff);
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct FeatureFinderBuilder {
    pub params: FeatureFinderParams,
}

impl FeatureFinderBuilder {
    pub fn mz_range(&mut self, min_mz: f64, max_mz: f64) -> &mut Self {
        self.params.wavelet.min_mz = min_mz;
        self.params.wavelet.max_mz = max_mz;
        self
    }

    pub fn max_charge(&mut self, max_charge: u32) -> &mut Self {
        self.params.wavelet.max_charge = max_charge;
        self
    }

    pub fn hr_data(&mut self, hr_data: bool) -> &mut Self {
        self.params.wavelet.hr_data = hr_data;
        self
    }

    pub fn amplitude_cutoff(&mut self, amplitude_cutoff: f64) -> &mut Self {
        self.params.wavelet.amplitude_cutoff = amplitude_cutoff;
        self
    }

    pub fn check_ppm(&mut self, check_ppm: bool) -> &mut Self {
        self.params.wavelet.check_ppm = check_ppm;
        self
    }

    pub fn sampling_interval(&mut self, sampling_interval: Option<f64>) -> &mut Self {
        self.params.wavelet.sampling_interval = sampling_interval;
        self
    }

    pub fn rt_interleave(&mut self, rt_interleave: usize) -> &mut Self {
        self.params.rt_interleave = rt_interleave;
        self
    }

    pub fn rt_votes_cutoff(&mut self, rt_votes_cutoff: usize) -> &mut Self {
        self.params.rt_votes_cutoff = rt_votes_cutoff;
        self
    }

    pub fn intensity_type(&mut self, intensity_type: IntensityType) -> &mut Self {
        self.params.intensity_type = intensity_type;
        self
    }

    pub fn parallel_charges(&mut self, parallel_charges: bool) -> &mut Self {
        self.params.parallel_charges = parallel_charges;
        self
    }

    pub fn build(&self) -> Result<FeatureFinder, FeatureFinderError> {
        FeatureFinder::new(self.params)
    }
}

/// Detect features in a retention time ordered stream of scans.
///
/// Scans are fed one at a time with [`FeatureFinder::process_scan`] and the features
/// are collected with [`FeatureFinder::finish`]. [`FeatureFinder::find_features_chunked`]
/// processes a complete run in parallel chunks instead.
#[derive(Debug, Clone)]
pub struct FeatureFinder {
    params: FeatureFinderParams,
    engine: WaveletEngine,
    tracker: BoxTracker,
    scans: Vec<ReferenceSpectrum>,
    n_scans: usize,
    last_time: Option<f64>,
}

impl FeatureFinder {
    pub fn new(params: FeatureFinderParams) -> Result<Self, FeatureFinderError> {
        params.validate()?;
        let engine = WaveletEngine::new(params.wavelet)?;
        let tracker = BoxTracker::new(
            params.wavelet.max_charge,
            params.rt_interleave,
            params.rt_votes_cutoff,
        );
        Ok(Self {
            params,
            engine,
            tracker,
            scans: Vec::new(),
            n_scans: 0,
            last_time: None,
        })
    }

    pub fn builder() -> FeatureFinderBuilder {
        FeatureFinderBuilder::default()
    }

    pub fn params(&self) -> &FeatureFinderParams {
        &self.params
    }

    pub fn engine(&self) -> &WaveletEngine {
        &self.engine
    }

    pub fn tracker(&self) -> &BoxTracker {
        &self.tracker
    }

    /// The number of scans seen so far
    pub fn len(&self) -> usize {
        self.n_scans
    }

    pub fn is_empty(&self) -> bool {
        self.n_scans == 0
    }

    fn retains_scans(&self) -> bool {
        matches!(self.params.intensity_type, IntensityType::Ref)
    }

    fn check_time(&mut self, index: usize, time: f64) -> Result<(), FeatureFinderError> {
        if let Some(previous) = self.last_time {
            if time < previous {
                return Err(FeatureFinderError::NonMonotonicTime {
                    index,
                    time,
                    previous,
                });
            }
        }
        self.last_time = Some(time);
        Ok(())
    }

    fn seeds_for(&self, scan: &ReferenceSpectrum) -> Vec<BoxElement> {
        if self.params.parallel_charges {
            let per_charge: Vec<Vec<BoxElement>> = self
                .engine
                .charges()
                .into_par_iter()
                .map(|charge| self.engine.process_charge(scan, charge))
                .collect();
            per_charge.into_iter().flatten().collect()
        } else {
            self.engine.process_scan(scan)
        }
    }

    /// Add the next scan of the run from its centroid peaks
    pub fn process_scan<C: CentroidLike>(
        &mut self,
        peaks: &[C],
        time: f64,
    ) -> Result<(), FeatureFinderError> {
        let scan = ReferenceSpectrum::from_peaks(peaks, time, self.n_scans);
        self.process_spectrum(scan)
    }

    /// Add the next scan of the run. Its index is replaced by its position in the run.
    pub fn process_spectrum(&mut self, mut scan: ReferenceSpectrum) -> Result<(), FeatureFinderError> {
        let index = self.n_scans;
        scan.index = index;
        self.check_time(index, scan.time)?;

        let scan = self.engine.prepare_scan(scan);
        let seeds = self.seeds_for(&scan);
        debug!(
            "Scan {index} at {:0.3}: {} seeds, {} open boxes",
            scan.time,
            seeds.len(),
            self.tracker.open_boxes().len()
        );
        self.tracker.extend(seeds);
        self.tracker.update_box_states(index, false);
        if self.retains_scans() {
            self.scans.push(scan);
        }
        self.n_scans += 1;
        Ok(())
    }

    fn assemble(&self, closed: Vec<IsotopeBox>, scans: &[ReferenceSpectrum]) -> Vec<Feature> {
        let assembler = FeatureAssembler::new(
            self.engine.model(),
            self.params.intensity_type,
            self.params.rt_votes_cutoff,
        );
        let n_closed = closed.len();
        let mut features: Vec<Feature> = closed
            .iter()
            .filter_map(|b| assembler.assemble(b, scans, self.n_scans))
            .collect();
        features.sort_by(|a, b| a.mz.total_cmp(&b.mz).then(a.charge.cmp(&b.charge)));
        debug!("Assembled {} features from {n_closed} closed boxes", features.len());
        features
    }

    /// Close every box still open and build the features of the run
    pub fn finish(mut self) -> Vec<Feature> {
        if let Some(last) = self.n_scans.checked_sub(1) {
            self.tracker.update_box_states(last, true);
        }
        let closed = self.tracker.drain_closed();
        self.assemble(closed, &self.scans)
    }

    /// Process a whole run in order and build its features
    pub fn find_features<I: IntoIterator<Item = ReferenceSpectrum>>(
        mut self,
        scans: I,
    ) -> Result<Vec<Feature>, FeatureFinderError> {
        for scan in scans {
            self.process_spectrum(scan)?;
        }
        Ok(self.finish())
    }

    fn chunk_ranges(n: usize, n_chunks: usize) -> Vec<Range<usize>> {
        let n_chunks = n_chunks.clamp(1, n.max(1));
        let size = n.div_ceil(n_chunks).max(1);
        (0..n).step_by(size).map(|start| start..(start + size).min(n)).collect()
    }

    /// Process a whole run split into `n_chunks` contiguous chunks of scans in parallel,
    /// then join the patterns that cross chunk boundaries.
    pub fn find_features_chunked(
        mut self,
        scans: Vec<ReferenceSpectrum>,
        n_chunks: usize,
    ) -> Result<Vec<Feature>, FeatureFinderError> {
        let mut scans = scans;
        for (index, scan) in scans.iter_mut().enumerate() {
            scan.index = index;
            self.check_time(index, scan.time)?;
        }
        let n = scans.len();
        self.n_scans = n;

        let prepared: Vec<ReferenceSpectrum> = scans
            .into_par_iter()
            .map(|scan| self.engine.prepare_scan(scan))
            .collect();

        let ranges = Self::chunk_ranges(n, n_chunks);
        let n_ranges = ranges.len();
        debug!("Processing {n} scans in {n_ranges} chunks");

        let trackers: Vec<BoxTracker> = ranges
            .into_par_iter()
            .enumerate()
            .map(|(k, range)| {
                let front_bound = (k > 0).then_some(range.start);
                let end_bound = (k + 1 < n_ranges).then(|| range.end - 1);
                let mut tracker = BoxTracker::new(
                    self.params.wavelet.max_charge,
                    self.params.rt_interleave,
                    self.params.rt_votes_cutoff,
                )
                .with_bounds(front_bound, end_bound);
                for i in range {
                    let seeds = self.seeds_for(&prepared[i]);
                    trace!("Chunk {k} scan {i}: {} seeds", seeds.len());
                    tracker.extend(seeds);
                    tracker.update_box_states(i, i + 1 == n);
                }
                tracker
            })
            .collect();

        let mut trackers = trackers.into_iter();
        let Some(mut merged) = trackers.next() else {
            return Ok(Vec::new());
        };
        for later in trackers {
            merged.merge_features(later);
        }
        Ok(self.assemble(merged.drain_closed(), &prepared))
    }
}
