//! Turn closed boxes into features
use isowave::boxes::{BoxElement, IsotopeBox, SeedScore};
use isowave::params::IntensityType;
use isowave::spectrum::ReferenceSpectrum;
use isowave::wavelet::{averagine_lambda, skellam_normalization, WaveletModel, NEUTRON_MASS, QUARTER_NEUTRON_MASS};

use crate::feature::{convex_hull, Feature};

#[derive(Debug, Clone, Copy)]
pub struct FeatureAssembler<'a> {
    pub model: &'a WaveletModel,
    pub intensity_type: IntensityType,
    pub rt_votes_cutoff: usize,
}

impl<'a> FeatureAssembler<'a> {
    pub fn new(model: &'a WaveletModel, intensity_type: IntensityType, rt_votes_cutoff: usize) -> Self {
        Self {
            model,
            intensity_type,
            rt_votes_cutoff,
        }
    }

    /// The charge with the largest summed transform intensity, and how many entries
    /// carry that charge. Ties go to the lowest charge.
    pub fn vote_charge(&self, isobox: &IsotopeBox) -> Option<(u32, usize)> {
        let max_charge = self.model.max_charge() as usize;
        let mut votes = vec![0.0; max_charge];
        let mut binary_votes = vec![0usize; max_charge];
        for e in isobox {
            let Some(slot) = (e.charge as usize).checked_sub(1).filter(|i| *i < max_charge) else {
                continue;
            };
            votes[slot] += e.intensity;
            binary_votes[slot] += 1;
        }

        let mut best: Option<usize> = None;
        let mut best_vote = 0.0;
        for (i, vote) in votes.iter().copied().enumerate() {
            if vote > best_vote {
                best = Some(i);
                best_vote = vote;
            }
        }
        best.map(|i| (i as u32 + 1, binary_votes[i]))
    }

    /// Sum the untransformed signal's local maxima near each isotope position of `entry`.
    fn ref_intensity(&self, entry: &BoxElement, charge: u32, scans: &[ReferenceSpectrum]) -> f64 {
        let Ok(pos) = scans.binary_search_by_key(&entry.scan_index, |s| s.index) else {
            return 0.0;
        };
        let scan = &scans[pos];
        if scan.is_empty() {
            return 0.0;
        }
        let z = charge as f64;
        let n_peaks = self.model.mz_peak_cutoff(entry.mz, charge) as usize;

        let mut total = 0.0;
        for i in 0..n_peaks {
            let target = entry.mz + i as f64 * NEUTRON_MASS / z;
            let mut hc = scan.mz_begin(target);
            if hc >= scan.len() {
                continue;
            }
            let mut h = scan.mz_begin(target + QUARTER_NEUTRON_MASS / z);
            while h > 0 {
                h -= 1;
                let (here, best) = (scan.intensity(h), scan.intensity(hc));
                if here > best || (here == best && best == 0.0) {
                    hc = h;
                }
                if target - scan.mz(h) > QUARTER_NEUTRON_MASS / z {
                    break;
                }
            }
            total += scan.intensity(hc);
        }
        total
    }

    /// Build a feature from `isobox`, or [`None`] if the box does not describe one.
    ///
    /// `n_scans` is the length of the run. `scans` holds the prepared scans by scan index
    /// and is only consulted for [`IntensityType::Ref`].
    pub fn assemble(
        &self,
        isobox: &IsotopeBox,
        scans: &[ReferenceSpectrum],
        n_scans: usize,
    ) -> Option<Feature> {
        if isobox.is_empty() || isobox.has_borderline() {
            return None;
        }
        let (charge, n_votes) = self.vote_charge(isobox)?;
        if n_votes < self.rt_votes_cutoff && self.rt_votes_cutoff <= n_scans {
            return None;
        }
        let z = charge as f64;

        let mut hull_points = Vec::with_capacity(isobox.len() * 2);
        let mut sum_intensity = 0.0;
        let mut weighted_mz = 0.0;
        let mut sum_score = 0.0;
        let mut sum_ref = 0.0;
        let mut sum_time = 0.0;
        for e in isobox {
            let mz_cutoff = self.model.mz_peak_cutoff(e.mz, charge);
            hull_points.push((e.time, e.mz - QUARTER_NEUTRON_MASS / z));
            hull_points.push((e.time, e.mz + mz_cutoff / z));

            if e.charge == charge {
                sum_intensity += e.intensity;
                weighted_mz += e.mz * e.intensity;
                sum_score += match e.score {
                    SeedScore::Accepted(s) => s,
                    _ => 0.0,
                };
                if matches!(self.intensity_type, IntensityType::Ref) {
                    sum_ref += self.ref_intensity(e, charge, scans);
                }
            }
            sum_time += e.time;
        }
        if sum_intensity <= 0.0 {
            return None;
        }

        let mz = weighted_mz / sum_intensity;
        let score = sum_score / n_votes as f64;
        let time = sum_time / isobox.len() as f64;
        let intensity = match self.intensity_type {
            IntensityType::Ref => sum_ref,
            IntensityType::Corrected => {
                sum_intensity / skellam_normalization(averagine_lambda(mz * z))
            }
            IntensityType::TransformSum => sum_intensity,
        };

        Some(Feature::new(
            mz,
            charge as i32,
            time,
            intensity,
            score,
            convex_hull(hull_points),
        ))
    }
}
