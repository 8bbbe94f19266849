//! Collapse the seeds found in one scan at one charge into committed observations
use crate::boxes::{BoxElement, BoxMap, IsotopeBox, SeedScore};
use crate::mass_rule::check_ppm_theo_model;
use crate::scorer::{PatternScore, PeakScorer};
use crate::spectrum::SignalAccess;
use crate::wavelet::{WaveletModel, QUARTER_NEUTRON_MASS};

#[derive(Debug, Clone, Copy)]
pub struct SeedClusterer<'a> {
    pub model: &'a WaveletModel,
    pub scorer: PeakScorer,
    pub check_ppm: bool,
}

/// Average one temporary box into a single representative.
///
/// Helper points only contribute when the box has no real seed in it.
fn summarize(isobox: &IsotopeBox) -> Option<BoxElement> {
    let first = *isobox.entries().first()?;
    let real: Vec<&BoxElement> = isobox.iter().filter(|e| e.score.is_real()).collect();
    let members: Vec<&BoxElement> = if real.is_empty() {
        isobox.iter().collect()
    } else {
        real
    };

    let n = members.len() as f64;
    let weight: f64 = members.iter().map(|e| e.intensity.abs()).sum();
    let mz = if members.len() == 1 {
        members[0].mz
    } else if weight > 0.0 {
        members.iter().map(|e| e.mz * e.intensity.abs()).sum::<f64>() / weight
    } else {
        members.iter().map(|e| e.mz).sum::<f64>() / n
    };
    let intensity = members.iter().map(|e| e.intensity).sum::<f64>() / n;

    let accepted: Vec<f64> = members
        .iter()
        .filter_map(|e| match e.score {
            SeedScore::Accepted(s) => Some(s),
            _ => None,
        })
        .collect();
    let score = if !accepted.is_empty() {
        SeedScore::Accepted(accepted.iter().sum::<f64>() / accepted.len() as f64)
    } else if members.iter().any(|e| e.score.is_borderline()) {
        SeedScore::Borderline
    } else {
        SeedScore::Helper
    };

    Some(BoxElement {
        mz,
        score,
        intensity,
        ..first
    })
}

impl<'a> SeedClusterer<'a> {
    pub fn new(model: &'a WaveletModel, check_ppm: bool) -> Self {
        Self {
            model,
            scorer: PeakScorer::new(),
            check_ppm,
        }
    }

    /// Reduce the temporary boxes of one scan to representatives, then commit the
    /// real representatives that are local maxima along the m/z axis.
    pub fn cluster<S: SignalAccess>(&self, signal: &S, mut seeds: BoxMap) -> Vec<BoxElement> {
        let mut final_box: Vec<BoxElement> = seeds.drain().filter_map(|b| summarize(&b)).collect();
        final_box.sort_by(|a, b| a.mz.total_cmp(&b.mz));

        let n = final_box.len();
        let mut committed = Vec::new();
        if n < 2 {
            return committed;
        }

        let mut bwd_diffs = vec![0.0; n];
        for i in 1..n {
            let dmz = final_box[i].mz - final_box[i - 1].mz;
            if dmz > 0.0 {
                bwd_diffs[i] = (final_box[i].intensity - final_box[i - 1].intensity) / dmz;
            }
        }

        let mut i = 0;
        while i < n - 1 {
            while i < n - 2 && !final_box[i].score.is_real() {
                i += 1;
            }
            if final_box[i].score.is_real() && bwd_diffs[i] > 0.0 && bwd_diffs[i + 1] < 0.0 {
                if let Some(element) = self.check_position_for_plausibility(signal, &final_box[i]) {
                    committed.push(element);
                }
            }
            i += 1;
        }
        committed
    }

    /// Walk backwards through the untransformed signal from `start` while it keeps rising,
    /// giving up if the walk strays more than a quarter isotope spacing from `seed_mz`.
    fn walk_to_local_max<S: SignalAccess>(
        &self,
        signal: &S,
        start: usize,
        seed_mz: f64,
        charge: u32,
    ) -> Option<usize> {
        let limit = QUARTER_NEUTRON_MASS / charge as f64;
        let mut hc = start;
        let mut h = start;
        while h > 0 {
            h -= 1;
            let here = signal.ref_intensity(h);
            let best = signal.ref_intensity(hc);
            if here > best || (here == best && best == 0.0) {
                hc = h;
            } else {
                break;
            }
            if seed_mz - signal.mz(h) > limit {
                return None;
            }
        }
        (signal.ref_intensity(hc) > 0.0).then_some(hc)
    }

    /// Re-anchor a clustered seed on the untransformed signal and re-score it there.
    ///
    /// Returns the element to commit, or [`None`] if the position does not hold up.
    pub fn check_position_for_plausibility<S: SignalAccess>(
        &self,
        signal: &S,
        candidate: &BoxElement,
    ) -> Option<BoxElement> {
        let n = signal.len();
        let charge = candidate.charge;
        let z = charge as f64;
        let seed_mz = candidate.mz;
        let peak_cutoff = self.model.num_peak_cutoff_at(seed_mz, charge);

        let index = signal.mz_begin(seed_mz);
        if index == 0 || index >= n {
            return None;
        }

        let (real_mz, real_intensity) = if self.check_ppm {
            let hc = self.walk_to_local_max(signal, index, seed_mz, charge)?;
            if !check_ppm_theo_model(signal.mz(hc), charge) {
                return None;
            }
            (signal.mz(hc), signal.ref_intensity(hc))
        } else if signal.ref_intensity(index) > 0.0 {
            (seed_mz, signal.ref_intensity(index))
        } else {
            let hc = self.walk_to_local_max(signal, index, seed_mz, charge)?;
            (signal.mz(hc), signal.ref_intensity(hc))
        };

        let PatternScore::Accepted(score) =
            self.scorer
                .score(signal, real_mz, charge, peak_cutoff, 0.0)
        else {
            return None;
        };

        let mz_cutoff = self.model.mz_peak_cutoff(real_mz, charge);
        let mz_begin = signal.mz_begin(real_mz - QUARTER_NEUTRON_MASS / z);
        let mz_end = signal.mz_begin(real_mz + mz_cutoff / z).min(n - 1);

        let score = if candidate.score.is_borderline() {
            SeedScore::Borderline
        } else {
            SeedScore::Accepted(score)
        };

        Some(BoxElement {
            mz: real_mz,
            charge,
            score,
            intensity: candidate.intensity,
            ref_intensity: real_intensity,
            time: candidate.time,
            scan_index: candidate.scan_index,
            mz_begin,
            mz_end,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::spectrum::{ReferenceSpectrum, TransformedSpectrum};
    use crate::wavelet::{NEUTRON_MASS, PROTON_MASS};
    use std::f64::consts::PI;

    fn element(mz: f64, score: SeedScore, intensity: f64) -> BoxElement {
        BoxElement::new(mz, 2, score, intensity, 0.0, 3.0, 1, 0, 0)
    }

    #[test]
    fn test_summarize() {
        let mut b = IsotopeBox::new(element(500.0, SeedScore::Accepted(10.0), 30.0));
        b.push(element(500.1, SeedScore::Helper, 1000.0));
        b.push(element(500.02, SeedScore::Accepted(20.0), 10.0));
        let rep = summarize(&b).unwrap();
        assert!((rep.mz - 500.005).abs() < 1e-9, "{}", rep.mz);
        assert_eq!(rep.score, SeedScore::Accepted(15.0));
        assert_eq!(rep.intensity, 20.0);

        let mut b = IsotopeBox::new(element(500.0, SeedScore::Helper, 10.0));
        b.push(element(500.1, SeedScore::Helper, 30.0));
        let rep = summarize(&b).unwrap();
        assert_eq!(rep.score, SeedScore::Helper);
        assert!((rep.mz - 500.075).abs() < 1e-9);

        let mut b = IsotopeBox::new(element(500.0, SeedScore::Borderline, 10.0));
        b.push(element(500.1, SeedScore::Helper, 30.0));
        let rep = summarize(&b).unwrap();
        assert_eq!(rep.score, SeedScore::Borderline);
        assert_eq!(rep.mz, 500.0);
    }

    /// An ideal transform of a charge 2 pattern at `center`, over a single nonzero
    /// untransformed point at `center`
    fn template_signal(center: f64) -> (ReferenceSpectrum, Vec<f64>) {
        let mzs: Vec<f64> = (-800i32..=800)
            .map(|k| center + k as f64 * 0.005)
            .collect();
        let trans = mzs
            .iter()
            .map(|mz| (2.0 * PI * (mz - center) * 2.0 / NEUTRON_MASS).cos())
            .collect();
        let refs = mzs
            .iter()
            .map(|mz| if *mz == center { 100.0 } else { 0.0 })
            .collect();
        (ReferenceSpectrum::new(mzs, refs, 3.0, 1), trans)
    }

    #[test]
    fn test_plausibility() {
        let model = WaveletModel::new(300.0, 1500.0, 3);
        let (scan, trans) = template_signal(500.0);
        let signal = TransformedSpectrum::new(&scan, trans, 2);
        let clusterer = SeedClusterer::new(&model, false);

        let candidate = element(500.0, SeedScore::Accepted(1.0), 5.0);
        let committed = clusterer
            .check_position_for_plausibility(&signal, &candidate)
            .unwrap();
        assert_eq!(committed.mz, 500.0);
        assert_eq!(committed.ref_intensity, 100.0);
        assert_eq!(committed.intensity, 5.0);
        assert!(committed.score.is_real() && !committed.score.is_borderline());
        assert!(signal.mz(committed.mz_begin) >= 500.0 - QUARTER_NEUTRON_MASS / 2.0 - 1e-9);
        assert!(committed.mz_end > committed.mz_begin);

        // A borderline cluster stays borderline even though it re-scores fine
        let candidate = element(500.0, SeedScore::Borderline, 5.0);
        let committed = clusterer
            .check_position_for_plausibility(&signal, &candidate)
            .unwrap();
        assert_eq!(committed.score, SeedScore::Borderline);

        // The first point of the scan cannot anchor a pattern
        let candidate = element(496.0, SeedScore::Accepted(1.0), 5.0);
        assert!(clusterer
            .check_position_for_plausibility(&signal, &candidate)
            .is_none());
    }

    #[test]
    fn test_walk_back() {
        let model = WaveletModel::new(300.0, 1500.0, 3);
        let scan = ReferenceSpectrum::new(
            vec![499.9, 499.95, 500.0, 500.05],
            vec![10.0, 50.0, 0.0, 0.0],
            0.0,
            0,
        );
        let signal = TransformedSpectrum::new(&scan, vec![0.0; 4], 2);
        let clusterer = SeedClusterer::new(&model, false);
        assert_eq!(clusterer.walk_to_local_max(&signal, 2, 500.0, 2), Some(1));
        // Rising past a quarter isotope spacing gives up
        let scan = ReferenceSpectrum::new(
            vec![499.7, 499.8, 499.9, 500.0],
            vec![90.0, 50.0, 20.0, 0.0],
            0.0,
            0,
        );
        let signal = TransformedSpectrum::new(&scan, vec![0.0; 4], 2);
        assert_eq!(clusterer.walk_to_local_max(&signal, 3, 500.0, 2), None);
    }

    #[test]
    fn test_cluster_commits_local_maximum() {
        let model = WaveletModel::new(300.0, 1500.0, 3);
        let (scan, trans) = template_signal(500.0);
        let signal = TransformedSpectrum::new(&scan, trans, 2);
        let clusterer = SeedClusterer::new(&model, false);

        let mut seeds = BoxMap::new(0.167);
        seeds.push(element(500.0, SeedScore::Accepted(11.0), 1.0));
        seeds.push(element(499.498, SeedScore::Helper, 0.4));
        seeds.push(element(500.502, SeedScore::Helper, 0.6));
        let committed = clusterer.cluster(&signal, seeds);
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].mz, 500.0);

        // Without a rising flank there is no local maximum to commit
        let mut seeds = BoxMap::new(0.167);
        seeds.push(element(500.0, SeedScore::Accepted(11.0), 1.0));
        seeds.push(element(500.502, SeedScore::Helper, 0.6));
        assert!(clusterer.cluster(&signal, seeds).is_empty());
    }

    #[test]
    fn test_plausibility_mass_rule() {
        let model = WaveletModel::new(300.0, 1500.0, 3);
        let clusterer = SeedClusterer::new(&model, true);

        // The monoisotopic mass sits on the averagine mass grid
        let center = (1000.507 + PROTON_MASS) / 2.0;
        let (scan, trans) = template_signal(center);
        let signal = TransformedSpectrum::new(&scan, trans, 2);
        let candidate = element(center, SeedScore::Accepted(1.0), 5.0);
        let committed = clusterer
            .check_position_for_plausibility(&signal, &candidate)
            .unwrap();
        assert_eq!(committed.mz, center);
        assert_eq!(committed.ref_intensity, 100.0);
        assert!(committed.score.is_real() && !committed.score.is_borderline());
    }

    #[test]
    fn test_plausibility_mass_rule_rejects_shifted() {
        let model = WaveletModel::new(300.0, 1500.0, 3);

        // 0.3 Da off the averagine mass grid at charge 2
        let center = (1000.507 + PROTON_MASS) / 2.0 + 0.15;
        let (scan, trans) = template_signal(center);
        let signal = TransformedSpectrum::new(&scan, trans, 2);
        let candidate = element(center, SeedScore::Accepted(1.0), 5.0);

        assert!(SeedClusterer::new(&model, true)
            .check_position_for_plausibility(&signal, &candidate)
            .is_none());

        let committed = SeedClusterer::new(&model, false)
            .check_position_for_plausibility(&signal, &candidate)
            .unwrap();
        assert_eq!(committed.mz, center);
    }
}
