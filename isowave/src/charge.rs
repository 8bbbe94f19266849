//! Locate monoisotopic seeds in the wavelet transform of a scan at one charge state
use crate::boxes::{BoxElement, BoxMap, SeedScore};
use crate::cluster::SeedClusterer;
use crate::scorer::{noise_threshold, PeakScorer};
use crate::spectrum::{SignalAccess, TransformedSpectrum};
use crate::transform::ScanContext;
use crate::wavelet::{WaveletModel, HALF_NEUTRON_MASS, NEUTRON_MASS, QUARTER_NEUTRON_MASS};

#[derive(Debug, Clone, Copy)]
pub struct ChargeIdentifier<'a> {
    pub model: &'a WaveletModel,
    pub scorer: PeakScorer,
    pub hr_data: bool,
    pub ampl_cutoff: f64,
    pub check_ppm: bool,
}

impl<'a> ChargeIdentifier<'a> {
    pub fn new(model: &'a WaveletModel, hr_data: bool, ampl_cutoff: f64, check_ppm: bool) -> Self {
        Self {
            model,
            scorer: PeakScorer::new(),
            hr_data,
            ampl_cutoff,
            check_ppm,
        }
    }

    /// The transform with everything but its local maxima zeroed.
    ///
    /// For low resolution data, maxima that exceed the untransformed signal at the same
    /// position are amplification artifacts of the integration and are zeroed too.
    pub fn differenced(&self, signal: &TransformedSpectrum<'_>) -> Vec<f64> {
        let n = signal.len();
        let mut diffed = signal.transformed.clone();
        if n < 3 {
            diffed.iter_mut().for_each(|v| *v = 0.0);
            return diffed;
        }
        diffed[0] = 0.0;
        diffed[n - 1] = 0.0;

        for i in 0..n - 2 {
            let share = signal.trans_intensity(i + 1);
            let share_pos = signal.mz(i + 1);
            let bwd = (share - signal.trans_intensity(i)) / (share_pos - signal.mz(i));
            let fwd = (signal.trans_intensity(i + 2) - share) / (signal.mz(i + 2) - share_pos);
            let is_max = bwd >= 0.0 && fwd <= 0.0;
            if !is_max || (!self.hr_data && share > signal.ref_intensity(i + 1)) {
                diffed[i + 1] = 0.0;
            }
        }
        diffed
    }

    /// Score every local maximum of the transform, strongest first, and collect the
    /// scored seeds and their flanking helper points into temporary boxes.
    pub fn find_seeds(&self, signal: &TransformedSpectrum<'_>, context: &ScanContext) -> BoxMap {
        let charge = context.charge;
        let z = charge as f64;
        let mut seeds = BoxMap::new(HALF_NEUTRON_MASS / self.model.max_charge() as f64);
        let n = signal.len();
        if n < 3 {
            return seeds;
        }

        let diffed = self.differenced(signal);
        let threshold = noise_threshold(signal, self.ampl_cutoff);

        let mut order: Vec<usize> = (0..n).filter(|i| diffed[*i] > 0.0).collect();
        order.sort_by(|a, b| diffed[*b].total_cmp(&diffed[*a]).then(a.cmp(b)));

        let mut processed = vec![false; n];
        for i in order {
            if processed[i] {
                continue;
            }
            let seed_mz = signal.mz(i);
            let mz_cutoff = self.model.mz_peak_cutoff(seed_mz, charge);

            // Claim the region even if the seed fails to score, otherwise weaker maxima
            // on its flanks would be tried again
            let mz_begin = signal.mz_begin(seed_mz - QUARTER_NEUTRON_MASS / z).min(i);
            let mz_end = signal.mz_end(seed_mz + mz_cutoff / z).min(n - 1);
            processed[mz_begin..=mz_end].iter_mut().for_each(|p| *p = true);

            let score = self.scorer.score(
                signal,
                seed_mz,
                charge,
                self.model.num_peak_cutoff_at(seed_mz, charge),
                threshold,
            );
            let Ok(score) = SeedScore::try_from(score) else {
                continue;
            };

            let seed = BoxElement::new(
                seed_mz,
                charge,
                score,
                diffed[i],
                signal.ref_intensity(i),
                signal.time(),
                signal.scan_index(),
                mz_begin,
                mz_end,
            );
            seeds.push(seed);

            for help_mz in [seed_mz - NEUTRON_MASS / z, seed_mz + NEUTRON_MASS / z] {
                let j = signal.mz_begin(help_mz);
                if j == 0 || j >= n {
                    continue;
                }
                if (signal.mz(j) - seed_mz).abs() <= 0.5 * NEUTRON_MASS / z {
                    continue;
                }
                if let Some(intensity) = signal.interpolate_trans(j, help_mz) {
                    seeds.push(BoxElement {
                        mz: signal.mz(j),
                        score: SeedScore::Helper,
                        intensity,
                        ref_intensity: signal.ref_intensity(j),
                        ..seed
                    });
                }
            }
        }
        seeds
    }

    /// Find the seeds of one scan at one charge and reduce them to the observations
    /// that should be committed to the tracker.
    pub fn identify_charge(
        &self,
        signal: &TransformedSpectrum<'_>,
        context: &ScanContext,
    ) -> Vec<BoxElement> {
        let seeds = self.find_seeds(signal, context);
        if seeds.is_empty() {
            return Vec::new();
        }
        SeedClusterer::new(self.model, self.check_ppm).cluster(signal, seeds)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::spectrum::ReferenceSpectrum;
    use crate::transform::SpectrumConvolver;

    fn centroids() -> ReferenceSpectrum {
        ReferenceSpectrum::new(
            vec![500.0, 500.50165, 501.0033],
            vec![100.0, 60.0, 20.0],
            10.0,
            0,
        )
    }

    #[test]
    fn test_differenced() {
        let model = WaveletModel::new(300.0, 1500.0, 3);
        let scan = ReferenceSpectrum::new(
            vec![1.0, 2.0, 3.0, 4.0, 5.0],
            vec![10.0, 10.0, 1.0, 10.0, 10.0],
            0.0,
            0,
        );
        let signal = TransformedSpectrum::new(&scan, vec![0.0, 5.0, 3.0, 4.0, 1.0], 1);
        let lr = ChargeIdentifier::new(&model, false, -1.0, false).differenced(&signal);
        assert_eq!(lr, vec![0.0, 5.0, 0.0, 4.0, 0.0]);

        // Amplified past the raw signal
        let signal = TransformedSpectrum::new(&scan, vec![0.0, 5.0, 3.0, 40.0, 1.0], 1);
        let lr = ChargeIdentifier::new(&model, false, -1.0, false).differenced(&signal);
        assert_eq!(lr, vec![0.0, 5.0, 0.0, 0.0, 0.0]);
        let hr = ChargeIdentifier::new(&model, true, -1.0, false).differenced(&signal);
        assert_eq!(hr, vec![0.0, 5.0, 0.0, 40.0, 0.0]);
    }

    #[test_log::test]
    fn test_identify_charge_on_filled_centroids() {
        let model = WaveletModel::new(300.0, 1500.0, 3);
        let raw = centroids();
        let scan = raw.fill_gaps(0.04, model.mz_peak_cutoff(500.0, 1), model.mz_peak_cutoff(501.0, 1));
        let conv = SpectrumConvolver::new(&model, false);
        let ident = ChargeIdentifier::new(&model, false, -1.0, false);

        let ctx = conv.initialize_scan(&scan, 2);
        let signal = conv.transform(&scan, &ctx);
        let seeds = ident.identify_charge(&signal, &ctx);
        assert_eq!(seeds.len(), 1, "{seeds:?}");
        let seed = seeds[0];
        assert_eq!(seed.mz, 500.0);
        assert_eq!(seed.charge, 2);
        assert_eq!(seed.ref_intensity, 100.0);
        assert!(seed.score.value() > 0.0);

        for charge in [1, 3] {
            let ctx = conv.initialize_scan(&scan, charge);
            let signal = conv.transform(&scan, &ctx);
            let seeds = ident.identify_charge(&signal, &ctx);
            assert!(seeds.is_empty(), "charge {charge}: {seeds:?}");
        }
    }

    #[test]
    fn test_tiny_scan() {
        let model = WaveletModel::new(300.0, 1500.0, 3);
        let scan = ReferenceSpectrum::new(vec![500.0, 500.5], vec![10.0, 5.0], 0.0, 0);
        let conv = SpectrumConvolver::new(&model, false);
        let ctx = conv.initialize_scan(&scan, 1);
        let signal = conv.transform(&scan, &ctx);
        let ident = ChargeIdentifier::new(&model, false, -1.0, false);
        assert!(ident.find_seeds(&signal, &ctx).is_empty());
        assert!(ident.identify_charge(&signal, &ctx).is_empty());
    }
}
