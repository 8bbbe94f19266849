//! Isotopic pattern evaluation on the wavelet transform
use crate::spectrum::SignalAccess;
use crate::wavelet::{HALF_NEUTRON_MASS, NEUTRON_MASS};

pub type ScoreType = f64;

/// The outcome of matching the transform against the alternating peak/valley
/// template at a candidate monoisotopic position.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PatternScore {
    Rejected,
    /// The pattern fits but does not stand out from the noise threshold. Such
    /// seeds still shape the boxes they land in, but a feature built from them
    /// is never reported.
    Borderline,
    Accepted(ScoreType),
}

impl PatternScore {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected)
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

/// Mean and standard deviation of the non-negative part of the transform, used to
/// turn a relative amplitude cutoff into an absolute threshold.
///
/// The mean is taken over the full length of the transform.
pub fn noise_threshold<S: SignalAccess>(signal: &S, ampl_cutoff: f64) -> f64 {
    if ampl_cutoff < 0.0 {
        return 0.0;
    }
    let n = signal.len();
    if n < 2 {
        return 0.0;
    }
    let mut acc = 0.0;
    for i in 0..n {
        let v = signal.trans_intensity(i);
        if v >= 0.0 {
            acc += v;
        }
    }
    let mean = acc / n as f64;
    let mut dev = 0.0;
    for i in 0..n {
        let v = signal.trans_intensity(i);
        if v >= 0.0 {
            dev += (v - mean).powi(2);
        }
    }
    let sd = (dev / (n - 1) as f64).sqrt();
    ampl_cutoff * sd + mean
}

/// Scores the transform as an alternating sum over the isotope peaks and the
/// valleys between them.
#[derive(Debug, Default, Clone, Copy)]
pub struct PeakScorer {}

impl PeakScorer {
    pub fn new() -> Self {
        Self {}
    }

    /// The m/z positions sampled for a pattern of `peak_cutoff` peaks, half an
    /// isotope spacing apart and centered on `seed_mz`.
    ///
    /// Odd entries (counting from one) are valleys, even entries are peaks.
    pub fn sample_positions(&self, seed_mz: f64, charge: u32, peak_cutoff: usize) -> Vec<f64> {
        let z = charge as f64;
        let peak_cutoff = peak_cutoff.max(2);
        let end = 4 * (peak_cutoff - 1) - 1;
        let span = (peak_cutoff - 1) as f64 * NEUTRON_MASS;
        (0..end)
            .map(|i| seed_mz - (span - (i + 1) as f64 * HALF_NEUTRON_MASS) / z)
            .collect()
    }

    pub fn score<S: SignalAccess>(
        &self,
        signal: &S,
        seed_mz: f64,
        charge: u32,
        peak_cutoff: usize,
        ampl_cutoff: f64,
    ) -> PatternScore {
        let positions = self.sample_positions(seed_mz, charge, peak_cutoff);
        let end = positions.len();
        let midpoint = end.div_ceil(2);
        let n = signal.len();

        let mut score = 0.0;
        let mut l_score = 0.0;
        let mut mid_val = 0.0;
        for (v, position) in (1..).zip(positions.iter().copied()) {
            let right = signal.mz_begin(position);
            if right == 0 || right + 1 >= n {
                continue;
            }
            let Some(value) = signal.interpolate_trans(right, position) else {
                continue;
            };
            if v == midpoint {
                l_score = score;
                mid_val = value;
            }
            if v % 2 == 1 {
                score -= value;
            } else {
                score += value;
            }
        }

        if score - mid_val <= 0.0 {
            return PatternScore::Rejected;
        }
        if score - mid_val <= ampl_cutoff {
            return PatternScore::Borderline;
        }
        if l_score <= 0.0 || score - l_score - mid_val <= 0.0 {
            return PatternScore::Rejected;
        }
        PatternScore::Accepted(score)
    }
}
