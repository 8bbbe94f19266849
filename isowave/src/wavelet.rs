/*!
The isotope wavelet and the averagine-derived quantities it is parameterized by.

The mother wavelet at charge $`z`$ for a monoisotopic mass $`m`$ is

```math
\psi(t) = \sin\left(\frac{2\pi t}{N}\right) \exp\left(-\lambda + t\ln\lambda - \ln\Gamma(t + 1)\right)
```

where $`N`$ is the mass of a neutron and $`\lambda = \lambda(m)`$ is the mean of the Poisson
approximation of the isotopic distribution of an averagine peptide of mass $`m`$.
*/
use std::f64::consts::PI;

use statrs::function::gamma::ln_gamma;

/// The mass difference between isotopic peaks used by the wavelet
pub const NEUTRON_MASS: f64 = 1.00335;
pub const HALF_NEUTRON_MASS: f64 = 0.501675;
pub const QUARTER_NEUTRON_MASS: f64 = 0.2508375;
pub const PROTON_MASS: f64 = 1.00727646688;

/// The angular frequency of the wavelet's sine term, one full period per neutron
pub const WAVELET_PERIODICITY: f64 = 2.0 * PI / NEUTRON_MASS;

const LAMBDA_INTERCEPT: f64 = 0.120539;
const LAMBDA_SLOPE: f64 = 0.000509838;

/// How many standard deviations of the Poisson envelope past its mean to keep
const PEAK_CUTOFF_SPREAD: f64 = 2.0;
const MIN_PEAK_CUTOFF: usize = 2;

const LN_GAMMA_TABLE_STEP: f64 = 1e-3;

/// The mean of the Poisson isotope envelope for a peptide of mass `mass`
#[inline]
pub fn averagine_lambda(mass: f64) -> f64 {
    LAMBDA_INTERCEPT + LAMBDA_SLOPE * mass
}

/// The modified Bessel function of the first kind of order zero, evaluated
/// by its power series.
pub fn bessel_i0(x: f64) -> f64 {
    let q = x * x / 4.0;
    let mut term = 1.0;
    let mut acc = 1.0;
    let mut k = 1.0;
    while k < 500.0 {
        term *= q / (k * k);
        acc += term;
        if term < acc * f64::EPSILON {
            break;
        }
        k += 1.0;
    }
    acc
}

/// The probability mass at zero of a Skellam distribution whose two components
/// both have mean `lambda`. Summing the wavelet response over an isotope envelope
/// scales the envelope's intensity by this factor.
pub fn skellam_normalization(lambda: f64) -> f64 {
    (-2.0 * lambda).exp() * bessel_i0(2.0 * lambda)
}

/// A precomputed isotope wavelet for a fixed m/z range and maximum charge.
///
/// All queries are pure functions of their arguments, so a model can be shared
/// freely between threads.
#[derive(Debug, Clone)]
pub struct WaveletModel {
    min_mz: f64,
    max_mz: f64,
    max_charge: u32,
    ln_gamma_table: Vec<f64>,
}

impl WaveletModel {
    pub fn new(min_mz: f64, max_mz: f64, max_charge: u32) -> Self {
        let mut this = Self {
            min_mz,
            max_mz,
            max_charge,
            ln_gamma_table: Vec::new(),
        };
        this.populate_table();
        this
    }

    fn populate_table(&mut self) {
        // The kernel is evaluated at `1 + t` for `t` in `(0, cutoff]` Daltons
        let upper = self.num_peak_cutoff(self.max_mz * self.max_charge as f64) as f64 + 2.0;
        let n = (upper / LN_GAMMA_TABLE_STEP).ceil() as usize + 1;
        self.ln_gamma_table = (0..n)
            .map(|i| ln_gamma(1.0 + i as f64 * LN_GAMMA_TABLE_STEP))
            .collect();
    }

    pub fn min_mz(&self) -> f64 {
        self.min_mz
    }

    pub fn max_mz(&self) -> f64 {
        self.max_mz
    }

    pub fn max_charge(&self) -> u32 {
        self.max_charge
    }

    /// Whether `mz` falls inside the m/z range the lookup tables were built for
    pub fn is_modelled(&self, mz: f64) -> bool {
        mz >= self.min_mz && mz <= self.max_mz
    }

    /// The number of isotopic peaks worth examining for a peptide of mass `mass`
    pub fn num_peak_cutoff(&self, mass: f64) -> usize {
        let lambda = averagine_lambda(mass);
        let n = (lambda + PEAK_CUTOFF_SPREAD * lambda.sqrt()).ceil() as usize + 1;
        n.max(MIN_PEAK_CUTOFF)
    }

    pub fn num_peak_cutoff_at(&self, mz: f64, charge: u32) -> usize {
        self.num_peak_cutoff(mz * charge as f64)
    }

    /// The width of the isotopic envelope starting at monoisotopic `mz` with
    /// charge `charge`, in Daltons. Divide by the charge to get an m/z span.
    pub fn mz_peak_cutoff(&self, mz: f64, charge: u32) -> f64 {
        self.num_peak_cutoff_at(mz, charge) as f64
    }

    /// `ln Γ(x)`, linearly interpolated from the lookup table where `x` falls inside it
    pub fn ln_gamma(&self, x: f64) -> f64 {
        let offset = (x - 1.0) / LN_GAMMA_TABLE_STEP;
        if offset < 0.0 {
            return ln_gamma(x);
        }
        let i = offset as usize;
        if i + 1 >= self.ln_gamma_table.len() {
            return ln_gamma(x);
        }
        let frac = offset - i as f64;
        let lo = self.ln_gamma_table[i];
        let hi = self.ln_gamma_table[i + 1];
        lo + (hi - lo) * frac
    }

    /// The wavelet evaluated at the dimensionless position `tz1 = t + 1`, where `t`
    /// is the distance from the wavelet's origin in Daltons.
    #[inline]
    pub fn value(&self, lambda: f64, tz1: f64) -> f64 {
        let t = tz1 - 1.0;
        (t * WAVELET_PERIODICITY).sin() * (-lambda + t * lambda.ln() - self.ln_gamma(tz1)).exp()
    }

    /// The wavelet for the envelope of an ion of monoisotopic `mz` and `charge`, evaluated
    /// at `c_diff` m/z units past the wavelet's origin.
    pub fn value_at(&self, mz: f64, charge: u32, c_diff: f64) -> f64 {
        let z = charge as f64;
        self.value(averagine_lambda(mz * z), c_diff * z + 1.0)
    }
}
