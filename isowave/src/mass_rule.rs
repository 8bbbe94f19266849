//! The peptide mass rule: an averagine estimate of where the fractional part of a
//! peptide's mass should fall given its nominal mass.
use crate::wavelet::PROTON_MASS;

pub const PEPTIDE_MASS_RULE_FACTOR: f64 = 0.000507;
pub const PEPTIDE_MASS_RULE_BOUND: f64 = 1.0 / PEPTIDE_MASS_RULE_FACTOR;
/// Largest tolerated disagreement between an observed mass and the rule's prediction
pub const PEPTIDE_MASS_RULE_THEO_PPM_BOUND: f64 = 200.0;

/// Predict the mass of a peptide whose nominal mass is that of `mass`, keeping the
/// prediction within half a Dalton of the observed fractional part.
pub fn peptide_mass_rule(mass: f64) -> f64 {
    let correction_fac = mass / PEPTIDE_MASS_RULE_BOUND;
    let old_frac = mass - mass.trunc();
    let mut new_mass = mass.trunc() * (1.0 + PEPTIDE_MASS_RULE_FACTOR) - correction_fac.trunc();
    let new_frac = new_mass - new_mass.trunc();

    if new_frac - old_frac > 0.5 {
        new_mass -= 1.0;
    }
    if new_frac - old_frac < -0.5 {
        new_mass += 1.0;
    }
    new_mass
}

/// The difference between two masses in parts per million of their mean
pub fn ppm_difference(a: f64, b: f64) -> f64 {
    (a - b).abs() / (0.5 * (a + b)) * 1e6
}

/// Whether an ion at `mz` with `charge` has a singly protonated mass that the mass
/// rule considers plausible
pub fn check_ppm_theo_model(mz: f64, charge: u32) -> bool {
    let z = charge as f64;
    let mass = mz * z - PROTON_MASS * (z - 1.0);
    let ppm = ppm_difference(mass, peptide_mass_rule(mass));
    ppm < PEPTIDE_MASS_RULE_THEO_PPM_BOUND
}
