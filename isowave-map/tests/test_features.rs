use std::io;

use mzpeaks::CentroidPeak;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use isowave::boxes::{BoxElement, SeedScore};
use isowave::spectrum::ReferenceSpectrum;
use isowave::wavelet::{WaveletModel, NEUTRON_MASS, PROTON_MASS};
use isowave::{WaveletEngine, WaveletParams};
use isowave_map::{BoxTracker, Feature, FeatureAssembler, FeatureFinder, IntensityType};

fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .compact()
                .with_writer(io::stderr)
                .with_filter(
                    EnvFilter::builder()
                        .with_default_directive(tracing::Level::INFO.into())
                        .from_env_lossy(),
                ),
        )
        .try_init();
}

fn envelope(mono_mz: f64, charge: u32) -> Vec<CentroidPeak> {
    let spacing = NEUTRON_MASS / charge as f64;
    [100.0, 60.0, 20.0]
        .into_iter()
        .enumerate()
        .map(|(i, intensity)| CentroidPeak::new(mono_mz + i as f64 * spacing, intensity, i as u32))
        .collect()
}

fn scans_with(patterns: &[(f64, std::ops::RangeInclusive<usize>)], n: usize) -> Vec<ReferenceSpectrum> {
    (0..n)
        .map(|i| {
            let mut peaks = Vec::new();
            for (mz, present) in patterns {
                if present.contains(&i) {
                    peaks.extend(envelope(*mz, 2));
                }
            }
            ReferenceSpectrum::from_peaks(&peaks, 10.0 + i as f64, i)
        })
        .collect()
}

#[test]
fn test_three_scan_envelope() -> io::Result<()> {
    init_logging();
    let mut finder = FeatureFinder::builder()
        .rt_votes_cutoff(3)
        .rt_interleave(0)
        .amplitude_cutoff(-1.0)
        .build()
        .unwrap();
    for time in [10.0, 11.0, 12.0] {
        finder.process_scan(&envelope(500.0, 2), time).unwrap();
    }
    let features = finder.finish();
    assert_eq!(features.len(), 1, "{features:?}");
    let feature = &features[0];
    assert_eq!(feature.charge, 2);
    assert!((feature.mz - 500.0).abs() < 0.01, "{}", feature.mz);
    assert!((feature.time - 11.0).abs() < 0.5, "{}", feature.time);
    assert!(feature.intensity > 0.0);
    assert!(feature.score > 0.0);
    assert_eq!(feature.start_time(), Some(10.0));
    assert_eq!(feature.end_time(), Some(12.0));
    Ok(())
}

#[test]
fn test_intensity_types_agree_on_position() {
    init_logging();
    let mut found = Vec::new();
    for intensity_type in [
        IntensityType::Ref,
        IntensityType::Corrected,
        IntensityType::TransformSum,
    ] {
        let mut finder = FeatureFinder::builder()
            .rt_interleave(0)
            .intensity_type(intensity_type)
            .build()
            .unwrap();
        for time in [10.0, 11.0, 12.0] {
            finder.process_scan(&envelope(500.0, 2), time).unwrap();
        }
        let features = finder.finish();
        assert_eq!(features.len(), 1);
        found.push(features[0].clone());
    }
    // Ref sums the centroids themselves, three scans of 100 + 60 + 20
    assert_eq!(found[0].intensity, 540.0);
    assert!(found[1].intensity > found[2].intensity);
    for f in &found[1..] {
        assert_eq!(f.mz, found[0].mz);
        assert_eq!(f.time, found[0].time);
        assert_eq!(f.hull, found[0].hull);
    }
}

#[test]
fn test_lifecycle() {
    init_logging();
    let rt_interleave = 1;
    let rt_votes_cutoff = 3;

    // Seen in one scan too few, then gone long enough to be retired
    let mut finder = FeatureFinder::builder()
        .rt_interleave(rt_interleave)
        .rt_votes_cutoff(rt_votes_cutoff)
        .build()
        .unwrap();
    let mut time = 10.0;
    for _ in 0..rt_votes_cutoff - 1 {
        finder.process_scan(&envelope(500.0, 2), time).unwrap();
        time += 1.0;
    }
    for _ in 0..rt_interleave + 2 {
        finder.process_scan::<CentroidPeak>(&[], time).unwrap();
        time += 1.0;
    }
    assert_eq!(finder.tracker().open_boxes().len(), 0);
    assert!(finder.finish().is_empty());

    // Seen often enough
    let mut finder = FeatureFinder::builder()
        .rt_interleave(rt_interleave)
        .rt_votes_cutoff(rt_votes_cutoff)
        .build()
        .unwrap();
    for i in 0..rt_votes_cutoff {
        finder.process_scan(&envelope(500.0, 2), 10.0 + i as f64).unwrap();
    }
    assert_eq!(finder.finish().len(), 1);
}

#[test]
fn test_gap_within_interleave() {
    init_logging();
    let mut finder = FeatureFinder::builder()
        .rt_interleave(1)
        .rt_votes_cutoff(3)
        .build()
        .unwrap();
    for (i, present) in [true, true, false, true].into_iter().enumerate() {
        let peaks = if present { envelope(500.0, 2) } else { Vec::new() };
        finder.process_scan(&peaks, 10.0 + i as f64).unwrap();
    }
    let features = finder.finish();
    assert_eq!(features.len(), 1);
    // Averaged over the scans it was seen in
    assert!((features[0].time - 34.0 / 3.0).abs() < 1e-9);
}

fn element(mz: f64, charge: u32, intensity: f64, scan_index: usize, score: SeedScore) -> BoxElement {
    BoxElement::new(
        mz,
        charge,
        score,
        intensity,
        intensity,
        10.0 + scan_index as f64,
        scan_index,
        0,
        0,
    )
}

#[test]
fn test_charge_vote_by_intensity() {
    let model = WaveletModel::new(300.0, 2000.0, 3);
    let mut tracker = BoxTracker::new(3, 0, 3);
    for scan in 0..5 {
        if scan < 3 {
            tracker.insert(element(500.0, 2, 90.0, scan, SeedScore::Accepted(20.0)));
        }
        tracker.insert(element(500.02, 3, 30.0, scan, SeedScore::Accepted(20.0)));
        tracker.update_box_states(scan, scan == 4);
    }
    let closed = tracker.drain_closed();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].len(), 8);

    let assembler = FeatureAssembler::new(&model, IntensityType::TransformSum, 3);
    let feature = assembler.assemble(&closed[0], &[], 5).unwrap();
    assert_eq!(feature.charge, 2);
    assert_eq!(feature.mz, 500.0);
    assert_eq!(feature.intensity, 270.0);
}

#[test]
fn test_borderline_entry_invalidates_box() {
    let model = WaveletModel::new(300.0, 2000.0, 3);
    let mut tracker = BoxTracker::new(3, 0, 3);
    for scan in 0..4 {
        let score = if scan == 2 {
            SeedScore::Borderline
        } else {
            SeedScore::Accepted(20.0)
        };
        tracker.insert(element(500.0, 2, 90.0, scan, score));
        tracker.update_box_states(scan, scan == 3);
    }
    let closed = tracker.drain_closed();
    assert_eq!(closed.len(), 1);
    let assembler = FeatureAssembler::new(&model, IntensityType::TransformSum, 3);
    assert!(assembler.assemble(&closed[0], &[], 4).is_none());
}

fn profile_envelope(step: f64) -> ReferenceSpectrum {
    let n = (5.0 / step).round() as usize;
    let mzs: Vec<f64> = (0..n).map(|i| 498.0 + i as f64 * step).collect();
    let intensities = mzs
        .iter()
        .map(|mz| {
            [(500.0, 100.0), (500.50165, 60.0), (501.0033, 20.0)]
                .iter()
                .map(|(center, height)| {
                    let d: f64 = (mz - center) / 0.01;
                    height * (-0.5 * d * d).exp()
                })
                .sum()
        })
        .collect();
    ReferenceSpectrum::new(mzs, intensities, 10.0, 0)
}

#[test]
fn test_resolution_modes_agree() {
    init_logging();
    let scan = profile_envelope(0.005);
    let mut positions = Vec::new();
    for hr_data in [false, true] {
        let params = WaveletParams {
            hr_data,
            sampling_interval: None,
            ..Default::default()
        };
        let engine = WaveletEngine::new(params).unwrap();
        let scan = engine.prepare_scan(scan.clone());
        let seeds = engine.process_charge(&scan, 2);
        let best = seeds
            .iter()
            .min_by(|a, b| (a.mz - 500.0).abs().total_cmp(&(b.mz - 500.0).abs()))
            .copied();
        let best = best.unwrap_or_else(|| panic!("No seed found with hr_data={hr_data}"));
        assert!((best.mz - 500.0).abs() < 0.01, "{hr_data}: {}", best.mz);
        positions.push(best.mz);
    }
    let ppm = (positions[0] - positions[1]).abs() / positions[0] * 1e6;
    assert!(ppm < 20.0, "{positions:?}");
}

#[test]
fn test_chunked_matches_sequential() {
    init_logging();
    let scans = scans_with(&[(500.0, 1..=4), (650.0, 6..=10)], 12);

    let sequential = FeatureFinder::builder()
        .rt_interleave(0)
        .build()
        .unwrap()
        .find_features(scans.clone())
        .unwrap();
    assert!(sequential
        .iter()
        .any(|f| (f.mz - 500.0).abs() < 0.01 && f.charge == 2));

    for n_chunks in [1, 2, 3, 5] {
        let chunked = FeatureFinder::builder()
            .rt_interleave(0)
            .build()
            .unwrap()
            .find_features_chunked(scans.clone(), n_chunks)
            .unwrap();
        assert_eq!(chunked, sequential, "{n_chunks} chunks");
    }
}

#[test]
fn test_parallel_charges_match() {
    init_logging();
    let scans = scans_with(&[(500.0, 0..=3)], 5);
    let serial = FeatureFinder::builder()
        .build()
        .unwrap()
        .find_features(scans.clone())
        .unwrap();
    let parallel = FeatureFinder::builder()
        .parallel_charges(true)
        .build()
        .unwrap()
        .find_features(scans)
        .unwrap();
    assert_eq!(serial.len(), 1);
    assert_eq!(serial, parallel);
}

fn run_with_mass_rule(mono_mz: f64, check_ppm: bool) -> Vec<Feature> {
    let mut finder = FeatureFinder::builder()
        .max_charge(2)
        .rt_interleave(0)
        .check_ppm(check_ppm)
        .build()
        .unwrap();
    for time in [10.0, 11.0, 12.0] {
        finder.process_scan(&envelope(mono_mz, 2), time).unwrap();
    }
    finder.finish()
}

#[test]
fn test_mass_rule_filters_features() {
    init_logging();
    let plausible = (1000.507 + PROTON_MASS) / 2.0;
    let features = run_with_mass_rule(plausible, true);
    assert_eq!(features.len(), 1, "{features:?}");
    assert_eq!(features[0].charge, 2);
    assert!((features[0].mz - plausible).abs() < 0.01, "{}", features[0].mz);

    let shifted = plausible + 0.15;
    assert!(run_with_mass_rule(shifted, true).is_empty());
    let features = run_with_mass_rule(shifted, false);
    assert_eq!(features.len(), 1, "{features:?}");
}
