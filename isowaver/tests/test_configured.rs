use figment::Jail;

use isowave::params::IntensityType;
use isowaver::Isowaver;

fn input_path() -> String {
    format!("{}/tests/data/envelope.mzML", env!("CARGO_MANIFEST_DIR"))
}

#[test_log::test]
fn test_configuration_layers() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "isowaver.toml",
            r#"
            max_charge = 2
            rt_votes_cutoff = 4
            intensity_type = "transform-sum"
            "#,
        )?;
        jail.set_env("ISOWAVER_INTENSITY_TYPE", "corrected");

        let input = input_path();
        let args = Isowaver::parse_configured_from(["isowaver", input.as_str(), "-z", "5"])?;
        // An argument written on the command line overrides every configuration source
        assert_eq!(args.max_charge, 5);
        // The working directory configuration overrides argument defaults
        assert_eq!(args.rt_votes_cutoff, 4);
        // The environment overrides the configuration files
        assert_eq!(args.intensity_type, IntensityType::Corrected);
        // Untouched arguments keep their defaults
        assert_eq!(args.rt_interleave, 1);
        assert_eq!(args.finder_params().wavelet.sampling_interval, Some(0.04));
        Ok(())
    });
}

#[test_log::test]
fn test_explicit_arguments_override_environment() {
    Jail::expect_with(|jail| {
        jail.create_file("isowaver.toml", "rt_interleave = 3\n")?;
        jail.set_env("ISOWAVER_INTENSITY_TYPE", "corrected");
        jail.set_env("ISOWAVER_RT_VOTES_CUTOFF", "6");

        let input = input_path();
        let args = Isowaver::parse_configured_from([
            "isowaver",
            input.as_str(),
            "-I",
            "transform-sum",
            "--check-ppm",
        ])?;
        assert_eq!(args.intensity_type, IntensityType::TransformSum);
        assert!(args.check_ppm);
        assert_eq!(args.rt_votes_cutoff, 6);
        assert_eq!(args.rt_interleave, 3);

        // A flag left off the command line does not shadow the files beneath it
        jail.create_file("isowaver.toml", "check_ppm = true\n")?;
        let args = Isowaver::parse_configured_from(["isowaver", input.as_str()])?;
        assert!(args.check_ppm);
        assert_eq!(args.intensity_type, IntensityType::Corrected);
        Ok(())
    });
}

#[test_log::test]
fn test_configured_run() {
    Jail::expect_with(|jail| {
        jail.create_file("run.toml", "rt_votes_cutoff = 5\nmax_charge = 2\n")?;
        let output = jail.directory().join("features.json");

        let input = input_path();
        let mut args = Isowaver::parse_configured_from([
            "isowaver",
            input.as_str(),
            "--config-file",
            "run.toml",
        ])?;
        assert_eq!(args.rt_votes_cutoff, 5);
        args.output_file = output.clone();
        args.main().map_err(|e| e.to_string())?;

        let content = std::fs::read_to_string(&output).map_err(|e| e.to_string())?;
        let features: Vec<serde_json::Value> =
            serde_json::from_str(&content).map_err(|e| e.to_string())?;
        assert_eq!(features.len(), 1);
        assert_eq!(features[0]["charge"], 2);
        Ok(())
    });
}
