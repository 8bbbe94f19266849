use std::ffi::OsString;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::thread;
use std::time::Instant;

use clap::{parser::ValueSource, ArgMatches, CommandFactory, FromArgMatches, Parser};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    value::{Dict, Value},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use mzdata::io::{
    infer_from_stream, mgf::MGFReader, mzml::MzMLReader, MassSpectrometryFormat,
    PreBufferedStream, StreamingSpectrumIterator,
};
use mzdata::prelude::*;
use mzdata::spectrum::MultiLayerSpectrum;
use mzpeaks::coordinate::Span1D;

use isowave::params::{IntensityType, WaveletParams};
use isowave::spectrum::ReferenceSpectrum;
use isowave_map::{Feature, FeatureFinder, FeatureFinderError, FeatureFinderParams};

use crate::time_range::TimeRange;

#[derive(Debug, Error)]
pub enum IsowaverError {
    #[error("An IO error occurred: {0}")]
    IOError(
        #[source]
        #[from]
        io::Error,
    ),
    #[error("Failed to write features: {0}")]
    JSONError(#[from] serde_json::Error),
    #[error(transparent)]
    FeatureFinderError(#[from] FeatureFinderError),
    #[error("Failed to read the configuration: {0}")]
    ConfigError(#[from] figment::Error),
    #[error("Failed to start the thread pool: {0}")]
    ThreadPoolError(#[from] rayon::ThreadPoolBuildError),
    #[error("The input file format from STDIN was either unknown or not supported ({0:?})")]
    FormatUnknownOrNotSupportedErrorStdIn(MassSpectrometryFormat),
}

fn positive_float(s: &str) -> Result<f64, String> {
    let value = s.parse::<f64>().map_err(|e| e.to_string())?;
    if value > 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(format!("`{s}` is not a positive number"))
    }
}

/// Isotope wavelet feature detection on LC-MS runs.
///
/// Read the MS1 spectra of a file or stream, follow isotope patterns across retention
/// time, and write the features found as JSON.
#[derive(Parser, Debug, Deserialize, Serialize)]
#[command(author, version)]
pub struct Isowaver {
    /// The path to read the input spectra from, or if '-' is passed, read from STDIN
    #[arg()]
    pub input_file: String,

    /// The path to write the features to, or if '-' is passed, write to STDOUT
    #[arg(short = 'o', long = "output-file", default_value = "-")]
    pub output_file: PathBuf,

    /// The path to write a log file to, in addition to STDERR
    #[arg(short = 'l', long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// A TOML configuration file to read additional parameters from.
    ///
    /// Configurations are also read from `isowaver.toml` in the working directory.
    /// Environment variables prefixed with `ISOWAVER_` will be read too.
    #[arg(long = "config-file")]
    pub config_file: Option<PathBuf>,

    /// The number of threads to use, passing a value < 1 to use all available threads
    #[arg(short = 't', long = "threads", default_value_t = -1)]
    pub threads: i32,

    /// The time range to process, denoted (start?)-(stop?)
    #[arg(
        short='r',
        long="time-range",
        value_parser=TimeRange::from_str,
        value_name="BEGIN-END",
        long_help=r#"The time range to process, denoted (start?)-(stop?)

If a start is not specified, processing begins from the start of the run.
If a stop is not specified, processing stops at the end of the run.
"#
    )]
    pub time_range: Option<TimeRange>,

    /// The lowest m/z the isotope model is built for
    #[arg(long = "min-mz", default_value_t = 0.0)]
    pub min_mz: f64,

    /// The highest m/z the isotope model is built for
    #[arg(long = "max-mz", default_value_t = 10000.0)]
    pub max_mz: f64,

    /// The highest charge state to search for
    #[arg(short = 'z', long = "max-charge", default_value_t = 3)]
    pub max_charge: u32,

    /// Treat the input as irregularly sampled high resolution data
    #[arg(long = "hr-data")]
    pub hr_data: bool,

    /// How many standard deviations above the mean transform value a pattern must
    /// score. Negative values disable the threshold.
    #[arg(
        short = 'a',
        long = "amplitude-cutoff",
        default_value_t = -1.0,
        allow_hyphen_values = true
    )]
    pub amplitude_cutoff: f64,

    /// Require the monoisotopic mass of each pattern to sit near an averagine mass
    #[arg(long = "check-ppm")]
    pub check_ppm: bool,

    /// The spacing to zero fill sparse centroid lists to before the transform
    #[arg(long = "sampling-interval", default_value_t = 0.04, value_parser = positive_float)]
    pub sampling_interval: f64,

    /// Do not zero fill the input spectra
    #[arg(long = "no-zero-fill")]
    pub no_zero_fill: bool,

    /// How many scans a pattern may be missing from before it is finished
    #[arg(short = 'i', long = "rt-interleave", default_value_t = 1)]
    pub rt_interleave: usize,

    /// How many scans a pattern must be seen in to be reported
    #[arg(short = 'v', long = "rt-votes-cutoff", default_value_t = 3)]
    pub rt_votes_cutoff: usize,

    /// How to compute the intensity of each feature: ref, corrected or transform-sum
    #[arg(
        short = 'I',
        long = "intensity-type",
        default_value = "ref",
        value_parser = IntensityType::from_str
    )]
    pub intensity_type: IntensityType,

    /// Transform the charge states of each spectrum in parallel
    #[arg(long = "parallel-charges")]
    pub parallel_charges: bool,

    /// Split the run into this many blocks of spectra processed in parallel.
    /// Values < 2 process the run in a single pass.
    #[arg(short = 'c', long = "chunks", default_value_t = 1)]
    pub chunks: usize,
}

impl Isowaver {
    fn create_threadpool(&self) -> Result<rayon::ThreadPool, IsowaverError> {
        let num_threads = if self.threads > 0 {
            self.threads as usize
        } else {
            thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
        };
        debug!("Using {} cores", num_threads);
        Ok(rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()?)
    }

    /// Parse the process's command line and layer the configuration sources under it
    pub fn parse_configured() -> Result<Self, figment::Error> {
        Self::parse_configured_from(std::env::args_os())
    }

    /// Parse `itr` as a command line, exiting on malformed arguments like [`Parser::parse_from`],
    /// then layer the configuration sources under it.
    ///
    /// From lowest to highest precedence: argument defaults, the `--config-file` if given,
    /// `isowaver.toml`, `ISOWAVER_` environment variables, and finally the arguments that
    /// were written out on the command line.
    pub fn parse_configured_from<I, T>(itr: I) -> Result<Self, figment::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Self::command().get_matches_from(itr);
        let args = Self::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());
        let explicit = explicit_arguments(&matches);
        args.configure(&explicit)
    }

    fn configure(self, explicit: &[String]) -> Result<Self, figment::Error> {
        let given: Dict = Value::serialize(&self)?
            .into_dict()
            .unwrap_or_default()
            .into_iter()
            .filter(|(key, _)| explicit.contains(key))
            .collect();

        let mut config = Figment::new().merge(Serialized::defaults(&self));
        if let Some(path) = self.config_file.as_ref() {
            config = config.merge(Toml::file_exact(path));
        }
        config
            .merge(Toml::file("isowaver.toml"))
            .merge(Env::prefixed("ISOWAVER_"))
            .merge(Serialized::defaults(given))
            .extract()
    }

    pub fn finder_params(&self) -> FeatureFinderParams {
        let wavelet = WaveletParams::new(
            self.min_mz,
            self.max_mz,
            self.max_charge,
            self.hr_data,
            self.amplitude_cutoff,
            self.check_ppm,
            (!self.no_zero_fill).then_some(self.sampling_interval),
        );
        FeatureFinderParams::new(
            wavelet,
            self.rt_interleave,
            self.rt_votes_cutoff,
            self.intensity_type,
            self.parallel_charges,
        )
    }

    pub fn main(&self) -> Result<(), IsowaverError> {
        info!(
            "isowaver v{}",
            option_env!("CARGO_PKG_VERSION").unwrap_or("unknown")
        );
        info!("Input: {}", self.input_file);
        info!("Output: {}", self.output_file.display());
        self.create_threadpool()?.install(|| self.reader_then())
    }

    fn reader_then(&self) -> Result<(), IsowaverError> {
        if self.input_file == "-" {
            let mut buffered =
                PreBufferedStream::new_with_buffer_size(io::stdin(), 2usize.pow(20))?;
            let (ms_format, compressed) = infer_from_stream(&mut buffered)?;
            debug!("Detected {ms_format:?} from STDIN (compressed? {compressed})");
            match ms_format {
                MassSpectrometryFormat::MGF if !compressed => {
                    self.run(StreamingSpectrumIterator::new(MGFReader::new(buffered)))
                }
                MassSpectrometryFormat::MzML if !compressed => {
                    self.run(StreamingSpectrumIterator::new(MzMLReader::new(buffered)))
                }
                _ => Err(IsowaverError::FormatUnknownOrNotSupportedErrorStdIn(
                    ms_format,
                )),
            }
        } else {
            let reader = mzdata::MZReader::open_path(&self.input_file)?;
            self.run(reader)
        }
    }

    /// Collect the MS1 spectra inside the time range, in retention time order
    fn read_scans<I: Iterator<Item = MultiLayerSpectrum>>(&self, reader: I) -> Vec<ReferenceSpectrum> {
        let time_range = self.time_range.unwrap_or_default();
        let mut scans: Vec<ReferenceSpectrum> = reader
            .filter(|s| s.ms_level() == 1 && time_range.contains(&s.start_time()))
            .filter_map(|s| to_reference(&s))
            .collect();
        scans.sort_by(|a, b| a.time.total_cmp(&b.time));
        scans
    }

    fn run<I: Iterator<Item = MultiLayerSpectrum>>(&self, reader: I) -> Result<(), IsowaverError> {
        let start = Instant::now();
        let scans = self.read_scans(reader);
        let n_scans = scans.len();
        info!("MS1 Spectra: {n_scans}");

        let finder = FeatureFinder::new(self.finder_params())?;
        let features = if self.chunks > 1 {
            finder.find_features_chunked(scans, self.chunks)?
        } else {
            finder.find_features(scans)?
        };
        info!("Features: {}", features.len());

        self.write_features(&features)?;
        info!("Total Elapsed Time: {:0.3?}", start.elapsed());
        Ok(())
    }

    fn write_features(&self, features: &[Feature]) -> Result<(), IsowaverError> {
        let mut writer: Box<dyn Write> = if self.output_file.as_os_str() == "-" {
            Box::new(BufWriter::new(io::stdout()))
        } else {
            Box::new(BufWriter::new(fs::File::create(&self.output_file)?))
        };
        serde_json::to_writer_pretty(&mut writer, features)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }
}

/// The ids of the arguments whose values came from the command line itself
fn explicit_arguments(matches: &ArgMatches) -> Vec<String> {
    matches
        .ids()
        .filter(|id| matches.value_source(id.as_str()) == Some(ValueSource::CommandLine))
        .map(|id| id.as_str().to_string())
        .collect()
}

/// Prefer the centroid list of a spectrum, falling back to its raw signal arrays
fn to_reference(spectrum: &MultiLayerSpectrum) -> Option<ReferenceSpectrum> {
    let time = spectrum.start_time();
    if let Some(peaks) = spectrum.peaks.as_ref() {
        return Some(ReferenceSpectrum::from_peaks(peaks.as_slice(), time, 0));
    }
    let arrays = spectrum.arrays.as_ref()?;
    let mzs = arrays.mzs().ok()?;
    let intensities = arrays.intensities().ok()?;
    Some(ReferenceSpectrum::from_arrays(&mzs, &intensities, time, 0))
}
