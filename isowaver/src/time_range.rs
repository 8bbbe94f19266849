use std::{num::ParseFloatError, ops::Range, str::FromStr};

use mzpeaks::coordinate::Span1D;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A window of acquisition times, in minutes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }
}

impl Span1D for TimeRange {
    type DimType = f64;

    fn start(&self) -> Self::DimType {
        self.start
    }

    fn end(&self) -> Self::DimType {
        self.end
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self {
            start: 0.0,
            end: f64::INFINITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimeRangeParseError {
    #[error("Failed to parse time range start {0}")]
    MalformedStart(ParseFloatError),
    #[error("Failed to parse time range end {0}")]
    MalformedEnd(ParseFloatError),
}

fn parse_bound(
    token: Option<&str>,
    missing: f64,
    on_error: fn(ParseFloatError) -> TimeRangeParseError,
) -> Result<f64, TimeRangeParseError> {
    match token.map(str::trim) {
        None | Some("") => Ok(missing),
        Some(s) => s.parse().map_err(on_error),
    }
}

impl FromStr for TimeRange {
    type Err = TimeRangeParseError;

    /// Parse `start-end`, `start:end` or `start end`, where either side may be left
    /// empty to leave that side of the run unbounded.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let sep = [' ', ':', '-']
            .into_iter()
            .find(|c| s.contains(*c))
            .unwrap_or(' ');
        let mut tokens = s.splitn(2, sep);
        let start = parse_bound(tokens.next(), 0.0, TimeRangeParseError::MalformedStart)?;
        let end = parse_bound(
            tokens.next(),
            f64::INFINITY,
            TimeRangeParseError::MalformedEnd,
        )?;
        Ok(TimeRange { start, end })
    }
}

impl From<Range<f64>> for TimeRange {
    fn from(value: Range<f64>) -> Self {
        Self::new(value.start, value.end)
    }
}

impl From<(f64, f64)> for TimeRange {
    fn from(value: (f64, f64)) -> Self {
        Self::new(value.0, value.1)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_time_fromstr() -> Result<(), TimeRangeParseError> {
        let t: TimeRange = "52.0-".parse()?;
        assert_eq!(t.start(), 52.0);
        assert_eq!(t.end(), f64::INFINITY);

        let t: TimeRange = "-52.0".parse()?;
        assert_eq!(t.start(), 0.0);
        assert_eq!(t.end(), 52.0);

        let t: TimeRange = "32:52.0".parse()?;
        assert_eq!(t, TimeRange::new(32.0, 52.0));

        let t: TimeRange = "-".parse()?;
        assert_eq!(t, TimeRange::default());

        let t: TimeRange = "12.5".parse()?;
        assert_eq!(t, TimeRange::new(12.5, f64::INFINITY));
        assert!(t.contains(&20.0));
        assert!(!t.contains(&12.0));
        Ok(())
    }

    #[test]
    fn test_time_fromstr_malformed() {
        assert!(matches!(
            "a-".parse::<TimeRange>(),
            Err(TimeRangeParseError::MalformedStart(_))
        ));
        assert!(matches!(
            "-b".parse::<TimeRange>(),
            Err(TimeRangeParseError::MalformedEnd(_))
        ));
        // Both ends are wrong, the start is reported first
        assert!(matches!(
            "a-b".parse::<TimeRange>(),
            Err(TimeRangeParseError::MalformedStart(_))
        ));
    }
}
