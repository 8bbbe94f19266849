mod driver;
mod time_range;

pub use driver::{Isowaver, IsowaverError};
pub use time_range::{TimeRange, TimeRangeParseError};
