//! Presentation transforms for rendlog.
//!
//! Everything here is a pure function of a window snapshot and display
//! options: time labels under a fixed UTC offset, row validation, typed
//! render series and the stats summary.

pub mod series;
pub mod stats;
pub mod timezone;
pub mod validation;

pub use series::{
    build_series, BandBreach, OrderflowPoint, RenderOptions, RenderPoint, RenderSeries,
    RendlogPoint, Signal,
};
pub use stats::StatsSummary;
pub use timezone::{format_time, TimeFormat, UtcOffset};
pub use validation::{validate_row, RowDefect, DEFAULT_MAGNITUDE_BOUND};
