#![deny(elided_lifetimes_in_paths)]
//! Per-station min/mean/max over a large `name;value` file.
//!
//! The file is cut into line-aligned segments, every segment is aggregated by a worker
//! into its own map, and the maps are merged once all workers have finished.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod format;
pub mod parse;
pub mod run;
pub mod segment;
pub mod station;

pub use aggregate::{Aggregate, StationMap};
pub use config::{AccessMode, Config, MalformedPolicy};
pub use error::{Error, Result};
pub use format::{format_summary, ResultRow};
pub use run::{aggregate_file, run, Aggregation, RunStats};
pub use segment::Segment;
pub use station::StationName;
