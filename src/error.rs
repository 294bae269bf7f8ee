//! Error types for the aggregation pipeline.
//!
//! Every failure is fatal for the run: nothing is retried and no partial summary is
//! produced. Parse errors carry the absolute byte offset of the offending line.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("missing ';' delimiter in line at byte {offset}")]
    MissingDelimiter { offset: u64 },

    #[error("empty station name in line at byte {offset}")]
    EmptyName { offset: u64 },

    #[error("invalid value {token:?} in line at byte {offset}")]
    InvalidValue { offset: u64, token: String },

    #[error("segment at byte {offset} ended early, expected {expected} more bytes")]
    Truncated { offset: u64, expected: u64 },

    #[error("station name is not valid UTF-8: {0:?}")]
    InvalidUtf8(String),

    #[error("workers did not finish within {0:?}")]
    JoinTimeout(Duration),

    #[error("a worker panicked")]
    WorkerPanicked,

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// True for errors describing an out-of-contract line rather than an I/O fault.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Error::MissingDelimiter { .. } | Error::EmptyName { .. } | Error::InvalidValue { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
