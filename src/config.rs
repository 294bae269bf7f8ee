use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::segment::MIN_SEGMENT_LEN;

pub const DEFAULT_SEGMENTS_PER_WORKER: usize = 8;
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;
/// Smallest read buffer that still holds a short line plus its terminator.
pub const MIN_BUFFER_SIZE: usize = 16;
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// How workers get at their segment of the input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AccessMode {
    /// One read-only mapping, each worker parses its own window of it.
    #[default]
    Mmap,
    /// Each worker opens its own handle and reads fixed-size buffers.
    Buffered,
}

/// What to do with a line that does not match `<key>;<value>`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MalformedPolicy {
    #[default]
    Fail,
    Skip,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub path: PathBuf,
    pub workers: usize,
    pub segments_per_worker: usize,
    /// Lower bound on segment size, keeps small files from being over-split.
    pub min_segment_len: u64,
    pub access: AccessMode,
    pub buffer_size: usize,
    pub join_timeout: Duration,
    pub malformed: MalformedPolicy,
}

impl Config {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn target_segments(&self) -> usize {
        self.workers.saturating_mul(self.segments_per_worker).max(1)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::InvalidConfig("workers must be at least 1".into()));
        }
        if self.segments_per_worker == 0 {
            return Err(Error::InvalidConfig(
                "segments per worker must be at least 1".into(),
            ));
        }
        if self.min_segment_len == 0 {
            return Err(Error::InvalidConfig(
                "minimum segment length must be at least 1".into(),
            ));
        }
        if self.buffer_size < MIN_BUFFER_SIZE {
            return Err(Error::InvalidConfig(format!(
                "buffer size {} is below the minimum of {MIN_BUFFER_SIZE}",
                self.buffer_size
            )));
        }
        if self.join_timeout.is_zero() {
            return Err(Error::InvalidConfig("join timeout must be non-zero".into()));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::from("measurements.txt"),
            workers: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            segments_per_worker: DEFAULT_SEGMENTS_PER_WORKER,
            min_segment_len: MIN_SEGMENT_LEN,
            access: AccessMode::default(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            malformed: MalformedPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::new("data.txt");
        assert_eq!(config.path, PathBuf::from("data.txt"));
        assert!(config.workers >= 1);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_zero_workers_and_tiny_buffers() {
        let mut config = Config::new("x");
        config.workers = 0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let mut config = Config::new("x");
        config.buffer_size = 4;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let mut config = Config::new("x");
        config.join_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn target_segments_scales_with_workers() {
        let mut config = Config::new("x");
        config.workers = 3;
        config.segments_per_worker = 4;
        assert_eq!(config.target_segments(), 12);
    }
}
