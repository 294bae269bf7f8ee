//! The one-shot pipeline: segment, aggregate in parallel, join, merge, format.

use std::fs::File;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use memmap::{Mmap, MmapOptions};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info, info_span};

use crate::aggregate::{aggregate, merge, LocalAggregate, StationMap};
use crate::config::{AccessMode, Config, MalformedPolicy};
use crate::error::{Error, Result};
use crate::format::format_summary;
use crate::parse::{BufferedRecords, Records};
use crate::segment::{segment_with_min, FileProbe, Segment};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub file_size: u64,
    pub segments: usize,
    pub workers: usize,
    pub records: u64,
    pub skipped: u64,
    pub keys: usize,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub struct Aggregation {
    pub stations: StationMap,
    pub stats: RunStats,
}

/// Where workers read their segments from. Both are read-only for the whole run.
enum Input {
    Mapped(Mmap),
    File(PathBuf),
}

impl Input {
    fn process(
        &self,
        segment: Segment,
        buffer_size: usize,
        policy: MalformedPolicy,
    ) -> Result<LocalAggregate> {
        let started = Instant::now();
        let local = match self {
            Input::Mapped(map) => {
                let window = &map[segment.offset as usize..segment.end() as usize];
                aggregate(&mut Records::new(window, segment.offset), policy)?
            }
            Input::File(path) => {
                let mut records = BufferedRecords::open(path, segment, buffer_size)?;
                aggregate(&mut records, policy)?
            }
        };
        debug!(
            offset = segment.offset,
            length = segment.length,
            records = local.records,
            keys = local.stations.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "segment aggregated"
        );
        Ok(local)
    }
}

/// Runs `work` for every segment on `pool` and waits at most `timeout` for all of them.
///
/// The pool runs on a helper thread so the wait can be bounded. Results come back in
/// segment order, or not at all if any worker failed.
fn join_workers<F>(
    pool: ThreadPool,
    segments: Vec<Segment>,
    timeout: Duration,
    work: F,
) -> Result<Vec<LocalAggregate>>
where
    F: Fn(Segment) -> Result<LocalAggregate> + Send + Sync + 'static,
{
    let (tx, rx) = crossbeam_channel::bounded(1);
    thread::Builder::new()
        .name("brc-join".into())
        .spawn(move || {
            let result: Result<Vec<LocalAggregate>> =
                pool.install(|| segments.par_iter().map(|&segment| work(segment)).collect());
            // the receiver is gone only if the run already timed out
            let _ = tx.send(result);
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(Error::JoinTimeout(timeout)),
        Err(RecvTimeoutError::Disconnected) => Err(Error::WorkerPanicked),
    }
}

/// Reads the whole file and returns the merged per-station statistics.
///
/// Any worker failure fails the run; results of the other workers are dropped.
pub fn aggregate_file(config: &Config) -> Result<Aggregation> {
    config.validate()?;
    let _span = info_span!("aggregate", path = %config.path.display()).entered();
    let started = Instant::now();

    let file = File::open(&config.path).map_err(|source| Error::Open {
        path: config.path.clone(),
        source,
    })?;
    let file_size = file.metadata()?.len();

    let input = match config.access {
        // an empty file cannot be mapped
        AccessMode::Mmap if file_size > 0 => {
            Input::Mapped(unsafe { MmapOptions::new().map(&file)? })
        }
        _ => Input::File(config.path.clone()),
    };
    let target = config.target_segments();
    let segments = match &input {
        Input::Mapped(map) => {
            segment_with_min(file_size, target, config.min_segment_len, &mut &map[..])?
        }
        Input::File(_) => segment_with_min(
            file_size,
            target,
            config.min_segment_len,
            &mut FileProbe::new(&file),
        )?,
    };
    info!(
        file_size,
        segments = segments.len(),
        workers = config.workers,
        access = ?config.access,
        "starting workers"
    );

    let pool = ThreadPoolBuilder::new()
        .num_threads(config.workers)
        .thread_name(|i| format!("brc-worker-{i}"))
        .build()?;
    let buffer_size = config.buffer_size;
    let policy = config.malformed;
    let locals = join_workers(
        pool,
        segments.clone(),
        config.join_timeout,
        move |segment| input.process(segment, buffer_size, policy),
    )?;

    let records: u64 = locals.iter().map(|l| l.records).sum();
    let skipped: u64 = locals.iter().map(|l| l.skipped).sum();
    let stations = merge(locals.into_iter().map(|l| l.stations));
    let stats = RunStats {
        file_size,
        segments: segments.len(),
        workers: config.workers,
        records,
        skipped,
        keys: stations.len(),
        elapsed: started.elapsed(),
    };
    info!(
        records = stats.records,
        skipped = stats.skipped,
        keys = stats.keys,
        elapsed_ms = stats.elapsed.as_millis() as u64,
        "aggregation finished"
    );
    Ok(Aggregation { stations, stats })
}

/// Runs the pipeline and renders the summary line.
pub fn run(config: &Config) -> Result<(String, RunStats)> {
    let Aggregation { stations, stats } = aggregate_file(config)?;
    Ok((format_summary(stations)?, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{new_station_map, update};
    use crate::station::StationRef;

    fn pool(threads: usize) -> ThreadPool {
        ThreadPoolBuilder::new().num_threads(threads).build().unwrap()
    }

    fn segments(n: u64) -> Vec<Segment> {
        (0..n)
            .map(|i| Segment {
                offset: i * 10,
                length: 10,
            })
            .collect()
    }

    fn local_for(segment: Segment) -> LocalAggregate {
        let mut stations = new_station_map();
        update(&mut stations, StationRef::new(b"a"), segment.offset as i16);
        LocalAggregate {
            stations,
            records: 1,
            skipped: 0,
        }
    }

    #[test]
    fn results_come_back_in_segment_order() {
        let locals = join_workers(pool(3), segments(8), Duration::from_secs(30), |segment| {
            Ok(local_for(segment))
        })
        .unwrap();
        assert_eq!(locals.len(), 8);
        for (i, local) in locals.iter().enumerate() {
            let aggregate = local.stations[&StationRef::new(b"a")];
            assert_eq!(aggregate.sum, i as i64 * 10);
        }
    }

    #[test]
    fn slow_worker_times_out() {
        let timeout = Duration::from_millis(50);
        let err = join_workers(pool(2), segments(4), timeout, |segment| {
            if segment.offset == 20 {
                thread::sleep(Duration::from_secs(2));
            }
            Ok(local_for(segment))
        })
        .unwrap_err();
        assert!(matches!(err, Error::JoinTimeout(t) if t == timeout), "{err:?}");
    }

    #[test]
    fn panicking_worker_fails_the_join() {
        let err = join_workers(pool(2), segments(4), Duration::from_secs(30), |segment| {
            if segment.offset == 10 {
                panic!("worker blew up");
            }
            Ok(local_for(segment))
        })
        .unwrap_err();
        assert!(matches!(err, Error::WorkerPanicked), "{err:?}");
    }

    #[test]
    fn one_failed_worker_discards_all_results() {
        let result = join_workers(pool(4), segments(16), Duration::from_secs(30), |segment| {
            if segment.offset == 70 {
                return Err(Error::MissingDelimiter {
                    offset: segment.offset,
                });
            }
            Ok(local_for(segment))
        });
        assert!(matches!(
            result,
            Err(Error::MissingDelimiter { offset: 70 })
        ));
    }
}
