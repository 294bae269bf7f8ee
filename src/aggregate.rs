//! Per-station running statistics, built locally by each worker and merged afterwards.

use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;
use tracing::warn;

use crate::config::MalformedPolicy;
use crate::error::Result;
use crate::parse::{RecordSource, Tenths};
use crate::station::{StationName, StationRef};

/// Initial capacity of a local map; real inputs have a few hundred to ten thousand keys.
const EXPECTED_STATIONS: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Aggregate {
    pub min: Tenths,
    pub max: Tenths,
    /// Exact sum of all observed values, in tenths.
    pub sum: i64,
    pub count: u64,
}

impl Aggregate {
    pub fn new(value: Tenths) -> Self {
        Self {
            min: value,
            max: value,
            sum: value as i64,
            count: 1,
        }
    }

    #[inline]
    pub fn add(&mut self, value: Tenths) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value as i64;
        self.count += 1;
    }

    /// Order of arguments does not matter, neither does grouping.
    pub fn combine(self, other: Aggregate) -> Aggregate {
        Aggregate {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
            sum: self.sum + other.sum,
            count: self.count + other.count,
        }
    }
}

pub type StationMap = HashMap<StationName, Aggregate, FxBuildHasher>;

pub fn new_station_map() -> StationMap {
    StationMap::with_capacity_and_hasher(EXPECTED_STATIONS, FxBuildHasher)
}

/// Records one observation. Only allocates the first time a station is seen.
#[inline]
pub fn update(map: &mut StationMap, name: StationRef<'_>, value: Tenths) {
    match map.get_mut(&name) {
        Some(aggregate) => aggregate.add(value),
        None => {
            map.insert(name.into(), Aggregate::new(value));
        }
    }
}

/// Folds `other` into `into`, combining on collision.
pub fn merge_into(into: &mut StationMap, other: StationMap) {
    for (name, aggregate) in other {
        into.entry(name)
            .and_modify(|existing| *existing = existing.combine(aggregate))
            .or_insert(aggregate);
    }
}

pub fn merge(maps: impl IntoIterator<Item = StationMap>) -> StationMap {
    let mut maps = maps.into_iter();
    let mut global = maps.next().unwrap_or_else(new_station_map);
    for map in maps {
        merge_into(&mut global, map);
    }
    global
}

/// What one worker produced for its segment.
#[derive(Debug)]
pub struct LocalAggregate {
    pub stations: StationMap,
    pub records: u64,
    pub skipped: u64,
}

/// Drains `source` into a fresh map. Malformed lines abort unless `policy` is `Skip`.
pub fn aggregate<S: RecordSource + ?Sized>(
    source: &mut S,
    policy: MalformedPolicy,
) -> Result<LocalAggregate> {
    let mut stations = new_station_map();
    let mut records = 0;
    let mut skipped = 0;
    while let Some(record) = source.next_record() {
        match record {
            Ok(record) => {
                update(&mut stations, record.name, record.value);
                records += 1;
            }
            Err(e) if policy == MalformedPolicy::Skip && e.is_malformed() => {
                warn!(error = %e, "skipping malformed line");
                skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(LocalAggregate {
        stations,
        records,
        skipped,
    })
}
