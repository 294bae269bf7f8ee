//! Rendering the merged statistics as `{name=min/mean/max, ...}`.

use std::fmt::{self, Write};

use crate::aggregate::StationMap;
use crate::error::{Error, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultRow {
    pub name: String,
    pub min: i64,
    /// Already rounded to tenths.
    pub mean: i64,
    pub max: i64,
}

/// `sum / count` in tenths, rounded half away from zero.
///
/// Plain integer division truncates toward zero, so `-5 / 2` would give `-2` where the
/// expected result is `-3`.
pub fn mean_tenths(sum: i64, count: u64) -> i64 {
    debug_assert!(count > 0);
    let count = count as i128;
    let magnitude = (2 * (sum as i128).abs() + count) / (2 * count);
    let magnitude = magnitude as i64;
    if sum < 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Fixed-point tenths with exactly one fractional digit. Zero is never signed.
pub struct Decimal(pub i64);

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{}", abs / 10, abs % 10)
    }
}

impl fmt::Display for ResultRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={}/{}/{}",
            self.name,
            Decimal(self.min),
            Decimal(self.mean),
            Decimal(self.max)
        )
    }
}

/// One row per station, sorted by the raw bytes of the name.
pub fn rows(stations: StationMap) -> Result<Vec<ResultRow>> {
    let mut entries: Vec<_> = stations.into_iter().collect();
    entries.sort_unstable_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
    entries
        .into_iter()
        .map(|(name, aggregate)| {
            let bytes = name.as_bytes();
            let name = simdutf8::basic::from_utf8(bytes)
                .map_err(|_| Error::InvalidUtf8(String::from_utf8_lossy(bytes).into_owned()))?;
            Ok(ResultRow {
                name: name.to_owned(),
                min: aggregate.min as i64,
                mean: mean_tenths(aggregate.sum, aggregate.count),
                max: aggregate.max as i64,
            })
        })
        .collect()
}

pub fn render(rows: &[ResultRow]) -> String {
    let mut out = String::with_capacity(rows.len() * 32 + 2);
    out.push('{');
    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write!(out, "{row}").expect("writing to a String cannot fail");
    }
    out.push('}');
    out
}

pub fn format_summary(stations: StationMap) -> Result<String> {
    Ok(render(&rows(stations)?))
}
