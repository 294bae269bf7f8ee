//! Splitting the input into line-aligned byte ranges, one unit of work each.

use std::io::{Read, Seek, SeekFrom};

use memchr::memchr;

use crate::error::Result;

/// Segments are never cut smaller than this unless the file itself is smaller.
pub const MIN_SEGMENT_LEN: u64 = 8 * 1024;
/// Bytes read per probe when looking for a terminator in a file.
pub const PROBE_WINDOW: usize = 128;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment {
    pub offset: u64,
    pub length: u64,
}

impl Segment {
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Finds line ends in the underlying input.
pub trait BoundaryProbe {
    /// Offset just past the first `\n` at or after `from`, `None` if the input ends first.
    fn line_end_from(&mut self, from: u64) -> Result<Option<u64>>;
}

impl BoundaryProbe for &[u8] {
    fn line_end_from(&mut self, from: u64) -> Result<Option<u64>> {
        let Ok(from) = usize::try_from(from) else {
            return Ok(None);
        };
        if from >= self.len() {
            return Ok(None);
        }
        Ok(memchr(b'\n', &self[from..]).map(|i| (from + i + 1) as u64))
    }
}

/// Probes a seekable reader through a small bounded window.
pub struct FileProbe<R> {
    inner: R,
    window: Vec<u8>,
}

impl<R: Read + Seek> FileProbe<R> {
    pub fn new(inner: R) -> Self {
        Self::with_window(inner, PROBE_WINDOW)
    }

    pub fn with_window(inner: R, window: usize) -> Self {
        Self {
            inner,
            window: vec![0; window.max(1)],
        }
    }
}

impl<R: Read + Seek> BoundaryProbe for FileProbe<R> {
    fn line_end_from(&mut self, from: u64) -> Result<Option<u64>> {
        let mut pos = self.inner.seek(SeekFrom::Start(from))?;
        loop {
            let n = self.inner.read(&mut self.window)?;
            if n == 0 {
                return Ok(None);
            }
            if let Some(i) = memchr(b'\n', &self.window[..n]) {
                return Ok(Some(pos + i as u64 + 1));
            }
            pos += n as u64;
        }
    }
}

pub fn segment<P: BoundaryProbe + ?Sized>(
    file_size: u64,
    target_count: usize,
    probe: &mut P,
) -> Result<Vec<Segment>> {
    segment_with_min(file_size, target_count, MIN_SEGMENT_LEN, probe)
}

/// Tiles `[0, file_size)` with roughly `target_count` segments, each ending at a `\n`
/// or at end of file.
pub fn segment_with_min<P: BoundaryProbe + ?Sized>(
    file_size: u64,
    target_count: usize,
    min_len: u64,
    probe: &mut P,
) -> Result<Vec<Segment>> {
    let target_count = target_count.max(1);
    let approx = (file_size / target_count as u64).max(min_len).max(1);
    let mut segments = Vec::with_capacity(target_count);
    let mut offset = 0;
    while file_size - offset > approx {
        // a terminator sitting exactly on the last byte of the tentative range counts
        match probe.line_end_from(offset + approx - 1)? {
            Some(end) if end < file_size => {
                segments.push(Segment {
                    offset,
                    length: end - offset,
                });
                offset = end;
            }
            _ => break,
        }
    }
    segments.push(Segment {
        offset,
        length: file_size - offset,
    });
    Ok(segments)
}
