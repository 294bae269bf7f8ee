//! Turning a segment's bytes into `(station, value)` records.
//!
//! Values are fixed-point with exactly one fractional digit and at most two integer
//! digits, optionally signed: `-?D{1,2}.D`. That shape is a contract with the producer
//! of the file, and the decoder reads digits at fixed positions from the end of the
//! token instead of running a float parser. Anything else is rejected.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use memchr::memchr;

use crate::error::{Error, Result};
use crate::segment::Segment;
use crate::station::{RollingHash, StationRef};

/// A measurement in tenths of a unit, `-999..=999`.
pub type Tenths = i16;

pub const MAX_TENTHS: Tenths = 999;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Record<'a> {
    pub name: StationRef<'a>,
    pub value: Tenths,
}

#[inline]
fn digit(b: u8) -> Option<Tenths> {
    b.is_ascii_digit().then(|| (b - b'0') as Tenths)
}

/// Decodes `-?D{1,2}.D` into tenths.
///
/// The fractional digit is always last and the dot second to last, so only the sign
/// and the optional tens digit depend on the token length.
#[inline]
pub fn decode_tenths(token: &[u8]) -> Option<Tenths> {
    let len = token.len();
    if !(3..=5).contains(&len) {
        return None;
    }
    let negative = token[0] == b'-';
    let digits = len - negative as usize;
    if !(3..=4).contains(&digits) || token[len - 2] != b'.' {
        return None;
    }
    let frac = digit(token[len - 1])?;
    let units = digit(token[len - 3])?;
    let tens = if digits == 4 { digit(token[len - 4])? } else { 0 };
    let value = tens * 100 + units * 10 + frac;
    Some(if negative { -value } else { value })
}

/// Parses one line without its `\n`. `offset` is where the line starts in the file.
pub fn parse_line(line: &[u8], offset: u64) -> Result<Record<'_>> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let mut hash = RollingHash::new();
    let mut delimiter = None;
    for (i, &b) in line.iter().enumerate() {
        if b == b';' {
            delimiter = Some(i);
            break;
        }
        hash.push(b);
    }
    let split = delimiter.ok_or(Error::MissingDelimiter { offset })?;
    if split == 0 {
        return Err(Error::EmptyName { offset });
    }
    let token = &line[split + 1..];
    let value = decode_tenths(token).ok_or_else(|| Error::InvalidValue {
        offset,
        token: String::from_utf8_lossy(token).into_owned(),
    })?;
    Ok(Record {
        name: StationRef::with_hash(&line[..split], hash.finish()),
        value,
    })
}

/// Something that hands out records one at a time, each borrowed until the next call.
pub trait RecordSource {
    fn next_record(&mut self) -> Option<Result<Record<'_>>>;
}

/// Records of a segment that is fully in memory, e.g. a window of a mapped file.
pub struct Records<'a> {
    data: &'a [u8],
    pos: usize,
    base: u64,
}

impl<'a> Records<'a> {
    /// `base` is the file offset of `data[0]`, used in error reports.
    pub fn new(data: &'a [u8], base: u64) -> Self {
        Self { data, pos: 0, base }
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<Record<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let data = self.data;
        if self.pos >= data.len() {
            return None;
        }
        let rest = &data[self.pos..];
        let (line, consumed) = match memchr(b'\n', rest) {
            Some(i) => (&rest[..i], i + 1),
            None => (rest, rest.len()),
        };
        let offset = self.base + self.pos as u64;
        self.pos += consumed;
        Some(parse_line(line, offset))
    }
}

impl RecordSource for Records<'_> {
    fn next_record(&mut self) -> Option<Result<Record<'_>>> {
        self.next()
    }
}

/// Records of a segment read through a fixed-size buffer.
///
/// A line cut by the end of the buffer is moved to `carry` and completed from the
/// next read before it is parsed, so a record is never split.
pub struct BufferedRecords<R> {
    reader: R,
    buf: Box<[u8]>,
    start: usize,
    end: usize,
    /// Segment bytes not yet read from `reader`.
    remaining: u64,
    /// File offset of `buf[start]`.
    offset: u64,
    carry: Vec<u8>,
    carry_offset: u64,
    carry_emitted: bool,
}

impl BufferedRecords<File> {
    /// Opens a private handle on `path` positioned at the start of `segment`.
    pub fn open(path: &Path, segment: Segment, buffer_size: usize) -> Result<Self> {
        let mut file = File::open(path).map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })?;
        file.seek(SeekFrom::Start(segment.offset))?;
        Ok(Self::new(file, segment, buffer_size))
    }
}

impl<R: Read> BufferedRecords<R> {
    /// `reader` must already be positioned at `segment.offset`.
    pub fn new(reader: R, segment: Segment, buffer_size: usize) -> Self {
        Self {
            reader,
            buf: vec![0; buffer_size.max(1)].into_boxed_slice(),
            start: 0,
            end: 0,
            remaining: segment.length,
            offset: segment.offset,
            carry: Vec::new(),
            carry_offset: segment.offset,
            carry_emitted: false,
        }
    }

    /// Reads the next buffer of the segment. `false` once the segment is exhausted.
    fn fill(&mut self) -> Result<bool> {
        if self.remaining == 0 {
            return Ok(false);
        }
        let want = self.remaining.min(self.buf.len() as u64) as usize;
        let mut filled = 0;
        while filled < want {
            match self.reader.read(&mut self.buf[filled..want]) {
                Ok(0) => {
                    return Err(Error::Truncated {
                        offset: self.offset + filled as u64,
                        expected: self.remaining - filled as u64,
                    })
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.remaining -= want as u64;
        self.start = 0;
        self.end = want;
        Ok(true)
    }

    fn read_record(&mut self) -> Result<Option<Record<'_>>> {
        if self.carry_emitted {
            self.carry.clear();
            self.carry_emitted = false;
        }
        loop {
            let pending = &self.buf[self.start..self.end];
            if let Some(i) = memchr(b'\n', pending) {
                let line = self.start..self.start + i;
                let offset = self.offset;
                self.start += i + 1;
                self.offset += i as u64 + 1;
                if self.carry.is_empty() {
                    return parse_line(&self.buf[line], offset).map(Some);
                }
                self.carry.extend_from_slice(&self.buf[line]);
                self.carry_emitted = true;
                return parse_line(&self.carry, self.carry_offset).map(Some);
            }
            if self.carry.is_empty() {
                self.carry_offset = self.offset;
            }
            self.carry.extend_from_slice(pending);
            self.offset += pending.len() as u64;
            self.start = self.end;
            if !self.fill()? {
                if self.carry.is_empty() {
                    return Ok(None);
                }
                // last line of the file without a terminator
                self.carry_emitted = true;
                return parse_line(&self.carry, self.carry_offset).map(Some);
            }
        }
    }
}

impl<R: Read> RecordSource for BufferedRecords<R> {
    fn next_record(&mut self) -> Option<Result<Record<'_>>> {
        self.read_record().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::io::Cursor;

    fn collect<S: RecordSource>(mut source: S) -> Result<Vec<(Vec<u8>, Tenths)>> {
        let mut out = Vec::new();
        while let Some(record) = source.next_record() {
            let record = record?;
            out.push((record.name.as_bytes().to_vec(), record.value));
        }
        Ok(out)
    }

    fn whole(data: &[u8]) -> Segment {
        Segment {
            offset: 0,
            length: data.len() as u64,
        }
    }

    #[test]
    fn decodes_every_token_shape() {
        assert_eq!(decode_tenths(b"0.0"), Some(0));
        assert_eq!(decode_tenths(b"1.5"), Some(15));
        assert_eq!(decode_tenths(b"-1.5"), Some(-15));
        assert_eq!(decode_tenths(b"12.3"), Some(123));
        assert_eq!(decode_tenths(b"-12.3"), Some(-123));
        assert_eq!(decode_tenths(b"99.9"), Some(MAX_TENTHS));
        assert_eq!(decode_tenths(b"-99.9"), Some(-MAX_TENTHS));
    }

    #[test]
    fn rejects_out_of_contract_tokens() {
        let tokens: [&[u8]; 13] = [
            b"",
            b"1",
            b"1.",
            b".5",
            b"-.5",
            b"12",
            b"123.4",
            b"1.23",
            b"+1.5",
            b"--1.5",
            b"1,5",
            b"a.5",
            b"-1.x",
        ];
        for token in tokens {
            assert_eq!(decode_tenths(token), None, "{:?}", String::from_utf8_lossy(token));
        }
    }

    #[test]
    fn decodes_all_values_in_range() {
        for v in -999i32..=999 {
            let text = format!("{}{}.{}", if v < 0 { "-" } else { "" }, v.abs() / 10, v.abs() % 10);
            assert_eq!(decode_tenths(text.as_bytes()), Some(v as Tenths), "{text}");
        }
    }

    #[test]
    fn parse_line_splits_on_first_delimiter_and_strips_cr() {
        let record = parse_line(b"St. John's;-5.0\r", 0).unwrap();
        assert_eq!(record.name.as_bytes(), b"St. John's");
        assert_eq!(record.value, -50);
        assert_eq!(record.name, StationRef::new(b"St. John's"));
    }

    #[test]
    fn parse_line_reports_offsets() {
        assert!(matches!(
            parse_line(b"Hamburg 12.3", 40),
            Err(Error::MissingDelimiter { offset: 40 })
        ));
        assert!(matches!(
            parse_line(b";12.3", 7),
            Err(Error::EmptyName { offset: 7 })
        ));
        match parse_line(b"Hamburg;12.34", 3) {
            Err(Error::InvalidValue { offset, token }) => {
                assert_eq!(offset, 3);
                assert_eq!(token, "12.34");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn slice_records_yield_each_line() {
        let data = b"Hamburg;12.3\nHamburg;-5.0\nBerlin;0.0";
        let records = collect(Records::new(data, 0)).unwrap();
        assert_eq!(
            records,
            vec![
                (b"Hamburg".to_vec(), 123),
                (b"Hamburg".to_vec(), -50),
                (b"Berlin".to_vec(), 0),
            ]
        );
    }

    #[test]
    fn slice_records_error_carries_absolute_offset() {
        let data = b"A;1.0\nbroken\n";
        let mut records = Records::new(data, 100);
        assert!(records.next().unwrap().is_ok());
        assert!(matches!(
            records.next().unwrap(),
            Err(Error::MissingDelimiter { offset: 106 })
        ));
        assert!(records.next().is_none());
    }

    #[test]
    fn buffered_records_carry_lines_across_reads() {
        let data = b"Hamburg;12.3\nHamburg;-5.0\r\nBerlin;0.0\nX;-99.9\n";
        for size in 1..=data.len() + 1 {
            let source = BufferedRecords::new(Cursor::new(&data[..]), whole(data), size);
            let buffered = collect(source).unwrap();
            assert_eq!(buffered, collect(Records::new(data, 0)).unwrap(), "buffer {size}");
        }
    }

    #[test]
    fn buffered_matches_slice_on_random_input() {
        let mut rng = StdRng::seed_from_u64(3);
        let names: [&[u8]; 5] = [
            b"Abha",
            b"Baku",
            b"Ouagadougou",
            b"Z",
            b"Petropavlovsk-Kamchatsky",
        ];
        let mut data = Vec::new();
        for _ in 0..500 {
            let v: i32 = rng.gen_range(-999..=999);
            data.extend_from_slice(names[rng.gen_range(0..names.len())]);
            data.extend_from_slice(
                format!(";{}{}.{}\n", if v < 0 { "-" } else { "" }, v.abs() / 10, v.abs() % 10)
                    .as_bytes(),
            );
        }
        let expected = collect(Records::new(&data, 0)).unwrap();
        assert_eq!(expected.len(), 500);
        for size in [16, 17, 31, 64, 4096] {
            let source = BufferedRecords::new(Cursor::new(&data), whole(&data), size);
            assert_eq!(collect(source).unwrap(), expected);
        }
    }

    #[test]
    fn buffered_reads_only_its_segment() {
        let data = b"A;1.0\nB;2.0\nC;3.0\n";
        let segment = Segment {
            offset: 6,
            length: 6,
        };
        let mut reader = Cursor::new(&data[..]);
        reader.set_position(segment.offset);
        let records = collect(BufferedRecords::new(reader, segment, 4)).unwrap();
        assert_eq!(records, vec![(b"B".to_vec(), 20)]);
    }

    #[test]
    fn buffered_reports_truncation() {
        let data = b"A;1.0\nB;2.0\n";
        let segment = Segment {
            offset: 0,
            length: 40,
        };
        let mut source = BufferedRecords::new(Cursor::new(&data[..]), segment, 8);
        let mut seen = 0;
        let err = loop {
            match source.next_record() {
                Some(Ok(_)) => seen += 1,
                Some(Err(e)) => break e,
                None => panic!("truncation not reported"),
            }
        };
        assert!(matches!(err, Error::Truncated { .. }), "{err:?}");
        assert!(seen <= 2);
    }
}
