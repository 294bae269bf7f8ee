//! Station keys.
//!
//! The hash is computed once while the parser scans the name and travels with the bytes.
//! It only picks the bucket: two keys are the same station iff their bytes are equal.

use std::fmt;
use std::hash::{Hash, Hasher};

use hashbrown::Equivalent;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// Rolling FNV-1a state, fed one byte at a time.
#[derive(Clone, Copy, Debug)]
pub struct RollingHash(u64);

impl RollingHash {
    pub fn new() -> Self {
        Self(FNV_OFFSET)
    }

    #[inline]
    pub fn push(&mut self, byte: u8) {
        self.0 = (self.0 ^ byte as u64).wrapping_mul(FNV_PRIME);
    }

    pub fn finish(self) -> u64 {
        self.0
    }
}

impl Default for RollingHash {
    fn default() -> Self {
        Self::new()
    }
}

pub fn hash_name(bytes: &[u8]) -> u64 {
    let mut hash = RollingHash::new();
    bytes.iter().for_each(|&b| hash.push(b));
    hash.finish()
}

/// Owned station name with its cached hash.
#[derive(Clone, Eq)]
pub struct StationName {
    bytes: Box<[u8]>,
    hash: u64,
}

impl StationName {
    pub fn new(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.into(),
            hash: hash_name(bytes),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn cached_hash(&self) -> u64 {
        self.hash
    }
}

impl PartialEq for StationName {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.bytes == other.bytes
    }
}

impl Hash for StationName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Debug for StationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StationName")
            .field(&String::from_utf8_lossy(&self.bytes))
            .finish()
    }
}

impl From<StationRef<'_>> for StationName {
    fn from(name: StationRef<'_>) -> Self {
        Self {
            bytes: name.bytes.into(),
            hash: name.hash,
        }
    }
}

/// Borrowed view of a name inside a read buffer, used for lookups without allocating.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StationRef<'a> {
    bytes: &'a [u8],
    hash: u64,
}

impl<'a> StationRef<'a> {
    /// `hash` must be `hash_name(bytes)`.
    pub(crate) fn with_hash(bytes: &'a [u8], hash: u64) -> Self {
        debug_assert_eq!(hash, hash_name(bytes));
        Self { bytes, hash }
    }

    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            hash: hash_name(bytes),
        }
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

impl Hash for StationRef<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl Equivalent<StationName> for StationRef<'_> {
    fn equivalent(&self, key: &StationName) -> bool {
        self.hash == key.hash && self.bytes == &*key.bytes
    }
}
