//! Key hashing and hash-suffix extraction.
//!
//! Every key is reduced to a 32-bit [`HashCode`]. Directory ids and bucket
//! suffixes are always taken from the fixed 32-character, zero-padded binary
//! rendering of that code, so two keys agree on their low `d` bits no matter
//! how many leading zero bits their hashes carry.

use exhash_error::{ExhashError, Result};
use exhash_types::Constant;
use xxhash_rust::xxh3::xxh3_64;

/// Width of a key hash in bits; also the upper bound on directory depth.
pub const HASH_WIDTH_BITS: u32 = 32;

const TAG_INT: u8 = 0x01;
const TAG_STR: u8 = 0x02;

/// 32-bit hash of a key value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HashCode(u32);

impl HashCode {
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Fixed-width binary rendering, most significant bit first.
    #[must_use]
    pub fn bit_string(self) -> String {
        format!("{:032b}", self.0)
    }

    /// The low `depth` bits as a `'0'`/`'1'` string of exactly `depth`
    /// characters.
    ///
    /// # Errors
    /// Returns `OutOfRange` when `depth` exceeds [`HASH_WIDTH_BITS`].
    pub fn suffix(self, depth: u32) -> Result<String> {
        if depth > HASH_WIDTH_BITS {
            return Err(ExhashError::OutOfRange {
                what: "hash suffix depth".to_owned(),
                value: depth.to_string(),
            });
        }
        let bits = self.bit_string();
        Ok(bits[(HASH_WIDTH_BITS - depth) as usize..].to_owned())
    }

    /// Bit at `position`, counted from 1 at the least significant end.
    /// Positions outside `1..=32` read as `false`.
    #[must_use]
    pub const fn bit(self, position: u32) -> bool {
        if position == 0 || position > HASH_WIDTH_BITS {
            return false;
        }
        (self.0 >> (position - 1)) & 1 == 1
    }
}

/// Maps key values to hash codes.
///
/// Implementations must be deterministic across processes and platforms:
/// hash codes are persisted implicitly through directory ids.
pub trait KeyHasher {
    fn hash_key(&self, key: &Constant) -> HashCode;
}

/// Default hasher: `xxh3_64` over a type-tagged canonical encoding, folded
/// to 32 bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Xxh3KeyHasher;

impl KeyHasher for Xxh3KeyHasher {
    fn hash_key(&self, key: &Constant) -> HashCode {
        let h = xxh3_64(&canonical_key_bytes(key));
        HashCode((h ^ (h >> 32)) as u32)
    }
}

/// Canonical byte encoding of a key, independent of in-memory layout.
#[must_use]
pub fn canonical_key_bytes(key: &Constant) -> Vec<u8> {
    match key {
        Constant::Int(v) => {
            let mut buf = Vec::with_capacity(9);
            buf.push(TAG_INT);
            buf.extend_from_slice(&v.to_le_bytes());
            buf
        }
        Constant::Str(s) => {
            let mut buf = Vec::with_capacity(5 + s.len());
            buf.push(TAG_STR);
            buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
            buf.extend_from_slice(s.as_bytes());
            buf
        }
    }
}

/// Hash `key` with the default hasher.
#[must_use]
pub fn hash_key(key: &Constant) -> HashCode {
    Xxh3KeyHasher.hash_key(key)
}
