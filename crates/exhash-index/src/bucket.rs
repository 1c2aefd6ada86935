//! Fixed-capacity hash buckets.
//!
//! A bucket is one record file of `(block, id, dataval)` rows, where
//! `block`/`id` locate the indexed data record and `dataval` is its key.
//! The bucket's local depth is owned by the directory; the value kept here
//! is only the one the bucket was opened with.

use std::fmt;

use exhash_error::{ExhashError, Result};
use exhash_record::{TableScan, Transaction};
use exhash_types::{Constant, FieldType, RowLocator, Schema, TableInfo};
use tracing::debug;

use crate::directory::BucketHandle;
use crate::hash::KeyHasher;

pub(crate) const BLOCK_FIELD: &str = "block";
pub(crate) const SLOT_FIELD: &str = "id";
pub(crate) const KEY_FIELD: &str = "dataval";

/// Schema of a bucket file whose keys are of type `key_type`.
#[must_use]
pub fn bucket_schema(key_type: FieldType) -> Schema {
    let mut sch = Schema::new();
    sch.add_int_field(BLOCK_FIELD)
        .add_int_field(SLOT_FIELD)
        .add_field(KEY_FIELD, key_type);
    sch
}

/// Record-file descriptor of the bucket behind `handle`.
#[must_use]
pub fn bucket_table(handle: &BucketHandle, key_type: FieldType) -> TableInfo {
    TableInfo::new(handle.as_str(), bucket_schema(key_type))
}

/// One `(locator, key)` pair stored in a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketRecord {
    pub row_locator: RowLocator,
    pub key: Constant,
}

/// Outcome of [`Bucket::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The bucket is full; nothing was written.
    Overflow,
}

/// Records of a bucket after a split, by destination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitPartition {
    /// Records whose split bit is `0`; still in this bucket.
    pub retained: Vec<BucketRecord>,
    /// Records whose split bit is `1`; removed from this bucket.
    pub moved: Vec<BucketRecord>,
}

impl SplitPartition {
    #[must_use]
    pub fn len(&self) -> usize {
        self.retained.len() + self.moved.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.retained.is_empty() && self.moved.is_empty()
    }
}

/// An open bucket: a scan over its record file plus its capacity.
pub struct Bucket<S: TableScan> {
    handle: BucketHandle,
    local_depth: u32,
    key_type: FieldType,
    capacity: usize,
    scan: S,
}

impl<S: TableScan> fmt::Debug for Bucket<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bucket")
            .field("handle", &self.handle)
            .field("local_depth", &self.local_depth)
            .field("key_type", &self.key_type)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl<S: TableScan> Bucket<S> {
    /// Open the bucket behind `handle`, positioned before its first record.
    pub fn open<T>(
        tx: &T,
        handle: BucketHandle,
        local_depth: u32,
        key_type: FieldType,
        capacity: usize,
    ) -> Result<Self>
    where
        T: Transaction<Scan = S>,
    {
        let scan = tx.open_scan(&bucket_table(&handle, key_type))?;
        Ok(Self {
            handle,
            local_depth,
            key_type,
            capacity,
            scan,
        })
    }

    #[must_use]
    pub const fn handle(&self) -> &BucketHandle {
        &self.handle
    }

    #[must_use]
    pub const fn local_depth(&self) -> u32 {
        self.local_depth
    }

    /// Rewind to before the first record.
    pub fn before_first(&mut self) -> Result<()> {
        self.scan.before_first()
    }

    fn current_record(&self) -> Result<BucketRecord> {
        let block = self.scan.get_int(BLOCK_FIELD)?;
        let slot = self.scan.get_int(SLOT_FIELD)?;
        let locator_part = |what: &str, raw: i64| {
            u32::try_from(raw).map_err(|_| ExhashError::OutOfRange {
                what: format!("{what} in {}", self.handle),
                value: raw.to_string(),
            })
        };
        Ok(BucketRecord {
            row_locator: RowLocator::new(
                locator_part("block number", block)?,
                locator_part("slot number", slot)?,
            ),
            key: self.scan.get_value(KEY_FIELD)?,
        })
    }

    /// Advance to the next record whose key equals `key`.
    pub fn next_matching(&mut self, key: &Constant) -> Result<Option<BucketRecord>> {
        while self.scan.next()? {
            let record = self.current_record()?;
            if record.key == *key {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Iterate the records with key `key`, starting from the first.
    ///
    /// The iterator is lazy; calling `scan_matching` again restarts it.
    pub fn scan_matching<'a>(&'a mut self, key: &'a Constant) -> Result<MatchingRecords<'a, S>> {
        self.before_first()?;
        Ok(MatchingRecords {
            bucket: self,
            key,
            done: false,
        })
    }

    /// Every record in the bucket, in file order.
    pub fn records(&mut self) -> Result<Vec<BucketRecord>> {
        self.before_first()?;
        let mut out = Vec::new();
        while self.scan.next()? {
            out.push(self.current_record()?);
        }
        Ok(out)
    }

    /// Number of records in the bucket.
    pub fn occupancy(&mut self) -> Result<usize> {
        self.before_first()?;
        let mut n = 0;
        while self.scan.next()? {
            n += 1;
        }
        Ok(n)
    }

    /// Append `(key, locator)` unless the bucket is full.
    ///
    /// # Errors
    /// Rejects a key that does not fit the bucket's key type before anything
    /// is written.
    pub fn insert(&mut self, key: &Constant, locator: RowLocator) -> Result<InsertOutcome> {
        if !key.fits(self.key_type) {
            return Err(match (key, self.key_type) {
                (Constant::Str(s), FieldType::Varchar(max)) => ExhashError::OutOfRange {
                    what: format!("{KEY_FIELD} varchar({max}) in {}", self.handle),
                    value: s.chars().count().to_string(),
                },
                _ => ExhashError::TypeMismatch {
                    expected: self.key_type.name().to_owned(),
                    actual: key.type_name().to_owned(),
                },
            });
        }
        let occupancy = self.occupancy()?;
        if occupancy >= self.capacity {
            debug!(bucket = %self.handle, occupancy, "bucket full");
            return Ok(InsertOutcome::Overflow);
        }
        self.scan.insert()?;
        self.scan.set_int(BLOCK_FIELD, i64::from(locator.block))?;
        self.scan.set_int(SLOT_FIELD, i64::from(locator.slot))?;
        self.scan.set_value(KEY_FIELD, key)?;
        debug!(bucket = %self.handle, key = %key, locator = %locator, "bucket insert");
        Ok(InsertOutcome::Inserted)
    }

    /// Remove the record `(key, locator)`; `false` if it is not present.
    pub fn delete(&mut self, key: &Constant, locator: RowLocator) -> Result<bool> {
        self.before_first()?;
        while let Some(record) = self.next_matching(key)? {
            if record.row_locator == locator {
                self.scan.delete()?;
                debug!(bucket = %self.handle, key = %key, locator = %locator, "bucket delete");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Remove the record the bucket is currently on.
    pub fn delete_current(&mut self) -> Result<()> {
        self.scan.delete()
    }

    /// Partition the bucket on hash bit `new_local_depth` (counted from 1 at
    /// the least significant end): records with a `0` bit stay, records with
    /// a `1` bit are removed and returned as `moved`.
    ///
    /// # Errors
    /// Returns `Internal` unless `new_local_depth` is one more than the
    /// bucket's current local depth.
    pub fn split<H: KeyHasher + ?Sized>(
        &mut self,
        hasher: &H,
        new_local_depth: u32,
    ) -> Result<SplitPartition> {
        if new_local_depth != self.local_depth + 1 {
            return Err(ExhashError::internal(format!(
                "cannot split {} from local depth {} to {new_local_depth}",
                self.handle, self.local_depth
            )));
        }
        self.before_first()?;
        let mut partition = SplitPartition::default();
        while self.scan.next()? {
            let record = self.current_record()?;
            if hasher.hash_key(&record.key).bit(new_local_depth) {
                self.scan.delete()?;
                partition.moved.push(record);
            } else {
                partition.retained.push(record);
            }
        }
        self.local_depth = new_local_depth;
        debug!(
            bucket = %self.handle,
            new_local_depth,
            retained = partition.retained.len(),
            moved = partition.moved.len(),
            "bucket split"
        );
        Ok(partition)
    }

    /// Release the bucket scan. Idempotent.
    pub fn close(&mut self) {
        self.scan.close();
    }
}

/// Lazy iterator returned by [`Bucket::scan_matching`].
pub struct MatchingRecords<'a, S: TableScan> {
    bucket: &'a mut Bucket<S>,
    key: &'a Constant,
    done: bool,
}

impl<S: TableScan> Iterator for MatchingRecords<'_, S> {
    type Item = Result<BucketRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.bucket.next_matching(self.key) {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use exhash_record::{MemoryScan, MemoryStore, MemoryTransaction, TransactionMode};

    use super::*;
    use crate::hash::HashCode;

    /// Hashes an integer key to itself so split bits are predictable.
    struct IdentityHasher;

    impl KeyHasher for IdentityHasher {
        fn hash_key(&self, key: &Constant) -> HashCode {
            HashCode::new(key.as_int().unwrap_or_default() as u32)
        }
    }

    fn open_bucket(tx: &MemoryTransaction, capacity: usize) -> Bucket<MemoryScan> {
        Bucket::open(
            tx,
            BucketHandle::for_suffix("idx", "1"),
            1,
            FieldType::Int,
            capacity,
        )
        .unwrap()
    }

    fn writer() -> (MemoryStore, MemoryTransaction) {
        let store = MemoryStore::new();
        let tx = store.begin(TransactionMode::Immediate).unwrap();
        (store, tx)
    }

    #[test]
    fn test_insert_until_full() {
        let (_store, tx) = writer();
        let mut bucket = open_bucket(&tx, 3);
        for i in 0..3 {
            let outcome = bucket
                .insert(&Constant::Int(i), RowLocator::new(0, i as u32))
                .unwrap();
            assert_eq!(outcome, InsertOutcome::Inserted);
        }
        assert_eq!(bucket.occupancy().unwrap(), 3);
        let outcome = bucket
            .insert(&Constant::Int(9), RowLocator::new(1, 0))
            .unwrap();
        assert_eq!(outcome, InsertOutcome::Overflow);
        assert_eq!(bucket.occupancy().unwrap(), 3, "overflow must not write");
    }

    #[test]
    fn test_scan_matching_filters_and_restarts() {
        let (_store, tx) = writer();
        let mut bucket = open_bucket(&tx, 5);
        let (key, other) = (Constant::Int(7), Constant::Int(8));
        bucket.insert(&key, RowLocator::new(0, 0)).unwrap();
        bucket.insert(&other, RowLocator::new(0, 1)).unwrap();
        bucket.insert(&key, RowLocator::new(0, 2)).unwrap();

        let first: Vec<RowLocator> = bucket
            .scan_matching(&key)
            .unwrap()
            .map(|r| r.unwrap().row_locator)
            .collect();
        assert_eq!(first, [RowLocator::new(0, 0), RowLocator::new(0, 2)]);

        let again = bucket.scan_matching(&key).unwrap().count();
        assert_eq!(again, 2);

        let missing = Constant::Int(99);
        assert_eq!(bucket.scan_matching(&missing).unwrap().count(), 0);
    }

    #[test]
    fn test_delete_removes_exact_pair() {
        let (_store, tx) = writer();
        let mut bucket = open_bucket(&tx, 5);
        let (seven, eight) = (Constant::Int(7), Constant::Int(8));
        bucket.insert(&seven, RowLocator::new(0, 0)).unwrap();
        bucket.insert(&seven, RowLocator::new(0, 1)).unwrap();

        assert!(!bucket.delete(&seven, RowLocator::new(3, 3)).unwrap());
        assert!(!bucket.delete(&eight, RowLocator::new(0, 0)).unwrap());
        assert!(bucket.delete(&seven, RowLocator::new(0, 0)).unwrap());
        assert_eq!(
            bucket.records().unwrap(),
            [BucketRecord {
                row_locator: RowLocator::new(0, 1),
                key: Constant::Int(7),
            }]
        );
    }

    #[test]
    fn test_split_partitions_on_bit() {
        let (_store, tx) = writer();
        let mut bucket = open_bucket(&tx, 5);
        // Suffix-1 keys; bit 2 decides the destination.
        for (slot, k) in (0_u32..).zip([0b001, 0b011, 0b101, 0b111, 0b1001]) {
            bucket
                .insert(&Constant::Int(k), RowLocator::new(0, slot))
                .unwrap();
        }
        let before = bucket.records().unwrap();
        let partition = bucket.split(&IdentityHasher, 2).unwrap();

        let kept: Vec<i64> = partition
            .retained
            .iter()
            .filter_map(|r| r.key.as_int())
            .collect();
        let moved: Vec<i64> = partition
            .moved
            .iter()
            .filter_map(|r| r.key.as_int())
            .collect();
        assert_eq!(kept, [0b001, 0b101, 0b1001]);
        assert_eq!(moved, [0b011, 0b111]);
        assert_eq!(partition.len(), before.len());
        assert_eq!(bucket.local_depth(), 2);
        assert_eq!(bucket.records().unwrap(), partition.retained);
    }

    #[test]
    fn test_split_rejects_depth_jump() {
        let (_store, tx) = writer();
        let mut bucket = open_bucket(&tx, 5);
        let err = bucket.split(&IdentityHasher, 3).unwrap_err();
        assert!(matches!(err, ExhashError::Internal(_)), "got {err:?}");
    }

    #[test]
    fn test_string_keys() {
        let (_store, tx) = writer();
        let mut bucket = Bucket::open(
            &tx,
            BucketHandle::new("names.eh0"),
            1,
            FieldType::Varchar(8),
            5,
        )
        .unwrap();
        bucket
            .insert(&Constant::from("amy"), RowLocator::new(2, 4))
            .unwrap();
        let key = Constant::from("amy");
        let found: Vec<BucketRecord> = bucket
            .scan_matching(&key)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].row_locator, RowLocator::new(2, 4));

        let too_long = Constant::from("a name far too long");
        let err = bucket.insert(&too_long, RowLocator::new(0, 0)).unwrap_err();
        assert!(matches!(err, ExhashError::OutOfRange { .. }), "got {err:?}");
        let err = bucket
            .insert(&Constant::Int(1), RowLocator::new(0, 0))
            .unwrap_err();
        assert!(
            matches!(err, ExhashError::TypeMismatch { .. }),
            "got {err:?}"
        );
        assert_eq!(
            bucket.occupancy().unwrap(),
            1,
            "rejected keys must not leave records"
        );
    }
}
