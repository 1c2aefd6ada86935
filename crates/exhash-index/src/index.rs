//! The extensible hash index facade.
//!
//! [`HashIndex`] ties the directory and its buckets together behind the
//! [`Index`] contract. All reads and writes go through the transaction the
//! index was opened with; the index itself never commits or rolls back.

use std::collections::BTreeMap;
use std::fmt;

use exhash_error::{ExhashError, Result};
use exhash_record::Transaction;
use exhash_types::{Constant, FieldType, RowLocator};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bucket::{Bucket, BucketRecord, InsertOutcome};
use crate::config::{HashIndexConfig, validate_index_name};
use crate::directory::{BucketHandle, BucketLocation, Directory, DirectoryEntry};
use crate::hash::{HASH_WIDTH_BITS, HashCode, KeyHasher, Xxh3KeyHasher};
use crate::instrumentation::{
    IndexOpType, record_doubling, record_operation, record_overflow_rejection, record_split,
};

/// Secondary index contract: map a search key to the locators of the data
/// records carrying it.
pub trait Index {
    /// Position before the first entry with key `key`. Legal in any state.
    fn position(&mut self, key: &Constant) -> Result<()>;

    /// Advance to the next entry with the positioned key; `false` once
    /// there are none left.
    fn next(&mut self) -> Result<bool>;

    /// Locator of the entry reached by the last successful `next`.
    fn current_locator(&self) -> Result<RowLocator>;

    /// Add the entry `(key, locator)`.
    fn insert(&mut self, key: &Constant, locator: RowLocator) -> Result<()>;

    /// Remove the entry `(key, locator)`. Removing an absent entry is a
    /// no-op.
    fn delete(&mut self, key: &Constant, locator: RowLocator) -> Result<()>;

    /// Release open scans. Idempotent.
    fn close(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CursorState {
    Closed,
    Positioned { key: Constant },
    Iterating {
        key: Constant,
        current: Option<RowLocator>,
    },
}

/// Extensible hash index over the record files of one transaction.
pub struct HashIndex<T: Transaction, H: KeyHasher = Xxh3KeyHasher> {
    tx: T,
    index_name: String,
    key_type: FieldType,
    config: HashIndexConfig,
    hasher: H,
    directory: Directory<T>,
    bucket: Option<Bucket<T::Scan>>,
    location: Option<BucketLocation>,
    state: CursorState,
}

impl<T: Transaction, H: KeyHasher> fmt::Debug for HashIndex<T, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashIndex")
            .field("index_name", &self.index_name)
            .field("key_type", &self.key_type)
            .field("config", &self.config)
            .field("location", &self.location)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<T: Transaction> HashIndex<T> {
    /// Open (creating on first use) the index `index_name` with the default
    /// key hasher.
    ///
    /// # Errors
    /// Returns `InvalidConfig` for a bad name or configuration, and any
    /// storage error raised while reading or creating the directory.
    pub fn open(
        tx: T,
        index_name: &str,
        key_type: FieldType,
        config: HashIndexConfig,
    ) -> Result<Self> {
        Self::open_with_hasher(tx, index_name, key_type, config, Xxh3KeyHasher)
    }
}

impl<T: Transaction, H: KeyHasher> HashIndex<T, H> {
    /// Open the index with a caller-supplied key hasher. Every open of the
    /// same index must use the same hasher.
    pub fn open_with_hasher(
        tx: T,
        index_name: &str,
        key_type: FieldType,
        config: HashIndexConfig,
        hasher: H,
    ) -> Result<Self> {
        config.validate()?;
        validate_index_name(index_name)?;
        let directory = Directory::open(&tx, index_name)?;
        debug!(index = index_name, ?key_type, ?config, "opened hash index");
        Ok(Self {
            tx,
            index_name: index_name.to_owned(),
            key_type,
            config,
            hasher,
            directory,
            bucket: None,
            location: None,
            state: CursorState::Closed,
        })
    }

    #[must_use]
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    #[must_use]
    pub const fn key_type(&self) -> FieldType {
        self.key_type
    }

    #[must_use]
    pub const fn config(&self) -> &HashIndexConfig {
        &self.config
    }

    pub fn global_depth(&mut self) -> Result<u32> {
        self.directory.global_depth(&self.tx)
    }

    /// Directory entries ordered by id.
    pub fn directory_entries(&mut self) -> Result<Vec<DirectoryEntry>> {
        self.directory.entries(&self.tx)
    }

    pub fn bucket_count(&mut self) -> Result<usize> {
        self.directory.bucket_count(&self.tx)
    }

    /// Records stored in the bucket behind `handle`.
    pub fn bucket_records(&self, handle: &BucketHandle) -> Result<Vec<BucketRecord>> {
        let mut bucket = self.open_bucket(handle.clone(), 0)?;
        let records = bucket.records();
        bucket.close();
        records
    }

    /// Estimated number of blocks read by one equality lookup over an index
    /// spanning `num_blocks` blocks.
    pub fn search_cost(&mut self, num_blocks: u64) -> Result<u64> {
        let buckets = self.bucket_count()?;
        Ok(estimate_search_cost(num_blocks, buckets))
    }

    /// Verify the directory invariants and that every bucket respects its
    /// capacity and only holds keys carrying its suffix.
    pub fn check_invariants(&mut self) -> Result<()> {
        self.directory.check_invariants(&self.tx)?;
        let mut buckets: BTreeMap<BucketHandle, (u32, String)> = BTreeMap::new();
        for entry in self.directory.entries(&self.tx)? {
            let d = entry.local_depth as usize;
            let suffix = entry.bucket_id[entry.bucket_id.len() - d..].to_owned();
            buckets
                .entry(entry.bucket_handle)
                .or_insert((entry.local_depth, suffix));
        }
        for (handle, (depth, suffix)) in buckets {
            let records = self.bucket_records(&handle)?;
            if records.len() > self.config.bucket_capacity {
                return Err(ExhashError::internal(format!(
                    "{handle} holds {} records, capacity {}",
                    records.len(),
                    self.config.bucket_capacity
                )));
            }
            for record in &records {
                let actual = self.hasher.hash_key(&record.key).suffix(depth)?;
                if actual != suffix {
                    return Err(ExhashError::internal(format!(
                        "{handle} (suffix {suffix}) holds key {} with suffix {actual}",
                        record.key
                    )));
                }
            }
        }
        Ok(())
    }

    fn open_bucket(&self, handle: BucketHandle, local_depth: u32) -> Result<Bucket<T::Scan>> {
        Bucket::open(
            &self.tx,
            handle,
            local_depth,
            self.key_type,
            self.config.bucket_capacity,
        )
    }

    fn close_bucket(&mut self) {
        if let Some(mut bucket) = self.bucket.take() {
            bucket.close();
        }
        self.location = None;
        self.state = CursorState::Closed;
    }

    fn positioned_bucket(&mut self) -> Result<(&mut Bucket<T::Scan>, BucketLocation)> {
        match (self.bucket.as_mut(), self.location.clone()) {
            (Some(bucket), Some(location)) => Ok((bucket, location)),
            _ => Err(ExhashError::internal("no bucket open after positioning")),
        }
    }

    /// Put `(key, locator)` into the bucket it hashes to, which must have
    /// room.
    fn place(&mut self, key: &Constant, locator: RowLocator) -> Result<()> {
        self.position(key)?;
        let (bucket, location) = self.positioned_bucket()?;
        match bucket.insert(key, locator)? {
            InsertOutcome::Inserted => Ok(()),
            InsertOutcome::Overflow => Err(ExhashError::internal(format!(
                "re-placed record {locator} overflowed {}",
                location.handle
            ))),
        }
    }

    fn reject_overflow(&self, err: ExhashError, key: &Constant) -> ExhashError {
        record_overflow_rejection();
        warn!(
            index = %self.index_name,
            key = %key,
            error = %err,
            "bucket overflow cannot be resolved"
        );
        err
    }

    /// Split the full bucket the index is positioned on, doubling the
    /// directory first when the bucket already uses every directory bit.
    fn split_positioned_bucket(&mut self, key: &Constant) -> Result<()> {
        let (bucket, location) = self.positioned_bucket()?;
        let snapshot = bucket.records()?;
        if let Some(err) = classify_overflow(
            &self.hasher,
            self.config.bucket_capacity,
            &snapshot,
            key,
            location.hash,
        ) {
            return Err(self.reject_overflow(err, key));
        }

        let old_depth = location.local_depth;
        let new_depth = old_depth + 1;
        if old_depth >= location.global_depth {
            if location.global_depth >= self.config.max_global_depth {
                let err = ExhashError::HashExhausted {
                    depth: location.global_depth,
                };
                return Err(self.reject_overflow(err, key));
            }
            self.directory.double_global_depth(&self.tx)?;
            record_doubling();
        }

        let old_suffix = location.bucket_suffix()?;
        let sibling = BucketHandle::for_suffix(&self.index_name, &format!("1{old_suffix}"));
        self.directory.reassign_local_depth(
            &self.tx,
            &location.handle,
            old_depth,
            new_depth,
            &sibling,
        )?;

        let bucket = self
            .bucket
            .as_mut()
            .ok_or_else(|| ExhashError::internal("bucket closed during split"))?;
        let partition = bucket.split(&self.hasher, new_depth)?;
        if partition.len() != snapshot.len() {
            return Err(ExhashError::internal(format!(
                "split of {} saw {} records, snapshot had {}",
                location.handle,
                partition.len(),
                snapshot.len()
            )));
        }
        self.close_bucket();
        for record in &partition.moved {
            self.place(&record.key, record.row_locator)?;
        }
        record_split();
        info!(
            index = %self.index_name,
            bucket = %location.handle,
            sibling = %sibling,
            new_local_depth = new_depth,
            retained = partition.retained.len(),
            moved = partition.moved.len(),
            "split bucket"
        );
        Ok(())
    }

    /// Leave the index positioned on `key` with the bucket scan rewound.
    fn rewind_to(&mut self, key: &Constant) -> Result<()> {
        if let Some(bucket) = self.bucket.as_mut() {
            bucket.before_first()?;
        }
        self.state = CursorState::Positioned { key: key.clone() };
        Ok(())
    }
}

impl<T: Transaction, H: KeyHasher> Index for HashIndex<T, H> {
    fn position(&mut self, key: &Constant) -> Result<()> {
        self.close_bucket();
        let hash = self.hasher.hash_key(key);
        let location = self.directory.lookup(&self.tx, hash)?;
        let bucket = self.open_bucket(location.handle.clone(), location.local_depth)?;
        self.bucket = Some(bucket);
        self.location = Some(location);
        self.state = CursorState::Positioned { key: key.clone() };
        record_operation(IndexOpType::Lookup);
        Ok(())
    }

    fn next(&mut self) -> Result<bool> {
        let key = match &self.state {
            CursorState::Closed => return Err(ExhashError::NotPositioned),
            CursorState::Positioned { key } | CursorState::Iterating { key, .. } => key.clone(),
        };
        let bucket = self.bucket.as_mut().ok_or(ExhashError::NotPositioned)?;
        let current = bucket.next_matching(&key)?.map(|r| r.row_locator);
        let found = current.is_some();
        self.state = CursorState::Iterating { key, current };
        Ok(found)
    }

    fn current_locator(&self) -> Result<RowLocator> {
        match &self.state {
            CursorState::Iterating {
                current: Some(locator),
                ..
            } => Ok(*locator),
            _ => Err(ExhashError::NotPositioned),
        }
    }

    fn insert(&mut self, key: &Constant, locator: RowLocator) -> Result<()> {
        for _ in 0..=HASH_WIDTH_BITS {
            self.position(key)?;
            let (bucket, location) = self.positioned_bucket()?;
            if bucket.insert(key, locator)? == InsertOutcome::Inserted {
                record_operation(IndexOpType::Insert);
                debug!(
                    index = %self.index_name,
                    key = %key,
                    locator = %locator,
                    bucket = %location.handle,
                    "index insert"
                );
                return self.rewind_to(key);
            }
            self.split_positioned_bucket(key)?;
        }
        let depth = self.global_depth()?;
        Err(self.reject_overflow(ExhashError::HashExhausted { depth }, key))
    }

    fn delete(&mut self, key: &Constant, locator: RowLocator) -> Result<()> {
        self.position(key)?;
        let (bucket, location) = self.positioned_bucket()?;
        let mut removed = false;
        while let Some(record) = bucket.next_matching(key)? {
            if record.row_locator == locator {
                bucket.delete_current()?;
                removed = true;
                break;
            }
        }
        if removed {
            record_operation(IndexOpType::Delete);
            debug!(
                index = %self.index_name,
                key = %key,
                locator = %locator,
                bucket = %location.handle,
                "index delete"
            );
        }
        self.rewind_to(key)
    }

    fn close(&mut self) {
        self.close_bucket();
        self.directory.close();
    }
}

impl<T: Transaction, H: KeyHasher> Drop for HashIndex<T, H> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Decide whether splitting can ever make room for `key` in a bucket holding
/// `snapshot`. Returns the error to report when it cannot.
fn classify_overflow<H: KeyHasher + ?Sized>(
    hasher: &H,
    capacity: usize,
    snapshot: &[BucketRecord],
    key: &Constant,
    hash: HashCode,
) -> Option<ExhashError> {
    if snapshot.iter().all(|r| r.key == *key) {
        return Some(ExhashError::DuplicateKeyOverflow {
            key: key.to_string(),
            capacity,
        });
    }
    if snapshot.iter().all(|r| hasher.hash_key(&r.key) == hash) {
        return Some(ExhashError::HashExhausted {
            depth: HASH_WIDTH_BITS,
        });
    }
    None
}

/// Blocks read by one lookup when `num_blocks` index blocks are spread over
/// `bucket_count` buckets. Never less than one.
#[must_use]
pub fn estimate_search_cost(num_blocks: u64, bucket_count: usize) -> u64 {
    let buckets = (bucket_count as u64).max(1);
    num_blocks.div_ceil(buckets).max(1)
}

/// Catalog description of a hash index, enough to reopen it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub index_name: String,
    pub key_type: FieldType,
    #[serde(default)]
    pub config: HashIndexConfig,
}

impl IndexDescriptor {
    #[must_use]
    pub fn new(index_name: impl Into<String>, key_type: FieldType) -> Self {
        Self {
            index_name: index_name.into(),
            key_type,
            config: HashIndexConfig::default(),
        }
    }

    #[must_use]
    pub const fn with_config(mut self, config: HashIndexConfig) -> Self {
        self.config = config;
        self
    }

    /// Open the described index inside `tx`.
    pub fn open<T: Transaction>(&self, tx: T) -> Result<HashIndex<T>> {
        HashIndex::open(tx, &self.index_name, self.key_type, self.config)
    }
}
