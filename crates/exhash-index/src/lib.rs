//! Extensible hashing secondary index.
//!
//! A [`HashIndex`] maps search keys to the row locators of data records. It
//! persists as a directory record file plus one record file per bucket, all
//! accessed through an [`exhash_record::Transaction`]. When a bucket
//! overflows it is split in two, doubling the directory first if needed, so
//! lookups always touch exactly one bucket.

pub mod bucket;
pub mod config;
pub mod directory;
pub mod hash;
pub mod index;
pub mod instrumentation;

pub use bucket::{Bucket, BucketRecord, InsertOutcome, SplitPartition};
pub use config::{DEFAULT_BUCKET_CAPACITY, HashIndexConfig, MAX_INDEX_NAME_LEN};
pub use directory::{BucketHandle, BucketLocation, Directory, DirectoryEntry};
pub use hash::{HASH_WIDTH_BITS, HashCode, KeyHasher, Xxh3KeyHasher, hash_key};
pub use index::{HashIndex, Index, IndexDescriptor, estimate_search_cost};
pub use instrumentation::{
    HashIndexMetricsSnapshot, IndexOpType, hash_index_metrics_snapshot, reset_hash_index_metrics,
};
