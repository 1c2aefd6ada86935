//! Hash index observability counters.
//!
//! Process-local totals for lookups, mutations and structural changes.
//! Counters are monotone between resets and shared by every index in the
//! process.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Index operation kinds tracked by the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexOpType {
    /// `position` on a search key.
    Lookup,
    /// Completed insert.
    Insert,
    /// Delete that removed a record.
    Delete,
}

impl IndexOpType {
    /// Stable label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lookup => "lookup",
            Self::Insert => "insert",
            Self::Delete => "delete",
        }
    }
}

/// Snapshot of the index counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct HashIndexMetricsSnapshot {
    pub lookups_total: u64,
    pub inserts_total: u64,
    pub deletes_total: u64,
    /// Bucket splits, one per overflow resolved.
    pub bucket_splits_total: u64,
    /// Directory doublings.
    pub directory_doublings_total: u64,
    /// Inserts rejected with `DuplicateKeyOverflow` or `HashExhausted`.
    pub overflow_rejections_total: u64,
}

static LOOKUPS_TOTAL: AtomicU64 = AtomicU64::new(0);
static INSERTS_TOTAL: AtomicU64 = AtomicU64::new(0);
static DELETES_TOTAL: AtomicU64 = AtomicU64::new(0);
static BUCKET_SPLITS_TOTAL: AtomicU64 = AtomicU64::new(0);
static DIRECTORY_DOUBLINGS_TOTAL: AtomicU64 = AtomicU64::new(0);
static OVERFLOW_REJECTIONS_TOTAL: AtomicU64 = AtomicU64::new(0);

pub(crate) fn record_operation(op_type: IndexOpType) {
    let counter = match op_type {
        IndexOpType::Lookup => &LOOKUPS_TOTAL,
        IndexOpType::Insert => &INSERTS_TOTAL,
        IndexOpType::Delete => &DELETES_TOTAL,
    };
    counter.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_split() {
    BUCKET_SPLITS_TOTAL.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_doubling() {
    DIRECTORY_DOUBLINGS_TOTAL.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_overflow_rejection() {
    OVERFLOW_REJECTIONS_TOTAL.fetch_add(1, Ordering::Relaxed);
}

/// Return a snapshot of the index counters.
#[must_use]
pub fn hash_index_metrics_snapshot() -> HashIndexMetricsSnapshot {
    HashIndexMetricsSnapshot {
        lookups_total: LOOKUPS_TOTAL.load(Ordering::Relaxed),
        inserts_total: INSERTS_TOTAL.load(Ordering::Relaxed),
        deletes_total: DELETES_TOTAL.load(Ordering::Relaxed),
        bucket_splits_total: BUCKET_SPLITS_TOTAL.load(Ordering::Relaxed),
        directory_doublings_total: DIRECTORY_DOUBLINGS_TOTAL.load(Ordering::Relaxed),
        overflow_rejections_total: OVERFLOW_REJECTIONS_TOTAL.load(Ordering::Relaxed),
    }
}

/// Reset all index counters.
pub fn reset_hash_index_metrics() {
    LOOKUPS_TOTAL.store(0, Ordering::Relaxed);
    INSERTS_TOTAL.store(0, Ordering::Relaxed);
    DELETES_TOTAL.store(0, Ordering::Relaxed);
    BUCKET_SPLITS_TOTAL.store(0, Ordering::Relaxed);
    DIRECTORY_DOUBLINGS_TOTAL.store(0, Ordering::Relaxed);
    OVERFLOW_REJECTIONS_TOTAL.store(0, Ordering::Relaxed);
}
