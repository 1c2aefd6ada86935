//! Persistent directory of an extensible hash index.
//!
//! The directory is one record file, `"{index}.dir"`, holding a sentinel row
//! (`id == "global"`, `depth` = global depth) and `2^global_depth` entries
//! mapping a bit-suffix id to a bucket handle and that bucket's local depth.
//!
//! Doubling never rewrites the live file in place: the doubled entry set is
//! written to a staging file and exchanged with the live file through one
//! [`Transaction::swap_files`] call.

use std::collections::BTreeMap;
use std::fmt;

use exhash_error::{ExhashError, Result};
use exhash_record::{TableScan, Transaction};
use exhash_types::{Schema, TableInfo};
use tracing::{debug, error, info};

use crate::hash::{HASH_WIDTH_BITS, HashCode};

/// Id of the row carrying the global depth.
pub const GLOBAL_SENTINEL_ID: &str = "global";

pub(crate) const ID_FIELD: &str = "id";
pub(crate) const FILENAME_FIELD: &str = "filename";
pub(crate) const DEPTH_FIELD: &str = "depth";

/// Width of the `id` column; a full 32-bit suffix must fit.
pub const ID_FIELD_WIDTH: usize = 32;
/// Width of the `filename` column.
pub const FILENAME_FIELD_WIDTH: usize = 64;

/// Global depth a fresh directory starts with.
pub const INITIAL_GLOBAL_DEPTH: u32 = 1;

/// Schema of every directory record file.
#[must_use]
pub fn directory_schema() -> Schema {
    let mut sch = Schema::new();
    sch.add_string_field(ID_FIELD, ID_FIELD_WIDTH)
        .add_string_field(FILENAME_FIELD, FILENAME_FIELD_WIDTH)
        .add_int_field(DEPTH_FIELD);
    sch
}

/// Live directory file of `index_name`.
#[must_use]
pub fn directory_table(index_name: &str) -> TableInfo {
    TableInfo::new(format!("{index_name}.dir"), directory_schema())
}

fn staging_table(index_name: &str) -> TableInfo {
    TableInfo::new(format!("{index_name}.dir.next"), directory_schema())
}

/// Name of the record file backing one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketHandle(String);

impl BucketHandle {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Handle of the bucket created for `suffix` in `index_name`.
    #[must_use]
    pub fn for_suffix(index_name: &str, suffix: &str) -> Self {
        Self(format!("{index_name}.eh{suffix}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BucketHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One directory row other than the sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub bucket_id: String,
    pub bucket_handle: BucketHandle,
    pub local_depth: u32,
}

/// Result of resolving a hash through the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketLocation {
    pub handle: BucketHandle,
    pub local_depth: u32,
    pub global_depth: u32,
    pub hash: HashCode,
}

impl BucketLocation {
    /// The bucket's own suffix: the low `local_depth` bits of the hash.
    pub fn bucket_suffix(&self) -> Result<String> {
        self.hash.suffix(self.local_depth)
    }
}

/// Raw directory contents: global depth plus every entry.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DirectoryImage {
    global_depth: u32,
    entries: Vec<DirectoryEntry>,
}

/// Handle on the directory of one index inside a transaction.
///
/// Owns at most one open scan over the live directory file; `close` (or
/// dropping the value) releases it.
pub struct Directory<T: Transaction> {
    index_name: String,
    table: TableInfo,
    scan: Option<T::Scan>,
}

impl<T: Transaction> fmt::Debug for Directory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Directory")
            .field("index_name", &self.index_name)
            .field("scan_open", &self.scan.is_some())
            .finish_non_exhaustive()
    }
}

impl<T: Transaction> Directory<T> {
    /// Open the directory of `index_name`, creating the initial two-entry
    /// directory when the file is empty.
    ///
    /// # Errors
    /// Returns `DirectoryCorrupt` if the file holds entries but no sentinel.
    pub fn open(tx: &T, index_name: &str) -> Result<Self> {
        let mut dir = Self {
            index_name: index_name.to_owned(),
            table: directory_table(index_name),
            scan: None,
        };
        let mut has_rows = false;
        let mut has_sentinel = false;
        {
            let scan = dir.scan(tx)?;
            while scan.next()? {
                has_rows = true;
                if scan.get_string(ID_FIELD)? == GLOBAL_SENTINEL_ID {
                    has_sentinel = true;
                    break;
                }
            }
        }
        if !has_sentinel {
            if has_rows {
                error!(index = %dir.index_name, "directory has entries but no sentinel row");
                return Err(ExhashError::directory_corrupt(format!(
                    "{}: sentinel row missing",
                    dir.table.name()
                )));
            }
            dir.bootstrap(tx)?;
        }
        Ok(dir)
    }

    /// Scan over the live file, rewound to before the first row.
    fn scan(&mut self, tx: &T) -> Result<&mut T::Scan> {
        let scan = match &mut self.scan {
            Some(scan) => scan,
            slot @ None => slot.insert(tx.open_scan(&self.table)?),
        };
        scan.before_first()?;
        Ok(scan)
    }

    fn bootstrap(&mut self, tx: &T) -> Result<()> {
        let index_name = self.index_name.clone();
        let scan = self.scan(tx)?;
        write_row(scan, GLOBAL_SENTINEL_ID, "", INITIAL_GLOBAL_DEPTH)?;
        for id in ["0", "1"] {
            let handle = BucketHandle::for_suffix(&index_name, id);
            write_row(scan, id, handle.as_str(), INITIAL_GLOBAL_DEPTH)?;
        }
        info!(
            index = %index_name,
            global_depth = INITIAL_GLOBAL_DEPTH,
            "created extensible hash directory"
        );
        Ok(())
    }

    fn read_image(&mut self, tx: &T) -> Result<DirectoryImage> {
        let file = self.table.name().to_owned();
        let scan = self.scan(tx)?;
        let mut global_depth = None;
        let mut entries = Vec::new();
        while scan.next()? {
            let id = scan.get_string(ID_FIELD)?;
            let depth = read_depth(scan, &file)?;
            if id == GLOBAL_SENTINEL_ID {
                global_depth = Some(depth);
            } else {
                entries.push(DirectoryEntry {
                    bucket_id: id,
                    bucket_handle: BucketHandle::new(scan.get_string(FILENAME_FIELD)?),
                    local_depth: depth,
                });
            }
        }
        let Some(global_depth) = global_depth else {
            error!(index = %self.index_name, "sentinel row missing");
            return Err(ExhashError::directory_corrupt(format!(
                "{file}: sentinel row missing"
            )));
        };
        Ok(DirectoryImage {
            global_depth,
            entries,
        })
    }

    /// Current global depth, read from the sentinel row.
    pub fn global_depth(&mut self, tx: &T) -> Result<u32> {
        let file = self.table.name().to_owned();
        let scan = self.scan(tx)?;
        while scan.next()? {
            if scan.get_string(ID_FIELD)? == GLOBAL_SENTINEL_ID {
                return read_depth(scan, &file);
            }
        }
        error!(index = %self.index_name, "sentinel row missing");
        Err(ExhashError::directory_corrupt(format!(
            "{file}: sentinel row missing"
        )))
    }

    /// Every entry except the sentinel, ordered by id.
    pub fn entries(&mut self, tx: &T) -> Result<Vec<DirectoryEntry>> {
        let mut entries = self.read_image(tx)?.entries;
        entries.sort_by(|a, b| a.bucket_id.cmp(&b.bucket_id));
        Ok(entries)
    }

    /// Number of distinct buckets referenced by the directory.
    pub fn bucket_count(&mut self, tx: &T) -> Result<usize> {
        let image = self.read_image(tx)?;
        let mut handles: Vec<&BucketHandle> =
            image.entries.iter().map(|e| &e.bucket_handle).collect();
        handles.sort();
        handles.dedup();
        Ok(handles.len())
    }

    /// Resolve `hash` to the bucket owning its low `global_depth` bits.
    ///
    /// # Errors
    /// Returns `DirectoryCorrupt` when no entry carries the suffix.
    pub fn lookup(&mut self, tx: &T, hash: HashCode) -> Result<BucketLocation> {
        let global_depth = self.global_depth(tx)?;
        let suffix = hash.suffix(global_depth)?;
        let file = self.table.name().to_owned();
        let scan = self.scan(tx)?;
        while scan.next()? {
            if scan.get_string(ID_FIELD)? == suffix {
                let location = BucketLocation {
                    handle: BucketHandle::new(scan.get_string(FILENAME_FIELD)?),
                    local_depth: read_depth(scan, &file)?,
                    global_depth,
                    hash,
                };
                debug!(
                    index = %self.index_name,
                    suffix = %suffix,
                    bucket = %location.handle,
                    local_depth = location.local_depth,
                    "directory lookup"
                );
                return Ok(location);
            }
        }
        error!(index = %self.index_name, suffix = %suffix, "no directory entry for suffix");
        Err(ExhashError::directory_corrupt(format!(
            "{file}: no entry for suffix {suffix}"
        )))
    }

    /// Double the directory: each entry `(id, h, d)` becomes `("0"+id, h, d)`
    /// and `("1"+id, h, d)`, and the global depth grows by one. Returns the
    /// new global depth.
    ///
    /// # Errors
    /// Returns `HashExhausted` when the directory already spans every hash
    /// bit.
    pub fn double_global_depth(&mut self, tx: &T) -> Result<u32> {
        let image = self.read_image(tx)?;
        if image.global_depth >= HASH_WIDTH_BITS {
            return Err(ExhashError::HashExhausted {
                depth: image.global_depth,
            });
        }
        let new_depth = image.global_depth + 1;

        let staging = staging_table(&self.index_name);
        tx.truncate_file(staging.name())?;
        let mut out = tx.open_scan(&staging)?;
        let written = write_doubled(&mut out, &image, new_depth);
        out.close();
        written?;

        tx.swap_files(self.table.name(), staging.name())?;
        tx.truncate_file(staging.name())?;

        info!(
            index = %self.index_name,
            old_depth = image.global_depth,
            new_depth,
            entries = image.entries.len() * 2,
            "doubled extensible hash directory"
        );
        Ok(new_depth)
    }

    /// Split the directory entries of one bucket between it and a sibling.
    ///
    /// Every entry pointing at `old_bucket_handle` must carry
    /// `old_local_depth`. Entries whose id has a `1` at bit position
    /// `new_local_depth` (counted from the right) move to `sibling_handle`;
    /// the rest keep the old handle. All of them get `new_local_depth`.
    /// Returns the number of entries repointed.
    ///
    /// # Errors
    /// Returns `Internal` unless `new_local_depth` is `old_local_depth + 1`
    /// and does not exceed the global depth. Returns `DirectoryCorrupt` if
    /// the entries of the bucket disagree on their depth or suffix.
    pub fn reassign_local_depth(
        &mut self,
        tx: &T,
        old_bucket_handle: &BucketHandle,
        old_local_depth: u32,
        new_local_depth: u32,
        sibling_handle: &BucketHandle,
    ) -> Result<usize> {
        let global_depth = self.global_depth(tx)?;
        if new_local_depth != old_local_depth + 1 || new_local_depth > global_depth {
            return Err(ExhashError::internal(format!(
                "cannot raise local depth {old_local_depth} to {new_local_depth} \
                 under global depth {global_depth}"
            )));
        }

        let file = self.table.name().to_owned();
        let index_name = self.index_name.clone();
        let bit_at = global_depth as usize - new_local_depth as usize;
        let mut old_suffix: Option<String> = None;
        let mut kept = 0_usize;
        let mut moved = 0_usize;

        let scan = self.scan(tx)?;
        while scan.next()? {
            let id = scan.get_string(ID_FIELD)?;
            if id == GLOBAL_SENTINEL_ID {
                continue;
            }
            if scan.get_string(FILENAME_FIELD)? != old_bucket_handle.as_str() {
                continue;
            }
            let depth = read_depth(scan, &file)?;
            if depth != old_local_depth || id.len() != global_depth as usize {
                error!(
                    index = %index_name,
                    id = %id,
                    depth,
                    "directory entry disagrees with bucket"
                );
                return Err(ExhashError::directory_corrupt(format!(
                    "{file}: entry {id} of {old_bucket_handle} has depth {depth}, \
                     expected {old_local_depth}"
                )));
            }
            let suffix = &id[id.len() - old_local_depth as usize..];
            match &old_suffix {
                Some(expected) if expected != suffix => {
                    error!(index = %index_name, id = %id, "bucket entries do not share a suffix");
                    return Err(ExhashError::directory_corrupt(format!(
                        "{file}: entries of {old_bucket_handle} end in both {expected} \
                         and {suffix}"
                    )));
                }
                Some(_) => {}
                None => old_suffix = Some(suffix.to_owned()),
            }
            if id.as_bytes()[bit_at] == b'1' {
                scan.set_string(FILENAME_FIELD, sibling_handle.as_str())?;
                moved += 1;
            } else {
                kept += 1;
            }
            scan.set_int(DEPTH_FIELD, i64::from(new_local_depth))?;
        }

        if kept == 0 || moved == 0 {
            error!(
                index = %index_name,
                bucket = %old_bucket_handle,
                kept,
                moved,
                "split left one side empty"
            );
            return Err(ExhashError::directory_corrupt(format!(
                "{file}: {old_bucket_handle} has no entries on one side of bit {new_local_depth}"
            )));
        }
        debug!(
            index = %index_name,
            bucket = %old_bucket_handle,
            sibling = %sibling_handle,
            new_local_depth,
            kept,
            moved,
            "reassigned directory entries"
        );
        Ok(moved)
    }

    /// Verify the structural invariants of the directory.
    ///
    /// Checks the entry count, id widths, local depth bounds, that every
    /// bucket is referenced by exactly `2^(global - local)` entries, and
    /// that those entries share the bucket's suffix.
    pub fn check_invariants(&mut self, tx: &T) -> Result<()> {
        let image = self.read_image(tx)?;
        let file = self.table.name().to_owned();
        let g = image.global_depth;
        if g == 0 || g > HASH_WIDTH_BITS {
            return Err(ExhashError::directory_corrupt(format!(
                "{file}: global depth {g} out of range"
            )));
        }
        let expected = 1_usize << g;
        if image.entries.len() != expected {
            return Err(ExhashError::directory_corrupt(format!(
                "{file}: {} entries at global depth {g}, expected {expected}",
                image.entries.len()
            )));
        }

        let mut buckets: BTreeMap<&BucketHandle, (u32, String, usize)> = BTreeMap::new();
        let mut seen_ids: Vec<&str> = Vec::with_capacity(image.entries.len());
        for entry in &image.entries {
            let id = entry.bucket_id.as_str();
            if id.len() != g as usize || !id.bytes().all(|b| b == b'0' || b == b'1') {
                return Err(ExhashError::directory_corrupt(format!(
                    "{file}: malformed entry id {id:?} at global depth {g}"
                )));
            }
            let d = entry.local_depth;
            if d == 0 || d > g {
                return Err(ExhashError::directory_corrupt(format!(
                    "{file}: entry {id} has local depth {d} outside 1..={g}"
                )));
            }
            let suffix = &id[id.len() - d as usize..];
            let slot = buckets
                .entry(&entry.bucket_handle)
                .or_insert_with(|| (d, suffix.to_owned(), 0));
            if slot.0 != d || slot.1 != suffix {
                return Err(ExhashError::directory_corrupt(format!(
                    "{file}: entries of {} disagree on depth or suffix",
                    entry.bucket_handle
                )));
            }
            slot.2 += 1;
            seen_ids.push(id);
        }
        seen_ids.sort_unstable();
        seen_ids.dedup();
        if seen_ids.len() != expected {
            return Err(ExhashError::directory_corrupt(format!(
                "{file}: duplicate entry ids"
            )));
        }
        for (handle, (d, _, refs)) in &buckets {
            let want = 1_usize << (g - d);
            if *refs != want {
                return Err(ExhashError::directory_corrupt(format!(
                    "{file}: {handle} referenced {refs} times, expected {want}"
                )));
            }
        }
        Ok(())
    }

    /// Release the directory scan. Idempotent.
    pub fn close(&mut self) {
        if let Some(mut scan) = self.scan.take() {
            scan.close();
        }
    }
}

impl<T: Transaction> Drop for Directory<T> {
    fn drop(&mut self) {
        self.close();
    }
}

fn write_row<S: TableScan>(scan: &mut S, id: &str, filename: &str, depth: u32) -> Result<()> {
    scan.insert()?;
    scan.set_string(ID_FIELD, id)?;
    scan.set_string(FILENAME_FIELD, filename)?;
    scan.set_int(DEPTH_FIELD, i64::from(depth))
}

fn write_doubled<S: TableScan>(out: &mut S, image: &DirectoryImage, new_depth: u32) -> Result<()> {
    write_row(out, GLOBAL_SENTINEL_ID, "", new_depth)?;
    for entry in &image.entries {
        for bit in ['0', '1'] {
            let id = format!("{bit}{}", entry.bucket_id);
            write_row(out, &id, entry.bucket_handle.as_str(), entry.local_depth)?;
        }
    }
    Ok(())
}

fn read_depth<S: TableScan>(scan: &S, file: &str) -> Result<u32> {
    let raw = scan.get_int(DEPTH_FIELD)?;
    u32::try_from(raw)
        .ok()
        .filter(|d| *d <= HASH_WIDTH_BITS)
        .ok_or_else(|| ExhashError::directory_corrupt(format!("{file}: depth {raw} out of range")))
}

#[cfg(test)]
mod tests {
    use exhash_record::{MemoryStore, MemoryTransaction, TransactionMode};

    use super::*;

    fn writer() -> (MemoryStore, MemoryTransaction) {
        let store = MemoryStore::new();
        let tx = store.begin(TransactionMode::Immediate).unwrap();
        (store, tx)
    }

    #[test]
    fn test_open_bootstraps_two_entries() {
        let (_store, tx) = writer();
        let mut dir = Directory::open(&tx, "idx").unwrap();
        assert_eq!(dir.global_depth(&tx).unwrap(), 1);
        let entries = dir.entries(&tx).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].bucket_id, "0");
        assert_eq!(entries[0].bucket_handle.as_str(), "idx.eh0");
        assert_eq!(entries[1].bucket_handle.as_str(), "idx.eh1");
        assert!(entries.iter().all(|e| e.local_depth == 1));
        assert_eq!(dir.bucket_count(&tx).unwrap(), 2);
        dir.check_invariants(&tx).unwrap();
        assert_eq!(tx.record_count("idx.dir").unwrap(), 3);
    }

    #[test]
    fn test_reopen_does_not_bootstrap_again() {
        let (_store, tx) = writer();
        drop(Directory::open(&tx, "idx").unwrap());
        let mut dir = Directory::open(&tx, "idx").unwrap();
        assert_eq!(dir.entries(&tx).unwrap().len(), 2);
        assert_eq!(tx.record_count("idx.dir").unwrap(), 3);
    }

    #[test]
    fn test_lookup_uses_low_bits() {
        let (_store, tx) = writer();
        let mut dir = Directory::open(&tx, "idx").unwrap();
        let loc = dir.lookup(&tx, HashCode::new(0b1011)).unwrap();
        assert_eq!(loc.handle.as_str(), "idx.eh1");
        assert_eq!(loc.local_depth, 1);
        assert_eq!(loc.global_depth, 1);
        assert_eq!(loc.bucket_suffix().unwrap(), "1");
        let loc = dir.lookup(&tx, HashCode::new(0b1010)).unwrap();
        assert_eq!(loc.handle.as_str(), "idx.eh0");
    }

    #[test]
    fn test_doubling_duplicates_entries() {
        let (_store, tx) = writer();
        let mut dir = Directory::open(&tx, "idx").unwrap();
        assert_eq!(dir.double_global_depth(&tx).unwrap(), 2);
        let entries = dir.entries(&tx).unwrap();
        let ids: Vec<&str> = entries.iter().map(|e| e.bucket_id.as_str()).collect();
        assert_eq!(ids, ["00", "01", "10", "11"]);
        // "01" and "11" both still point at the suffix-1 bucket.
        assert_eq!(entries[1].bucket_handle, entries[3].bucket_handle);
        assert!(entries.iter().all(|e| e.local_depth == 1));
        assert_eq!(dir.bucket_count(&tx).unwrap(), 2);
        dir.check_invariants(&tx).unwrap();
        assert_eq!(tx.record_count("idx.dir.next").unwrap(), 0);

        let before = dir.lookup(&tx, HashCode::new(0b0111)).unwrap();
        assert_eq!(before.handle.as_str(), "idx.eh1");
        assert_eq!(before.global_depth, 2);
    }

    #[test]
    fn test_reassign_moves_upper_half() {
        let (_store, tx) = writer();
        let mut dir = Directory::open(&tx, "idx").unwrap();
        dir.double_global_depth(&tx).unwrap();
        let old = BucketHandle::for_suffix("idx", "1");
        let sibling = BucketHandle::for_suffix("idx", "11");
        let moved = dir.reassign_local_depth(&tx, &old, 1, 2, &sibling).unwrap();
        assert_eq!(moved, 1);
        let entries = dir.entries(&tx).unwrap();
        assert_eq!(entries[1].bucket_handle, old);
        assert_eq!(entries[1].local_depth, 2);
        assert_eq!(entries[3].bucket_handle, sibling);
        assert_eq!(entries[3].local_depth, 2);
        assert_eq!(entries[0].local_depth, 1);
        assert_eq!(dir.bucket_count(&tx).unwrap(), 3);
        dir.check_invariants(&tx).unwrap();
    }

    #[test]
    fn test_reassign_requires_room_in_directory() {
        let (_store, tx) = writer();
        let mut dir = Directory::open(&tx, "idx").unwrap();
        let old = BucketHandle::for_suffix("idx", "1");
        let sibling = BucketHandle::for_suffix("idx", "11");
        let err = dir
            .reassign_local_depth(&tx, &old, 1, 2, &sibling)
            .unwrap_err();
        assert!(matches!(err, ExhashError::Internal(_)), "got {err:?}");
    }

    #[test]
    fn test_missing_sentinel_is_corrupt() {
        let (_store, tx) = writer();
        let mut scan = tx.open_scan(&directory_table("idx")).unwrap();
        write_row(&mut scan, "0", "idx.eh0", 1).unwrap();
        scan.close();
        let err = Directory::open(&tx, "idx").unwrap_err();
        assert!(err.is_corruption(), "got {err:?}");
    }

    #[test]
    fn test_lookup_without_entry_is_corrupt() {
        let (_store, tx) = writer();
        let mut dir = Directory::open(&tx, "idx").unwrap();
        let mut scan = tx.open_scan(&directory_table("idx")).unwrap();
        while scan.next().unwrap() {
            if scan.get_string(ID_FIELD).unwrap() == "1" {
                scan.delete().unwrap();
            }
        }
        scan.close();
        let err = dir.lookup(&tx, HashCode::new(1)).unwrap_err();
        assert!(err.is_corruption(), "got {err:?}");
        assert!(dir.check_invariants(&tx).is_err());
    }

    #[test]
    fn test_doubling_rolls_back_with_transaction() {
        let store = MemoryStore::new();
        let tx = store.begin(TransactionMode::Immediate).unwrap();
        drop(Directory::open(&tx, "idx").unwrap());
        tx.commit().unwrap();

        let tx = store.begin(TransactionMode::Immediate).unwrap();
        let mut dir = Directory::open(&tx, "idx").unwrap();
        dir.double_global_depth(&tx).unwrap();
        dir.close();
        tx.rollback().unwrap();

        let tx = store.begin(TransactionMode::ReadOnly).unwrap();
        let mut dir = Directory::open(&tx, "idx").unwrap();
        assert_eq!(dir.global_depth(&tx).unwrap(), 1);
        assert_eq!(dir.entries(&tx).unwrap().len(), 2);
    }

    #[test]
    fn test_debug_shows_index_and_scan_state() {
        let (_store, tx) = writer();
        let mut dir = Directory::open(&tx, "idx").unwrap();
        let shown = format!("{dir:?}");
        assert!(shown.contains("\"idx\""), "{shown}");
        assert!(shown.contains("scan_open: true"), "{shown}");
        assert!(shown.ends_with(".. }"), "{shown}");
        dir.close();
        assert!(format!("{dir:?}").contains("scan_open: false"));
    }

    #[test]
    fn test_close_is_idempotent() {
        let (_store, tx) = writer();
        let mut dir = Directory::open(&tx, "idx").unwrap();
        dir.close();
        dir.close();
        assert_eq!(dir.global_depth(&tx).unwrap(), 1);
    }
}
