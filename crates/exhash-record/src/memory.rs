//! In-memory single-writer transactional record store.
//!
//! `MemoryStore` keeps the committed image of every record file. Each
//! `MemoryTransaction` copies a file into its private write set on first
//! write and publishes the write set on `commit`; `rollback` discards it.
//! At most one writer is active at a time.

use std::sync::Arc;

use exhash_error::{ExhashError, Result};
use exhash_types::{Constant, FieldType, RowLocator, TableInfo};
use hashbrown::HashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::record_file::RecordFile;
use crate::traits::{TableScan, Transaction, TransactionMode};

/// Default block size in bytes.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Store-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Block size used to derive slots per block for each record file.
    pub block_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

/// Committed state shared by all transactions.
#[derive(Debug)]
struct StoreInner {
    files: HashMap<String, RecordFile>,
    writer_active: bool,
    config: StoreConfig,
}

/// Shared handle to the committed record files.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    #[must_use]
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                files: HashMap::new(),
                writer_active: false,
                config,
            })),
        }
    }

    #[must_use]
    pub fn config(&self) -> StoreConfig {
        self.inner.lock().config
    }

    /// Start a transaction.
    ///
    /// # Errors
    /// Returns `Busy` if `mode` is `Immediate` and another writer is active.
    pub fn begin(&self, mode: TransactionMode) -> Result<MemoryTransaction> {
        let mut inner = self.inner.lock();
        let eager_writer = mode == TransactionMode::Immediate;
        if eager_writer && inner.writer_active {
            return Err(ExhashError::Busy);
        }
        if eager_writer {
            inner.writer_active = true;
        }
        let block_size = inner.config.block_size;
        drop(inner);

        debug!(?mode, "transaction started");
        Ok(MemoryTransaction {
            inner: Arc::new(Mutex::new(TxnInner {
                store: Arc::clone(&self.inner),
                write_set: HashMap::new(),
                mode,
                is_writer: eager_writer,
                finished: false,
                block_size,
            })),
        })
    }

    /// Number of committed records in `name`; zero for unknown files.
    #[must_use]
    pub fn record_count(&self, name: &str) -> usize {
        self.inner
            .lock()
            .files
            .get(name)
            .map_or(0, RecordFile::record_count)
    }
}

#[derive(Debug)]
struct TxnInner {
    store: Arc<Mutex<StoreInner>>,
    write_set: HashMap<String, RecordFile>,
    mode: TransactionMode,
    is_writer: bool,
    finished: bool,
    block_size: usize,
}

impl TxnInner {
    fn ensure_active(&self) -> Result<()> {
        if self.finished {
            return Err(ExhashError::NoActiveTransaction);
        }
        Ok(())
    }

    fn ensure_writer(&mut self) -> Result<()> {
        self.ensure_active()?;
        if self.is_writer {
            return Ok(());
        }
        match self.mode {
            TransactionMode::ReadOnly => Err(ExhashError::ReadOnly),
            TransactionMode::Deferred => {
                let mut store = self.store.lock();
                if store.writer_active {
                    return Err(ExhashError::Busy);
                }
                store.writer_active = true;
                drop(store);
                self.is_writer = true;
                Ok(())
            }
            TransactionMode::Immediate => {
                Err(ExhashError::internal("writer transaction lost writer role"))
            }
        }
    }

    /// Run `f` against the transaction's view of `name`.
    fn read<R>(&self, name: &str, f: impl FnOnce(Option<&RecordFile>) -> R) -> Result<R> {
        self.ensure_active()?;
        if let Some(file) = self.write_set.get(name) {
            return Ok(f(Some(file)));
        }
        let store = self.store.lock();
        Ok(f(store.files.get(name)))
    }

    /// Private copy of `name`, created from the committed image on first use.
    fn write(&mut self, name: &str, slots_per_block: usize) -> Result<&mut RecordFile> {
        self.ensure_writer()?;
        if !self.write_set.contains_key(name) {
            let committed = self.store.lock().files.get(name).cloned();
            let file = committed.unwrap_or_else(|| RecordFile::new(slots_per_block));
            self.write_set.insert(name.to_owned(), file);
        }
        self.write_set
            .get_mut(name)
            .ok_or_else(|| ExhashError::internal("write set lost a record file"))
    }

    fn known_slots_per_block(&self, name: &str) -> Option<usize> {
        self.write_set
            .get(name)
            .map(RecordFile::slots_per_block)
            .or_else(|| {
                self.store
                    .lock()
                    .files
                    .get(name)
                    .map(RecordFile::slots_per_block)
            })
    }

    fn release_writer(&mut self) {
        if self.is_writer {
            self.store.lock().writer_active = false;
            self.is_writer = false;
        }
    }
}

/// Transaction handle over a [`MemoryStore`]. Clones share one transaction.
#[derive(Debug, Clone)]
pub struct MemoryTransaction {
    inner: Arc<Mutex<TxnInner>>,
}

impl MemoryTransaction {
    /// Publish the write set. Idempotent once finished.
    pub fn commit(&self) -> Result<()> {
        let mut txn = self.inner.lock();
        if txn.finished {
            return Ok(());
        }
        let write_set = std::mem::take(&mut txn.write_set);
        let files = write_set.len();
        {
            let mut store = txn.store.lock();
            for (name, file) in write_set {
                store.files.insert(name, file);
            }
        }
        txn.release_writer();
        txn.finished = true;
        drop(txn);
        info!(files, "transaction committed");
        Ok(())
    }

    /// Discard the write set.
    pub fn rollback(&self) -> Result<()> {
        let mut txn = self.inner.lock();
        if txn.finished {
            return Ok(());
        }
        let discarded = txn.write_set.len();
        txn.write_set.clear();
        txn.release_writer();
        txn.finished = true;
        drop(txn);
        info!(discarded, "transaction rolled back");
        Ok(())
    }

    /// Number of records visible to this transaction in `name`.
    pub fn record_count(&self, name: &str) -> Result<usize> {
        self.inner
            .lock()
            .read(name, |file| file.map_or(0, RecordFile::record_count))
    }
}

impl Drop for TxnInner {
    fn drop(&mut self) {
        if !self.finished {
            self.release_writer();
        }
    }
}

impl Transaction for MemoryTransaction {
    type Scan = MemoryScan;

    fn open_scan(&self, table: &TableInfo) -> Result<MemoryScan> {
        let txn = self.inner.lock();
        txn.ensure_active()?;
        let slots_per_block = table.slots_per_block(txn.block_size)?;
        drop(txn);
        Ok(MemoryScan {
            txn: Arc::clone(&self.inner),
            table: table.clone(),
            slots_per_block,
            position: Position::BeforeFirst,
            closed: false,
        })
    }

    fn swap_files(&self, a: &str, b: &str) -> Result<()> {
        let mut txn = self.inner.lock();
        let spb = txn
            .known_slots_per_block(a)
            .or_else(|| txn.known_slots_per_block(b))
            .unwrap_or(1);
        txn.write(a, spb)?;
        txn.write(b, spb)?;
        let file_a = txn.write_set.remove(a);
        let file_b = txn.write_set.remove(b);
        match (file_a, file_b) {
            (Some(file_a), Some(file_b)) => {
                txn.write_set.insert(a.to_owned(), file_b);
                txn.write_set.insert(b.to_owned(), file_a);
            }
            _ => return Err(ExhashError::internal("write set lost a swapped file")),
        }
        drop(txn);
        debug!(a, b, "record files swapped");
        Ok(())
    }

    fn truncate_file(&self, name: &str) -> Result<()> {
        let mut txn = self.inner.lock();
        txn.ensure_writer()?;
        if let Some(spb) = txn.known_slots_per_block(name) {
            txn.write(name, spb)?.truncate();
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    BeforeFirst,
    At(usize),
    AfterLast,
}

/// Scan over one record file inside a [`MemoryTransaction`].
#[derive(Debug)]
pub struct MemoryScan {
    txn: Arc<Mutex<TxnInner>>,
    table: TableInfo,
    slots_per_block: usize,
    position: Position,
    closed: bool,
}

impl MemoryScan {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(ExhashError::ScanClosed {
                file: self.table.name().to_owned(),
            });
        }
        Ok(())
    }

    fn current(&self) -> Result<usize> {
        self.ensure_open()?;
        match self.position {
            Position::At(idx) => Ok(idx),
            Position::BeforeFirst | Position::AfterLast => Err(self.no_current()),
        }
    }

    fn no_current(&self) -> ExhashError {
        ExhashError::NoCurrentRecord {
            file: self.table.name().to_owned(),
        }
    }

    fn field(&self, field: &str) -> Result<(usize, FieldType)> {
        let schema = self.table.schema();
        match (schema.index_of(field), schema.field_type(field)) {
            (Some(pos), Some(ty)) => Ok((pos, ty)),
            _ => Err(ExhashError::UnknownField {
                file: self.table.name().to_owned(),
                field: field.to_owned(),
            }),
        }
    }

    fn read_field(&self, field: &str) -> Result<Constant> {
        let idx = self.current()?;
        let (pos, _) = self.field(field)?;
        let value = self
            .txn
            .lock()
            .read(self.table.name(), |file| {
                file.and_then(|f| f.get(idx)).map(|rec| rec[pos].clone())
            })?;
        value.ok_or_else(|| self.no_current())
    }

    fn write_field(&self, field: &str, value: Constant) -> Result<()> {
        let idx = self.current()?;
        let (pos, ty) = self.field(field)?;
        if !value.fits(ty) {
            return Err(match (&value, ty) {
                (Constant::Str(s), FieldType::Varchar(max)) => ExhashError::OutOfRange {
                    what: format!("{}.{field} (varchar({max}))", self.table.name()),
                    value: s.clone(),
                },
                _ => ExhashError::TypeMismatch {
                    expected: ty.name().to_owned(),
                    actual: value.type_name().to_owned(),
                },
            });
        }
        let mut txn = self.txn.lock();
        let file = txn.write(self.table.name(), self.slots_per_block)?;
        match file.get_mut(idx) {
            Some(rec) => {
                rec[pos] = value;
                Ok(())
            }
            None => Err(self.no_current()),
        }
    }
}

impl TableScan for MemoryScan {
    fn before_first(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.position = Position::BeforeFirst;
        Ok(())
    }

    fn next(&mut self) -> Result<bool> {
        self.ensure_open()?;
        let from = match self.position {
            Position::BeforeFirst => 0,
            Position::At(idx) => idx + 1,
            Position::AfterLast => return Ok(false),
        };
        let found = self
            .txn
            .lock()
            .read(self.table.name(), |file| file.and_then(|f| f.next_used(from)))?;
        if let Some(idx) = found {
            self.position = Position::At(idx);
            Ok(true)
        } else {
            self.position = Position::AfterLast;
            Ok(false)
        }
    }

    fn insert(&mut self) -> Result<()> {
        self.ensure_open()?;
        let mut txn = self.txn.lock();
        let file = txn.write(self.table.name(), self.slots_per_block)?;
        let idx = file.insert_default(self.table.schema());
        drop(txn);
        self.position = Position::At(idx);
        Ok(())
    }

    fn delete(&mut self) -> Result<()> {
        let idx = self.current()?;
        let mut txn = self.txn.lock();
        let file = txn.write(self.table.name(), self.slots_per_block)?;
        if file.delete(idx) {
            Ok(())
        } else {
            Err(self.no_current())
        }
    }

    fn get_int(&self, field: &str) -> Result<i64> {
        match self.read_field(field)? {
            Constant::Int(v) => Ok(v),
            other @ Constant::Str(_) => Err(ExhashError::TypeMismatch {
                expected: "int".to_owned(),
                actual: other.type_name().to_owned(),
            }),
        }
    }

    fn get_string(&self, field: &str) -> Result<String> {
        match self.read_field(field)? {
            Constant::Str(s) => Ok(s),
            other @ Constant::Int(_) => Err(ExhashError::TypeMismatch {
                expected: "varchar".to_owned(),
                actual: other.type_name().to_owned(),
            }),
        }
    }

    fn get_value(&self, field: &str) -> Result<Constant> {
        self.read_field(field)
    }

    fn set_int(&mut self, field: &str, value: i64) -> Result<()> {
        self.write_field(field, Constant::Int(value))
    }

    fn set_string(&mut self, field: &str, value: &str) -> Result<()> {
        self.write_field(field, Constant::Str(value.to_owned()))
    }

    fn set_value(&mut self, field: &str, value: &Constant) -> Result<()> {
        self.write_field(field, value.clone())
    }

    fn current_row_locator(&self) -> Result<RowLocator> {
        let idx = self.current()?;
        self.txn
            .lock()
            .read(self.table.name(), |file| {
                file.map_or_else(
                    || RecordFile::new(self.slots_per_block).locator_of(idx),
                    |f| f.locator_of(idx),
                )
            })?
    }

    fn move_to(&mut self, locator: RowLocator) -> Result<()> {
        self.ensure_open()?;
        let idx = self.txn.lock().read(self.table.name(), |file| {
            file.map_or_else(
                || {
                    Err(ExhashError::OutOfRange {
                        what: "row locator".to_owned(),
                        value: locator.to_string(),
                    })
                },
                |f| f.index_of(locator),
            )
        })??;
        self.position = Position::At(idx);
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
