//! Collaborator contract between the index and the record store.

use exhash_error::Result;
use exhash_types::{Constant, RowLocator, TableInfo};

/// Transaction mode requested at begin time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionMode {
    /// Reads only; any write fails with `ReadOnly`.
    ReadOnly,
    /// Starts as a reader and takes the writer role on the first write.
    Deferred,
    /// Takes the writer role immediately.
    Immediate,
}

/// Cursor over the records of one record file.
///
/// A freshly opened scan is positioned before the first record. Field
/// accessors act on the current record, which is the one most recently
/// reached by `next`, `insert` or `move_to`.
pub trait TableScan {
    /// Position before the first record.
    fn before_first(&mut self) -> Result<()>;

    /// Advance to the next record; `false` once the file is exhausted.
    fn next(&mut self) -> Result<bool>;

    /// Create a new record with default field values and make it current.
    fn insert(&mut self) -> Result<()>;

    /// Delete the current record. The scan stays between its neighbours so
    /// a following `next` continues with the record after it.
    fn delete(&mut self) -> Result<()>;

    fn get_int(&self, field: &str) -> Result<i64>;

    fn get_string(&self, field: &str) -> Result<String>;

    fn get_value(&self, field: &str) -> Result<Constant>;

    fn set_int(&mut self, field: &str, value: i64) -> Result<()>;

    fn set_string(&mut self, field: &str, value: &str) -> Result<()>;

    fn set_value(&mut self, field: &str, value: &Constant) -> Result<()>;

    /// Locator of the current record.
    fn current_row_locator(&self) -> Result<RowLocator>;

    /// Make the record at `locator` current.
    fn move_to(&mut self, locator: RowLocator) -> Result<()>;

    /// Release the scan. Idempotent.
    fn close(&mut self);
}

/// Host transaction through which all record-file access happens.
///
/// Atomicity, isolation and recovery belong to the implementation; callers
/// never commit or roll back through this trait.
pub trait Transaction {
    type Scan: TableScan;

    /// Open a scan over the record file described by `table`. A file that
    /// has never been written reads as empty.
    fn open_scan(&self, table: &TableInfo) -> Result<Self::Scan>;

    /// Exchange the contents of two record files as one logged step.
    fn swap_files(&self, a: &str, b: &str) -> Result<()>;

    /// Remove every record of a record file.
    fn truncate_file(&self, name: &str) -> Result<()>;
}
