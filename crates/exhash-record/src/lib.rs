//! Record-file scans over named record files inside a transaction.
//!
//! [`traits`] defines the scan/transaction contract the hash index consumes;
//! [`memory`] is an in-memory, single-writer implementation of it.

pub mod memory;
pub mod record_file;
pub mod traits;

pub use memory::{MemoryScan, MemoryStore, MemoryTransaction, StoreConfig};
pub use record_file::RecordFile;
pub use traits::{TableScan, Transaction, TransactionMode};
