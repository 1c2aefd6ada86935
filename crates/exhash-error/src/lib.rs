//! Error type shared by the record store and the extensible hash index.
//!
//! Storage-layer failures and index-level faults live in one enum so that the
//! index can propagate collaborator errors with `?` without wrapping them.

use thiserror::Error;

/// Primary error type for the exhash crates.
#[derive(Debug, Error)]
pub enum ExhashError {
    // === Index contract ===
    /// `next` / `current_locator` called without a successful positioning.
    #[error("index is not positioned on a search key")]
    NotPositioned,

    /// A computed suffix has no directory entry, or the sentinel row is gone.
    #[error("directory corrupt: {detail}")]
    DirectoryCorrupt { detail: String },

    /// Splitting cannot separate the records of an overflowing bucket within
    /// the available hash bits.
    #[error("hash bits exhausted at depth {depth}: colliding keys overflow one bucket")]
    HashExhausted { depth: u32 },

    /// More than `capacity` records share a single key value.
    #[error("more than {capacity} records share key {key}")]
    DuplicateKeyOverflow { key: String, capacity: usize },

    /// Index configuration rejected at open time.
    #[error("invalid index configuration: {detail}")]
    InvalidConfig { detail: String },

    // === Record storage ===
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Another writer holds the store.
    #[error("record store is busy")]
    Busy,

    /// A lock could not be acquired before the wait bound elapsed.
    #[error("lock wait timeout on {file}")]
    LockTimeout { file: String },

    /// Write attempted through a read-only transaction.
    #[error("attempt to write a readonly transaction")]
    ReadOnly,

    /// Operation used after the transaction committed or rolled back.
    #[error("no active transaction")]
    NoActiveTransaction,

    /// Field access or update without a current record.
    #[error("scan over {file} has no current record")]
    NoCurrentRecord { file: String },

    /// Scan used after `close`.
    #[error("scan over {file} is closed")]
    ScanClosed { file: String },

    /// Field name not present in the record schema.
    #[error("no field {field} in {file}")]
    UnknownField { file: String, field: String },

    /// Value type does not match the field type.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Numeric or length limit exceeded.
    #[error("value out of range for {what}: {value}")]
    OutOfRange { what: String, value: String },

    /// Internal logic error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ExhashError {
    /// Create an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a directory corruption error with the given detail.
    pub fn directory_corrupt(detail: impl Into<String>) -> Self {
        Self::DirectoryCorrupt {
            detail: detail.into(),
        }
    }

    /// Whether the failure may clear up if the host retries its transaction.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Busy | Self::LockTimeout { .. })
    }

    /// Whether the failure signals a broken on-disk invariant.
    pub const fn is_corruption(&self) -> bool {
        matches!(self, Self::DirectoryCorrupt { .. })
    }

    /// Whether the failure is an unresolvable bucket overflow.
    pub const fn is_overflow(&self) -> bool {
        matches!(
            self,
            Self::HashExhausted { .. } | Self::DuplicateKeyOverflow { .. }
        )
    }
}

/// Result type alias using `ExhashError`.
pub type Result<T> = std::result::Result<T, ExhashError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ExhashError::directory_corrupt("no entry for suffix 01");
        assert_eq!(err.to_string(), "directory corrupt: no entry for suffix 01");

        let err = ExhashError::DuplicateKeyOverflow {
            key: "'abc'".to_owned(),
            capacity: 5,
        };
        assert_eq!(err.to_string(), "more than 5 records share key 'abc'");
    }

    #[test]
    fn classification() {
        assert!(ExhashError::Busy.is_transient());
        assert!(
            ExhashError::LockTimeout {
                file: "t".to_owned()
            }
            .is_transient()
        );
        assert!(!ExhashError::NotPositioned.is_transient());
        assert!(ExhashError::directory_corrupt("x").is_corruption());
        assert!(ExhashError::HashExhausted { depth: 32 }.is_overflow());
        assert!(!ExhashError::ReadOnly.is_overflow());
    }

    #[test]
    fn io_error_converts() {
        fn read() -> Result<()> {
            Err(std::io::Error::other("disk gone"))?;
            Ok(())
        }
        assert!(matches!(read(), Err(ExhashError::Io(_))));
    }
}
