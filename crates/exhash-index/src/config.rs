//! Index configuration.

use exhash_error::{ExhashError, Result};
use serde::{Deserialize, Serialize};

use crate::hash::HASH_WIDTH_BITS;

/// Default number of records a bucket holds before it must split.
pub const DEFAULT_BUCKET_CAPACITY: usize = 5;

/// Longest index name whose directory and bucket file names still fit the
/// directory's `filename` column (`"{name}.eh"` plus a 32-bit suffix).
pub const MAX_INDEX_NAME_LEN: usize = 24;

/// Tunables for one extensible hash index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashIndexConfig {
    /// Records per bucket.
    pub bucket_capacity: usize,
    /// Upper bound on the directory's global depth. Inserts that would need
    /// a deeper directory fail with `HashExhausted`.
    pub max_global_depth: u32,
}

impl Default for HashIndexConfig {
    fn default() -> Self {
        Self {
            bucket_capacity: DEFAULT_BUCKET_CAPACITY,
            max_global_depth: HASH_WIDTH_BITS,
        }
    }
}

impl HashIndexConfig {
    #[must_use]
    pub const fn with_bucket_capacity(mut self, capacity: usize) -> Self {
        self.bucket_capacity = capacity;
        self
    }

    #[must_use]
    pub const fn with_max_global_depth(mut self, depth: u32) -> Self {
        self.max_global_depth = depth;
        self
    }

    /// Reject configurations the index cannot honour.
    ///
    /// # Errors
    /// Returns `InvalidConfig` for a zero capacity or a depth bound outside
    /// `1..=32`.
    pub fn validate(&self) -> Result<()> {
        if self.bucket_capacity == 0 {
            return Err(ExhashError::InvalidConfig {
                detail: "bucket_capacity must be at least 1".to_owned(),
            });
        }
        if self.max_global_depth == 0 || self.max_global_depth > HASH_WIDTH_BITS {
            return Err(ExhashError::InvalidConfig {
                detail: format!(
                    "max_global_depth must be in 1..={HASH_WIDTH_BITS}, got {}",
                    self.max_global_depth
                ),
            });
        }
        Ok(())
    }
}

/// Check that `name` can be used as an index name.
pub(crate) fn validate_index_name(name: &str) -> Result<()> {
    if name.is_empty() || name.chars().count() > MAX_INDEX_NAME_LEN {
        return Err(ExhashError::InvalidConfig {
            detail: format!(
                "index name must be 1..={MAX_INDEX_NAME_LEN} characters, got {name:?}"
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = HashIndexConfig::default();
        assert_eq!(cfg.bucket_capacity, 5);
        assert_eq!(cfg.max_global_depth, 32);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn builders_and_validation() {
        let cfg = HashIndexConfig::default().with_bucket_capacity(0);
        assert!(matches!(cfg.validate(), Err(ExhashError::InvalidConfig { .. })));

        let cfg = HashIndexConfig::default().with_max_global_depth(33);
        assert!(cfg.validate().is_err());

        let cfg = HashIndexConfig::default()
            .with_bucket_capacity(2)
            .with_max_global_depth(8);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn loads_from_partial_json() {
        let cfg: HashIndexConfig = serde_json::from_str(r#"{"bucket_capacity": 16}"#).unwrap();
        assert_eq!(cfg.bucket_capacity, 16);
        assert_eq!(cfg.max_global_depth, 32);

        let text = serde_json::to_string(&cfg).unwrap();
        let back: HashIndexConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn index_name_bounds() {
        assert!(validate_index_name("idx_students_sid").is_ok());
        assert!(validate_index_name("").is_err());
        assert!(validate_index_name(&"x".repeat(MAX_INDEX_NAME_LEN + 1)).is_err());
    }
}
