//! Record schemas and record-file descriptors.
//!
//! A record occupies a fixed-size slot: one in-use flag byte followed by
//! every field at its maximum encoded width. Integers take 8 bytes; a
//! `varchar(n)` takes a 4-byte length prefix plus `n` bytes.

use exhash_error::{ExhashError, Result};
use serde::{Deserialize, Serialize};

/// Width of the per-slot in-use flag.
pub const SLOT_FLAG_BYTES: usize = 1;
/// Encoded width of an integer field.
pub const INT_FIELD_BYTES: usize = 8;
/// Length prefix width of a string field.
pub const VARCHAR_PREFIX_BYTES: usize = 4;

/// Declared type of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Int,
    /// String of at most `n` characters.
    Varchar(usize),
}

impl FieldType {
    /// Encoded width of this field inside a slot.
    #[must_use]
    pub const fn byte_len(self) -> usize {
        match self {
            Self::Int => INT_FIELD_BYTES,
            Self::Varchar(n) => VARCHAR_PREFIX_BYTES + n,
        }
    }

    /// Stable label used in error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Varchar(_) => "varchar",
        }
    }
}

/// Ordered list of named, typed fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<(String, FieldType)>,
}

impl Schema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field. A field with the same name replaces the earlier type.
    pub fn add_field(&mut self, name: &str, ty: FieldType) -> &mut Self {
        if let Some(slot) = self.fields.iter_mut().find(|(n, _)| n == name) {
            slot.1 = ty;
        } else {
            self.fields.push((name.to_owned(), ty));
        }
        self
    }

    pub fn add_int_field(&mut self, name: &str) -> &mut Self {
        self.add_field(name, FieldType::Int)
    }

    pub fn add_string_field(&mut self, name: &str, max_len: usize) -> &mut Self {
        self.add_field(name, FieldType::Varchar(max_len))
    }

    /// Position of `name` in the field list.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|(n, _)| n == name)
    }

    #[must_use]
    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, ty)| *ty)
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, FieldType)> {
        self.fields.iter().map(|(n, ty)| (n.as_str(), *ty))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A named record file together with the schema of its records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    name: String,
    schema: Schema,
}

impl TableInfo {
    #[must_use]
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Slot width in bytes, including the in-use flag.
    #[must_use]
    pub fn record_len(&self) -> usize {
        SLOT_FLAG_BYTES
            + self
                .schema
                .fields()
                .map(|(_, ty)| ty.byte_len())
                .sum::<usize>()
    }

    /// Number of slots that fit in one block of `block_size` bytes.
    ///
    /// # Errors
    /// Returns `OutOfRange` when not even one record fits.
    pub fn slots_per_block(&self, block_size: usize) -> Result<usize> {
        let per_block = block_size / self.record_len();
        if per_block == 0 {
            return Err(ExhashError::OutOfRange {
                what: format!("record length of {}", self.name),
                value: self.record_len().to_string(),
            });
        }
        Ok(per_block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir_schema() -> Schema {
        let mut sch = Schema::new();
        sch.add_string_field("id", 32)
            .add_string_field("filename", 64)
            .add_int_field("depth");
        sch
    }

    #[test]
    fn field_lookup_preserves_order() {
        let sch = dir_schema();
        assert_eq!(sch.index_of("id"), Some(0));
        assert_eq!(sch.index_of("depth"), Some(2));
        assert_eq!(sch.field_type("filename"), Some(FieldType::Varchar(64)));
        assert!(sch.field_type("missing").is_none());
    }

    #[test]
    fn re_adding_a_field_replaces_its_type() {
        let mut sch = dir_schema();
        sch.add_int_field("id");
        assert_eq!(sch.len(), 3);
        assert_eq!(sch.field_type("id"), Some(FieldType::Int));
    }

    #[test]
    fn record_len_and_slots() {
        let ti = TableInfo::new("idx.dir", dir_schema());
        assert_eq!(ti.record_len(), 1 + 36 + 68 + 8);
        assert_eq!(ti.slots_per_block(4096).unwrap(), 4096 / 113);
    }

    #[test]
    fn oversized_record_rejected() {
        let mut sch = Schema::new();
        sch.add_string_field("blob", 5000);
        let ti = TableInfo::new("big", sch);
        assert!(matches!(
            ti.slots_per_block(4096),
            Err(ExhashError::OutOfRange { .. })
        ));
    }
}
