//! Slotted record file.
//!
//! Slots are addressed by a flat index; block `b` owns slots
//! `b * slots_per_block .. (b + 1) * slots_per_block`. Files grow one whole
//! block at a time and never shrink except through `truncate`.

use exhash_error::{ExhashError, Result};
use exhash_types::{Constant, RowLocator, Schema};

/// In-memory image of one record file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFile {
    slots_per_block: usize,
    slots: Vec<Option<Vec<Constant>>>,
}

impl RecordFile {
    /// Create an empty file whose blocks hold `slots_per_block` records.
    #[must_use]
    pub fn new(slots_per_block: usize) -> Self {
        Self {
            slots_per_block: slots_per_block.max(1),
            slots: Vec::new(),
        }
    }

    #[must_use]
    pub const fn slots_per_block(&self) -> usize {
        self.slots_per_block
    }

    /// Number of allocated blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.slots.len() / self.slots_per_block
    }

    /// Total allocated slots, used or not.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots holding a record.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// First used slot at or after `from`.
    #[must_use]
    pub fn next_used(&self, from: usize) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .skip(from)
            .find_map(|(i, s)| s.as_ref().map(|_| i))
    }

    /// Place a record with default field values into the first free slot,
    /// appending a block when every slot is used.
    pub fn insert_default(&mut self, schema: &Schema) -> usize {
        let record: Vec<Constant> = schema
            .fields()
            .map(|(_, ty)| Constant::default_for(ty))
            .collect();
        if let Some(free) = self.slots.iter().position(Option::is_none) {
            self.slots[free] = Some(record);
            return free;
        }
        let at = self.slots.len();
        self.slots.resize(at + self.slots_per_block, None);
        self.slots[at] = Some(record);
        at
    }

    /// Clear slot `idx`; `false` when it was already free.
    pub fn delete(&mut self, idx: usize) -> bool {
        self.slots.get_mut(idx).and_then(Option::take).is_some()
    }

    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&[Constant]> {
        self.slots.get(idx).and_then(|s| s.as_deref())
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Vec<Constant>> {
        self.slots.get_mut(idx).and_then(Option::as_mut)
    }

    /// Drop every block.
    pub fn truncate(&mut self) {
        self.slots.clear();
    }

    /// Block/slot address of flat slot `idx`.
    pub fn locator_of(&self, idx: usize) -> Result<RowLocator> {
        let block = u32::try_from(idx / self.slots_per_block).map_err(|_| out_of_range(idx))?;
        let slot = u32::try_from(idx % self.slots_per_block).map_err(|_| out_of_range(idx))?;
        Ok(RowLocator::new(block, slot))
    }

    /// Flat slot index of `locator`.
    ///
    /// # Errors
    /// Returns `OutOfRange` if the slot number does not fit a block or the
    /// address lies past the end of the file.
    pub fn index_of(&self, locator: RowLocator) -> Result<usize> {
        let slot = locator.slot as usize;
        if slot >= self.slots_per_block {
            return Err(ExhashError::OutOfRange {
                what: "slot number".to_owned(),
                value: locator.to_string(),
            });
        }
        let idx = (locator.block as usize)
            .checked_mul(self.slots_per_block)
            .and_then(|base| base.checked_add(slot))
            .filter(|idx| *idx < self.slots.len())
            .ok_or_else(|| ExhashError::OutOfRange {
                what: "row locator".to_owned(),
                value: locator.to_string(),
            })?;
        Ok(idx)
    }
}

fn out_of_range(idx: usize) -> ExhashError {
    ExhashError::OutOfRange {
        what: "slot index".to_owned(),
        value: idx.to_string(),
    }
}
