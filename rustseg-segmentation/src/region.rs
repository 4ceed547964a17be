//! Bounded two-dimensional tables of per-region settings.
//!
//! Wafer and megatile segmentations look up offsets by a `(row, column)`
//! pair decoded from the cell identifier, e.g. `(group, wafer)` or
//! `(layer, wafer)`. Each slot records whether it was ever configured, so
//! a deliberate zero is distinguishable from a missing entry.

use crate::error::{Error, Result};

/// Rows in a region table.
pub const MAX_ROWS: usize = 100;
/// Columns in a region table.
pub const MAX_COLUMNS: usize = 100;

/// A fixed-size `MAX_ROWS x MAX_COLUMNS` table of `T`.
#[derive(Debug, Clone)]
pub struct RegionTable<T> {
    slots: Vec<Option<T>>,
}

impl<T> Default for RegionTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RegionTable<T> {
    /// Creates a table with every slot unconfigured.
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_ROWS * MAX_COLUMNS);
        slots.resize_with(MAX_ROWS * MAX_COLUMNS, || None);
        Self { slots }
    }

    fn slot_index(row: i64, column: i64) -> Result<usize> {
        match (usize::try_from(row), usize::try_from(column)) {
            (Ok(r), Ok(c)) if r < MAX_ROWS && c < MAX_COLUMNS => Ok(r * MAX_COLUMNS + c),
            _ => Err(Error::RegionOutOfRange {
                row,
                column,
                rows: MAX_ROWS,
                columns: MAX_COLUMNS,
            }),
        }
    }

    /// Entry at `(row, column)`; `None` if never configured.
    ///
    /// # Errors
    /// Fails if the index lies outside the table.
    pub fn get(&self, row: i64, column: i64) -> Result<Option<&T>> {
        Ok(self.slots[Self::slot_index(row, column)?].as_ref())
    }

    /// Configured entry at `(row, column)`.
    ///
    /// # Errors
    /// Fails if the index lies outside the table or the slot is empty.
    pub fn require(&self, row: i64, column: i64) -> Result<&T> {
        let index = Self::slot_index(row, column)?;
        self.slots[index].as_ref().ok_or(Error::UnconfiguredRegion {
            row: index / MAX_COLUMNS,
            column: index % MAX_COLUMNS,
        })
    }

    /// Stores `value` at `(row, column)`, returning the previous entry.
    ///
    /// # Errors
    /// Fails if the index lies outside the table.
    pub fn insert(&mut self, row: i64, column: i64, value: T) -> Result<Option<T>> {
        let index = Self::slot_index(row, column)?;
        Ok(self.slots[index].replace(value))
    }

    /// Mutable entry at `(row, column)`, inserting `T::default()` if empty.
    ///
    /// # Errors
    /// Fails if the index lies outside the table.
    pub fn entry(&mut self, row: i64, column: i64) -> Result<&mut T>
    where
        T: Default,
    {
        let index = Self::slot_index(row, column)?;
        Ok(self.slots[index].get_or_insert_with(T::default))
    }

    /// Number of configured slots.
    pub fn configured(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}
