//! # Scan and Insert Adapters
//!
//! Thin drivers between a row-oriented host and the columnar core. A host
//! executes tuple-at-a-time: inserts arrive one logical row at a time, and
//! scans pull one logical row at a time. Both adapters resolve each
//! column's array view through the `ArrayCache` on every access, so they
//! hold no mappings of their own.
//!
//! `TableScan` captures the table length lazily from the first column on
//! the first `next_row` call, assuming every column of the table has the
//! same logical length (they do, as long as rows are appended through
//! `TableWriter`). `rescan` resets the cursor without recapturing the
//! length, so a scan sees a stable snapshot of the row count it started
//! with.

use eyre::{ensure, Result};

use crate::array::ArrayCache;
use crate::types::{ColumnDescriptor, Value};

/// One logical row crossing the adapter boundary; `None` cells are null.
pub type Row = Vec<Option<Value>>;

/// Insert-path adapter: appends logical rows column by column.
#[derive(Debug, Clone)]
pub struct TableWriter {
    database_id: u32,
    table_id: u32,
    columns: Vec<ColumnDescriptor>,
}

impl TableWriter {
    pub fn new(database_id: u32, table_id: u32, columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            database_id,
            table_id,
            columns,
        }
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Append one logical row: one cell per column, in column order.
    /// Segments are created on first use.
    pub fn append_row(&self, cache: &mut ArrayCache, row: &[Option<Value>]) -> Result<()> {
        ensure!(
            row.len() == self.columns.len(),
            "row has {} cells but the table has {} columns",
            row.len(),
            self.columns.len()
        );

        for (desc, cell) in self.columns.iter().zip(row) {
            let array =
                cache.array_for(self.database_id, self.table_id, desc.position(), desc, true)?;
            match cell {
                Some(value) => array.append_value(value)?,
                None => array.append_null()?,
            }
        }
        Ok(())
    }
}

/// Scan-path adapter: a sequential cursor over the table's rows.
#[derive(Debug, Clone)]
pub struct TableScan {
    database_id: u32,
    table_id: u32,
    columns: Vec<ColumnDescriptor>,
    index: u64,
    length: Option<u64>,
}

impl TableScan {
    pub fn new(database_id: u32, table_id: u32, columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            database_id,
            table_id,
            columns,
            index: 0,
            length: None,
        }
    }

    /// Fetch the next row, or `None` when the scan is exhausted.
    pub fn next_row(&mut self, cache: &mut ArrayCache) -> Result<Option<Row>> {
        ensure!(
            !self.columns.is_empty(),
            "cannot scan a table with no columns"
        );

        let length = match self.length {
            Some(length) => length,
            None => {
                // The first column's length stands for the table's row
                // count; all columns advance in lockstep.
                let first = &self.columns[0];
                let array = cache.array_for(
                    self.database_id,
                    self.table_id,
                    first.position(),
                    first,
                    false,
                )?;
                let length = array.len();
                self.length = Some(length);
                length
            }
        };

        if self.index >= length {
            return Ok(None);
        }

        let mut row = Vec::with_capacity(self.columns.len());
        for desc in &self.columns {
            let array =
                cache.array_for(self.database_id, self.table_id, desc.position(), desc, false)?;
            row.push(array.get_value(self.index)?);
        }

        self.index += 1;
        Ok(Some(row))
    }

    /// Reset the cursor to the first row. The captured length is kept, so
    /// a rescan replays the same row count the scan started with.
    pub fn rescan(&mut self) {
        self.index = 0;
    }
}
