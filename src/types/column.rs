//! # Column Descriptors
//!
//! A `ColumnDescriptor` is what the host's catalog lookup hands the core for
//! each column: the type discriminant (which implies element width and
//! whether an offsets buffer is needed) plus the column's logical position
//! within its table. Together with the owning database and table ids it
//! identifies one segment.

use super::DataType;

/// Per-column metadata supplied by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDescriptor {
    data_type: DataType,
    position: u16,
}

impl ColumnDescriptor {
    pub fn new(data_type: DataType, position: u16) -> Self {
        Self {
            data_type,
            position,
        }
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Logical position of the column within its table, 1-based like the
    /// catalog numbering it mirrors.
    pub fn position(&self) -> u16 {
        self.position
    }

    /// Element width in the segment-header convention (`-1` for
    /// variable-width columns).
    pub fn element_width(&self) -> i32 {
        self.data_type.element_width()
    }

    pub fn is_variable(&self) -> bool {
        self.data_type.is_variable()
    }
}
