//! # Segment Naming
//!
//! Every column's storage is addressed by a `SegmentKey`: the owning
//! database id, the owning table id, and the column's logical position.
//! The key is encoded into a short textual identifier usable as a POSIX
//! shared-memory object name (`/colseg.<db>.<table>.<col>`), and into the
//! matching name for the column's writer-lock semaphore.
//!
//! Encoding is deterministic and injective over the key space: the three
//! integer fields appear verbatim, dot-separated, so two distinct keys can
//! never collide. Names that would not fit the fixed name limit are an
//! explicit `NameTooLong` error, never silently truncated.

use std::fmt;

use eyre::Result;

use crate::error::StorageError;

/// Longest shared object name the namespace accepts, matching the POSIX
/// NAME_MAX floor for `shm_open`/`sem_open` names.
pub const SEGMENT_NAME_MAX: usize = 255;

/// Globally unique, stable identity for one column's storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentKey {
    pub database_id: u32,
    pub table_id: u32,
    pub column: u16,
}

impl SegmentKey {
    pub fn new(database_id: u32, table_id: u32, column: u16) -> Self {
        Self {
            database_id,
            table_id,
            column,
        }
    }

    /// Shared-memory object name for this key.
    pub fn segment_name(&self) -> Result<String> {
        checked(format!(
            "/colseg.{}.{}.{}",
            self.database_id, self.table_id, self.column
        ))
    }

    /// Name of the writer-lock semaphore for this key.
    pub fn lock_name(&self) -> Result<String> {
        checked(format!(
            "/colseg.{}.{}.{}.lock",
            self.database_id, self.table_id, self.column
        ))
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{db: {}, table: {}, column: {}}}",
            self.database_id, self.table_id, self.column
        )
    }
}

fn checked(name: String) -> Result<String> {
    if name.len() > SEGMENT_NAME_MAX {
        return Err(StorageError::NameTooLong {
            name,
            max: SEGMENT_NAME_MAX,
        }
        .into());
    }
    Ok(name)
}
