//! # Array Cache
//!
//! Process-local lookup table from `SegmentKey` to a live `ColumnArray`
//! view. The first access to a column opens (or creates and initializes)
//! its segment and builds the view; every later access reuses the existing
//! mapping instead of re-opening it.
//!
//! Entries are never evicted individually. The cache is an explicit object
//! the caller owns; dropping it drops every view as a unit, unmapping this
//! process's address space only. The shared bytes persist in the underlying
//! objects until an administrative `SharedSegment::remove`.
//!
//! ## Initialization Race
//!
//! Two processes can both observe `was_created = true` when they race on a
//! zero-sized object. The header write happens under the segment's writer
//! lock, and the magic is re-checked after the lock is taken, so exactly
//! one of them initializes and the other attaches to the finished header.

use hashbrown::hash_map::Entry;
use hashbrown::HashMap;
use tracing::debug;

use eyre::Result;

use crate::storage::{initialize_header, is_initialized, SegmentKey, SharedSegment, WriterLock};
use crate::types::ColumnDescriptor;

use super::ColumnArray;

/// Process-local cache of open column array views.
#[derive(Debug, Default)]
pub struct ArrayCache {
    entries: HashMap<SegmentKey, ColumnArray>,
}

impl ArrayCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Look up the view for `key`, opening (and, if `create_if_missing`,
    /// creating and initializing) the backing segment on a miss.
    pub fn get_or_open(
        &mut self,
        key: SegmentKey,
        desc: &ColumnDescriptor,
        create_if_missing: bool,
    ) -> Result<&mut ColumnArray> {
        match self.entries.entry(key) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let (mut segment, created) = SharedSegment::open_or_create(key, create_if_missing)?;
                let lock = WriterLock::open(key)?;

                if created {
                    let _guard = lock.acquire()?;
                    // A racing creator may have initialized between our
                    // open and taking the lock.
                    if !is_initialized(segment.bytes()) {
                        initialize_header(segment.bytes_mut(), desc)?;
                        debug!(key = %key, "initialized fresh segment");
                    }
                }

                let array = ColumnArray::new(segment, lock, desc)?;
                debug!(key = %key, "cached column array view");
                Ok(entry.insert(array))
            }
        }
    }

    /// Host-facing wrapper: resolve or create the array view for one column
    /// of one table.
    pub fn array_for(
        &mut self,
        database_id: u32,
        table_id: u32,
        column: u16,
        desc: &ColumnDescriptor,
        create_if_missing: bool,
    ) -> Result<&mut ColumnArray> {
        self.get_or_open(
            SegmentKey::new(database_id, table_id, column),
            desc,
            create_if_missing,
        )
    }

    pub fn contains(&self, key: &SegmentKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
