//! # colseg — Shared-Memory Columnar Segment Store
//!
//! colseg persists each table column as an independent, process-shareable
//! POSIX shared-memory segment and exposes it through a fixed,
//! buffer-oriented array abstraction: a validity bitmap, a typed value
//! buffer, and, for variable-width columns, an offsets buffer of prefix
//! sums. Multiple cooperating processes attach to the same named segment
//! and observe a consistent view without copying data through a
//! serialization layer.
//!
//! ## Quick Start
//!
//! ```no_run
//! use colseg::{ArrayCache, ColumnDescriptor, DataType, SegmentKey, Value};
//!
//! # fn main() -> eyre::Result<()> {
//! let key = SegmentKey::new(5, 100, 3);
//! let desc = ColumnDescriptor::new(DataType::Int8, 3);
//!
//! let mut cache = ArrayCache::new();
//! let array = cache.get_or_open(key, &desc, true)?;
//!
//! array.append_value(&Value::Int8(1))?;
//! array.append_null()?;
//! array.append_value(&Value::Int8(3))?;
//!
//! assert_eq!(array.len(), 3);
//! assert_eq!(array.get_value(0)?, Some(Value::Int8(1)));
//! assert_eq!(array.get_value(1)?, None);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Scan/Insert Adapters (TableScan, ...)  │
//! ├─────────────────────────────────────────┤
//! │  Array Cache (SegmentKey -> view)       │
//! ├─────────────────────────────────────────┤
//! │  Columnar Array (validity/data/offsets) │
//! ├─────────────────────────────────────────┤
//! │  Segment Store (shm_open + mmap)        │
//! └─────────────────────────────────────────┘
//! ```
//!
//! A caller resolves a logical `{database_id, table_id, column}` key; the
//! `ArrayCache` looks up or creates the mapping through the segment store;
//! positional get/append then runs directly against the mapped buffers.
//!
//! ## Concurrency Model
//!
//! Segments are shared across independent OS processes. Each segment has a
//! named-semaphore writer lock realizing an at-most-one-writer discipline;
//! readers run concurrently and rely on the release/acquire protocol
//! around the header's `length` field: the writer publishes buffer bytes
//! before advancing `length`, so any reader that observes a given length
//! sees fully written elements below it. Published cells are never
//! rewritten (the store is append-only), and regions never grow or move.
//!
//! ## Errors
//!
//! All fallible APIs return `eyre::Result`; the distinguishable failure
//! classes (`NameTooLong`, `OpenFailed`, `SizeFailed`, `TypeNotHandled`,
//! `CapacityExceeded`, `LockFailed`) are `StorageError` variants carried
//! inside the report. All are fatal at the point of detection.

#[cfg(not(unix))]
compile_error!("colseg requires a Unix platform with POSIX shared memory and semaphores");

#[cfg(target_endian = "big")]
compile_error!("colseg segment headers assume a little-endian target");

pub mod array;
pub mod error;
pub mod scan;
pub mod storage;
pub mod types;

pub use array::{ArrayCache, ColumnArray};
pub use error::StorageError;
pub use scan::{Row, TableScan, TableWriter};
pub use storage::{SegmentKey, SharedSegment, WriterLock, SEGMENT_SIZE};
pub use types::{ColumnDescriptor, DataType, Value};
