//! # Segment Storage Layer
//!
//! This module owns everything between a logical column identity and raw
//! shared bytes:
//!
//! - `naming`: derives stable shared-object names from a
//!   `{database_id, table_id, column}` key.
//! - `shm`: opens/creates the named POSIX shared-memory object, sizes it to
//!   one fixed region, and maps it read/write into the caller's address
//!   space (`SharedSegment`).
//! - `layout`: the one place that defines the on-segment binary header, the
//!   buffer offset arithmetic, and the set-bit-means-null validity
//!   convention.
//! - `lock`: a named-semaphore writer lock per segment, realizing the
//!   at-most-one-writer discipline.
//!
//! ## Region Layout
//!
//! Every segment is exactly one `SEGMENT_SIZE` region, fixed at creation:
//!
//! ```text
//! +--------------------------+ 0
//! | Header (64 bytes)        |
//! +--------------------------+ 64
//! | Offsets buffer           |  (variable-width columns only)
//! +--------------------------+
//! | Data buffer / heap       |
//! +--------------------------+ SEGMENT_SIZE - 512
//! | Validity bitmap (512 B)  |  set bit = null
//! +--------------------------+ SEGMENT_SIZE
//! ```
//!
//! The validity bitmap occupies the tail of the region and is sized for the
//! maximum element count the region can hold; the header is written once at
//! creation and only the `length` field changes afterwards.
//!
//! ## Sharing Model
//!
//! The bytes behind a segment are shared by every process that opens the
//! same name. No process owns them; each owns only the mapping of its own
//! address space. Dropping a `SharedSegment` unmaps the local view, while
//! the object persists until an administrative `SharedSegment::remove`.

mod layout;
mod lock;
mod naming;
mod shm;

pub use layout::{
    initialize_header, is_initialized, read_layout, SegmentHeader, SegmentLayout, SEGMENT_MAGIC,
    SEGMENT_VERSION,
};
pub use lock::{WriterGuard, WriterLock};
pub use naming::{SegmentKey, SEGMENT_NAME_MAX};
pub use shm::SharedSegment;

/// Fixed byte size of every segment region (one platform page).
pub const SEGMENT_SIZE: usize = 4096;

/// Byte size of the segment header at the front of the region.
pub const SEGMENT_HEADER_SIZE: usize = 64;

/// Element budget reserved in the offsets buffer of variable-width columns.
pub const VAR_WIDTH_CAPACITY: usize = 256;
