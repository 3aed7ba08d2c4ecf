//! # On-Segment Binary Layout
//!
//! The single module that defines the segment header format and every piece
//! of buffer offset arithmetic. Nothing else in the crate computes offsets
//! into a segment; the view layer asks a `SegmentLayout` instead.
//!
//! ## Header Format
//!
//! The header is 64 bytes at offset 0, little-endian via zerocopy:
//!
//! ```text
//! Offset  Size  Description
//! 0       8     Magic: "colseg1\0" (doubles as the initialized marker)
//! 8       4     Element width (i32; -1 for variable-width columns)
//! 12      4     Format version
//! 16      8     Length: number of logical elements stored
//! 24      8     Element capacity, fixed at initialization
//! 32      8     Validity buffer offset
//! 40      8     Data buffer offset
//! 48      8     Offsets buffer offset (0 for fixed-width columns)
//! 56      8     Reserved
//! ```
//!
//! The header is written once by `initialize_header` and is append-only
//! afterwards: only `length` ever changes, and it changes through the
//! acquire/release accessors on `SharedSegment` so readers never observe a
//! torn update.
//!
//! ## Buffer Sizing
//!
//! The validity bitmap sits at the tail of the region, sized to hold one
//! bit per element for the most elements the region could ever hold, and
//! rounded up to a 64-byte multiple:
//!
//! ```text
//! validity_size   = 64 * (((SEGMENT_SIZE - 64) / 8) / 64 + 1)
//! validity_offset = SEGMENT_SIZE - validity_size
//! ```
//!
//! Fixed-width data starts right after the header and runs to the validity
//! buffer. Variable-width columns insert an offsets buffer of
//! `VAR_WIDTH_CAPACITY + 1` u32 prefix sums between the header and the data
//! heap; element `i` of the heap spans `offsets[i]..offsets[i + 1]`.
//!
//! ## Null Convention
//!
//! Bit `index % 8` of validity byte `index / 8`; a **set** bit means the
//! element is null. Consumers depend on this polarity exactly.

use eyre::{ensure, Result, WrapErr};
use zerocopy::little_endian::{I32, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::StorageError;
use crate::types::ColumnDescriptor;

use super::{SEGMENT_HEADER_SIZE, SEGMENT_SIZE, VAR_WIDTH_CAPACITY};

pub const SEGMENT_MAGIC: &[u8; 8] = b"colseg1\0";
pub const SEGMENT_VERSION: u32 = 1;

/// Byte offset of the `length` field inside the header. The shm layer
/// accesses the field atomically through this offset.
pub(crate) const LENGTH_OFFSET: usize = 16;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct SegmentHeader {
    magic: [u8; 8],
    element_width: I32,
    version: U32,
    length: U64,
    capacity: U64,
    validity_buffer_offset: U64,
    data_buffer_offset: U64,
    offsets_buffer_offset: U64,
    reserved: [u8; 8],
}

const _: () = assert!(std::mem::size_of::<SegmentHeader>() == SEGMENT_HEADER_SIZE);
const _: () = assert!(std::mem::offset_of!(SegmentHeader, length) == LENGTH_OFFSET);

impl SegmentHeader {
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        ensure!(
            bytes.len() >= SEGMENT_HEADER_SIZE,
            "buffer too small for SegmentHeader: {} < {}",
            bytes.len(),
            SEGMENT_HEADER_SIZE
        );

        let header = Self::ref_from_bytes(&bytes[..SEGMENT_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to parse SegmentHeader: {:?}", e))?;

        ensure!(
            &header.magic == SEGMENT_MAGIC,
            "invalid magic bytes in segment header"
        );

        ensure!(
            header.version.get() == SEGMENT_VERSION,
            "unsupported segment version: {} (expected {})",
            header.version.get(),
            SEGMENT_VERSION
        );

        Ok(header)
    }

    pub fn element_width(&self) -> i32 {
        self.element_width.get()
    }

    /// Length as recorded in the header bytes. Live readers go through the
    /// atomic accessor on `SharedSegment`; this one is for validation and
    /// logging on freshly parsed headers.
    pub fn length(&self) -> u64 {
        self.length.get()
    }

    pub fn capacity(&self) -> u64 {
        self.capacity.get()
    }

    pub fn validity_buffer_offset(&self) -> u64 {
        self.validity_buffer_offset.get()
    }

    pub fn data_buffer_offset(&self) -> u64 {
        self.data_buffer_offset.get()
    }

    pub fn offsets_buffer_offset(&self) -> u64 {
        self.offsets_buffer_offset.get()
    }
}

/// Computed buffer geometry for one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentLayout {
    /// Byte width of one element, `None` for variable-width columns.
    pub element_width: Option<usize>,
    /// Element capacity of the region.
    pub capacity: u64,
    pub validity_buffer_offset: usize,
    pub data_buffer_offset: usize,
    /// Zero for fixed-width columns.
    pub offsets_buffer_offset: usize,
}

impl SegmentLayout {
    /// Compute the layout a fresh segment for `desc` will use.
    pub fn for_column(desc: &ColumnDescriptor) -> Result<Self> {
        let validity_size = validity_buffer_size();
        let validity_offset = SEGMENT_SIZE - validity_size;
        let validity_bits = (validity_size * 8) as u64;

        match desc.data_type().fixed_size() {
            Some(width) => {
                let data_offset = SEGMENT_HEADER_SIZE;
                let capacity = (((validity_offset - data_offset) / width) as u64).min(validity_bits);
                Ok(Self {
                    element_width: Some(width),
                    capacity,
                    validity_buffer_offset: validity_offset,
                    data_buffer_offset: data_offset,
                    offsets_buffer_offset: 0,
                })
            }
            None => {
                let offsets_offset = SEGMENT_HEADER_SIZE;
                let data_offset = offsets_offset + (VAR_WIDTH_CAPACITY + 1) * 4;
                ensure!(
                    data_offset < validity_offset,
                    "variable-width layout does not fit a {SEGMENT_SIZE}-byte segment"
                );
                let capacity = (VAR_WIDTH_CAPACITY as u64).min(validity_bits);
                Ok(Self {
                    element_width: None,
                    capacity,
                    validity_buffer_offset: validity_offset,
                    data_buffer_offset: data_offset,
                    offsets_buffer_offset: offsets_offset,
                })
            }
        }
    }

    pub fn is_variable(&self) -> bool {
        self.element_width.is_none()
    }

    /// Byte size of the data buffer (the heap, for variable-width columns).
    pub fn data_buffer_size(&self) -> usize {
        self.validity_buffer_offset - self.data_buffer_offset
    }
}

/// Byte size of the validity bitmap at the tail of every region.
pub(crate) fn validity_buffer_size() -> usize {
    let bytes = (SEGMENT_SIZE - SEGMENT_HEADER_SIZE) / 8;
    64 * (bytes / 64 + 1)
}

/// Whether `region` already carries an initialized segment header.
pub fn is_initialized(region: &[u8]) -> bool {
    region.len() >= SEGMENT_MAGIC.len() && &region[..SEGMENT_MAGIC.len()] == SEGMENT_MAGIC
}

/// One-time initialization of a freshly created segment.
///
/// Zeroes the region, then writes the header: magic, version, element
/// width, buffer offsets, capacity, `length = 0`. Refuses to run on a
/// region whose magic is already present, since re-initializing would
/// destroy live column data. Callers hold the segment's writer lock across
/// this call.
pub fn initialize_header(region: &mut [u8], desc: &ColumnDescriptor) -> Result<SegmentLayout> {
    ensure!(
        region.len() >= SEGMENT_SIZE,
        "segment region is {} bytes, expected at least {}",
        region.len(),
        SEGMENT_SIZE
    );
    ensure!(
        !is_initialized(region),
        "segment is already initialized; refusing to overwrite live column data"
    );

    let layout = SegmentLayout::for_column(desc)?;

    region[..SEGMENT_SIZE].fill(0);

    let header = SegmentHeader {
        magic: *SEGMENT_MAGIC,
        element_width: I32::new(desc.element_width()),
        version: U32::new(SEGMENT_VERSION),
        length: U64::new(0),
        capacity: U64::new(layout.capacity),
        validity_buffer_offset: U64::new(layout.validity_buffer_offset as u64),
        data_buffer_offset: U64::new(layout.data_buffer_offset as u64),
        offsets_buffer_offset: U64::new(layout.offsets_buffer_offset as u64),
        reserved: [0u8; 8],
    };
    region[..SEGMENT_HEADER_SIZE].copy_from_slice(header.as_bytes());

    Ok(layout)
}

/// Parse and validate the header of a pre-existing segment against the
/// descriptor the host supplied for it.
pub fn read_layout(region: &[u8], desc: &ColumnDescriptor) -> Result<SegmentLayout> {
    let header = SegmentHeader::from_bytes(region)
        .wrap_err("segment exists but does not carry a valid header")?;

    if header.element_width() != desc.element_width() {
        return Err(StorageError::TypeNotHandled {
            type_name: desc.data_type().name(),
        })
        .wrap_err_with(|| {
            format!(
                "segment was initialized with element width {} but column {} expects {}",
                header.element_width(),
                desc.position(),
                desc.element_width()
            )
        });
    }

    let validity_offset = header.validity_buffer_offset() as usize;
    let data_offset = header.data_buffer_offset() as usize;
    let offsets_offset = header.offsets_buffer_offset() as usize;

    ensure!(
        validity_offset + validity_buffer_size() == SEGMENT_SIZE,
        "validity buffer offset {} does not close the region",
        validity_offset
    );
    ensure!(
        data_offset >= SEGMENT_HEADER_SIZE && data_offset < validity_offset,
        "data buffer offset {} is outside the region",
        data_offset
    );

    Ok(SegmentLayout {
        element_width: desc.data_type().fixed_size(),
        capacity: header.capacity(),
        validity_buffer_offset: validity_offset,
        data_buffer_offset: data_offset,
        offsets_buffer_offset: offsets_offset,
    })
}
