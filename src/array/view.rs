//! # Columnar Array View
//!
//! `ColumnArray` interprets one mapped segment as a columnar array: a
//! validity bitmap, a typed value buffer, and, for variable-width columns,
//! an offsets buffer of prefix sums. The view owns no column bytes — only
//! its process-local mapping and bookkeeping — and dropping it never
//! touches the shared region.
//!
//! ## Buffer Order
//!
//! Fixed-width columns expose 2 buffers (validity, data); variable-width
//! columns expose 3 (validity, offsets, data), matching the Arrow buffer
//! ordering the layout is modeled on.
//!
//! ## Write Protocol
//!
//! Appends take the segment's writer lock, check capacity, write the cell
//! bytes and validity bit, and only then release-store the incremented
//! length. Published cells are never rewritten, so readers that
//! acquire-load the length can decode everything below it without further
//! synchronization.
//!
//! ## Null Convention
//!
//! Bit `index % 8` of validity byte `index / 8`; set means null. Appending
//! a value clears the bit, appending a null sets it.

use std::ops::Range;

use eyre::{Result, WrapErr};
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::error::StorageError;
use crate::storage::{read_layout, SegmentKey, SegmentLayout, SharedSegment, WriterLock};
use crate::types::{ColumnDescriptor, DataType, Value};

/// Live view over one column's mapped segment.
#[derive(Debug)]
pub struct ColumnArray {
    segment: SharedSegment,
    lock: WriterLock,
    layout: SegmentLayout,
    data_type: DataType,
    /// Byte ranges of the buffers in Arrow order.
    buffers: SmallVec<[Range<usize>; 3]>,
}

impl ColumnArray {
    /// Build a view over an initialized segment, validating the on-segment
    /// header against the descriptor the host supplied.
    pub fn new(
        segment: SharedSegment,
        lock: WriterLock,
        desc: &ColumnDescriptor,
    ) -> Result<Self> {
        let layout = read_layout(segment.bytes(), desc).wrap_err_with(|| {
            format!(
                "segment {} is not usable for column {}",
                segment.name(),
                desc.position()
            )
        })?;

        let mut buffers: SmallVec<[Range<usize>; 3]> = SmallVec::new();
        buffers.push(layout.validity_buffer_offset..crate::storage::SEGMENT_SIZE);
        if layout.is_variable() {
            buffers.push(layout.offsets_buffer_offset..layout.data_buffer_offset);
        }
        buffers.push(layout.data_buffer_offset..layout.validity_buffer_offset);

        debug!(
            segment = %segment.name(),
            data_type = desc.data_type().name(),
            length = segment.length(),
            capacity = layout.capacity,
            n_buffers = buffers.len(),
            "opened column array view"
        );

        Ok(Self {
            segment,
            lock,
            layout,
            data_type: desc.data_type(),
            buffers,
        })
    }

    pub fn key(&self) -> SegmentKey {
        self.segment.key()
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Number of buffers backing the view: 2 for fixed-width columns, 3
    /// for variable-width columns.
    pub fn n_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Current element count, read from the shared header with acquire
    /// ordering, so every attacher sees the same value.
    pub fn len(&self) -> u64 {
        self.segment.length()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element capacity of the backing region, fixed at creation.
    pub fn capacity(&self) -> u64 {
        self.layout.capacity
    }

    /// Whether the element at `index` is null.
    ///
    /// # Panics
    ///
    /// `index` must be below `len()`; going past it is a programming
    /// error, not a recoverable condition.
    pub fn is_null(&self, index: u64) -> bool {
        let length = self.len();
        assert!(
            index < length,
            "index {index} out of range for column array of length {length}"
        );
        self.null_bit(index as usize)
    }

    /// Read the element at `index`; `None` means null.
    ///
    /// # Panics
    ///
    /// `index` must be below `len()`.
    pub fn get_value(&self, index: u64) -> Result<Option<Value>> {
        let length = self.len();
        assert!(
            index < length,
            "index {index} out of range for column array of length {length}"
        );

        let i = index as usize;
        if self.null_bit(i) {
            return Ok(None);
        }

        let value = match self.data_type {
            DataType::Int2 => {
                let mut b = [0u8; 2];
                b.copy_from_slice(self.fixed_cell(i, 2));
                Value::Int2(i16::from_le_bytes(b))
            }
            DataType::Int4 => {
                let mut b = [0u8; 4];
                b.copy_from_slice(self.fixed_cell(i, 4));
                Value::Int4(i32::from_le_bytes(b))
            }
            DataType::Int8 => {
                let mut b = [0u8; 8];
                b.copy_from_slice(self.fixed_cell(i, 8));
                Value::Int8(i64::from_le_bytes(b))
            }
            DataType::Float4 => {
                let mut b = [0u8; 4];
                b.copy_from_slice(self.fixed_cell(i, 4));
                Value::Float4(f32::from_le_bytes(b))
            }
            DataType::Float8 => {
                let mut b = [0u8; 8];
                b.copy_from_slice(self.fixed_cell(i, 8));
                Value::Float8(f64::from_le_bytes(b))
            }
            DataType::Text => {
                let bytes = self.var_cell(i);
                let text = std::str::from_utf8(bytes)
                    .wrap_err_with(|| format!("text cell {i} holds invalid UTF-8"))?;
                Value::Text(text.to_owned())
            }
            DataType::Blob => Value::Blob(self.var_cell(i).to_vec()),
        };

        Ok(Some(value))
    }

    /// Append a null: set the validity bit at the current length, then
    /// publish the new length.
    pub fn append_null(&mut self) -> Result<()> {
        let ColumnArray {
            segment,
            lock,
            layout,
            ..
        } = self;

        let _guard = lock.acquire()?;
        let length = segment.length();
        check_element_capacity(length, layout.capacity)?;

        let i = length as usize;
        if layout.is_variable() {
            // Nulls occupy zero heap bytes; carry the prefix sum forward so
            // later elements still decode.
            let end = read_offset(segment.bytes(), layout, i);
            write_offset(segment.bytes_mut(), layout, i + 1, end);
        }

        let byte = layout.validity_buffer_offset + i / 8;
        segment.bytes_mut()[byte] |= 1 << (i % 8);

        segment.publish_length(length + 1);
        trace!(segment = %segment.name(), length = length + 1, "appended null");
        Ok(())
    }

    /// Append a non-null value at the current length, then publish the new
    /// length. The value's type must match the column's type exactly.
    pub fn append_value(&mut self, value: &Value) -> Result<()> {
        if value.data_type() != self.data_type {
            return Err(StorageError::TypeNotHandled {
                type_name: value.data_type().name(),
            })
            .wrap_err_with(|| {
                format!(
                    "cannot append a {} value into a {} column",
                    value.data_type().name(),
                    self.data_type.name()
                )
            });
        }

        let ColumnArray {
            segment,
            lock,
            layout,
            ..
        } = self;

        let _guard = lock.acquire()?;
        let length = segment.length();
        check_element_capacity(length, layout.capacity)?;

        let i = length as usize;
        match value {
            Value::Int2(v) => write_fixed(segment, layout, i, &v.to_le_bytes()),
            Value::Int4(v) => write_fixed(segment, layout, i, &v.to_le_bytes()),
            Value::Int8(v) => write_fixed(segment, layout, i, &v.to_le_bytes()),
            Value::Float4(v) => write_fixed(segment, layout, i, &v.to_le_bytes()),
            Value::Float8(v) => write_fixed(segment, layout, i, &v.to_le_bytes()),
            Value::Text(s) => append_var(segment, layout, i, s.as_bytes())?,
            Value::Blob(b) => append_var(segment, layout, i, b)?,
        }

        // Value present: clear the null bit.
        let byte = layout.validity_buffer_offset + i / 8;
        segment.bytes_mut()[byte] &= !(1 << (i % 8));

        segment.publish_length(length + 1);
        trace!(segment = %segment.name(), length = length + 1, "appended value");
        Ok(())
    }

    fn null_bit(&self, index: usize) -> bool {
        let byte = self.layout.validity_buffer_offset + index / 8;
        self.segment.bytes()[byte] & (1 << (index % 8)) != 0
    }

    fn fixed_cell(&self, index: usize, width: usize) -> &[u8] {
        let start = self.layout.data_buffer_offset + index * width;
        &self.segment.bytes()[start..start + width]
    }

    fn var_cell(&self, index: usize) -> &[u8] {
        let start = read_offset(self.segment.bytes(), &self.layout, index) as usize;
        let end = read_offset(self.segment.bytes(), &self.layout, index + 1) as usize;
        let data = self.layout.data_buffer_offset;
        &self.segment.bytes()[data + start..data + end]
    }
}

fn check_element_capacity(length: u64, capacity: u64) -> Result<()> {
    if length >= capacity {
        return Err(StorageError::CapacityExceeded {
            detail: format!("segment holds {length} of {capacity} elements"),
        }
        .into());
    }
    Ok(())
}

fn write_fixed(segment: &mut SharedSegment, layout: &SegmentLayout, index: usize, bytes: &[u8]) {
    debug_assert_eq!(Some(bytes.len()), layout.element_width);
    let start = layout.data_buffer_offset + index * bytes.len();
    let end = start + bytes.len();
    segment.bytes_mut()[start..end].copy_from_slice(bytes);
}

fn append_var(
    segment: &mut SharedSegment,
    layout: &SegmentLayout,
    index: usize,
    bytes: &[u8],
) -> Result<()> {
    let heap_size = layout.data_buffer_size();
    let start = read_offset(segment.bytes(), layout, index) as usize;
    let end = start + bytes.len();
    if end > heap_size {
        return Err(StorageError::CapacityExceeded {
            detail: format!(
                "heap append of {} bytes exceeds the {} bytes remaining in the segment",
                bytes.len(),
                heap_size - start
            ),
        }
        .into());
    }

    let data = layout.data_buffer_offset;
    segment.bytes_mut()[data + start..data + end].copy_from_slice(bytes);
    write_offset(segment.bytes_mut(), layout, index + 1, end as u32);
    Ok(())
}

fn read_offset(region: &[u8], layout: &SegmentLayout, index: usize) -> u32 {
    let start = layout.offsets_buffer_offset + index * 4;
    let mut b = [0u8; 4];
    b.copy_from_slice(&region[start..start + 4]);
    u32::from_le_bytes(b)
}

fn write_offset(region: &mut [u8], layout: &SegmentLayout, index: usize, value: u32) {
    let start = layout.offsets_buffer_offset + index * 4;
    region[start..start + 4].copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::initialize_header;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fresh_key(column: u16) -> SegmentKey {
        static NEXT: AtomicU32 = AtomicU32::new(0);
        let key = SegmentKey::new(
            std::process::id(),
            7000 + NEXT.fetch_add(1, Ordering::Relaxed),
            column,
        );
        SharedSegment::remove(key).unwrap();
        WriterLock::remove(key).unwrap();
        key
    }

    fn open_array(key: SegmentKey, desc: &ColumnDescriptor) -> ColumnArray {
        let (mut segment, created) = SharedSegment::open_or_create(key, true).unwrap();
        let lock = WriterLock::open(key).unwrap();
        if created {
            let guard = lock.acquire().unwrap();
            initialize_header(segment.bytes_mut(), desc).unwrap();
            drop(guard);
        }
        ColumnArray::new(segment, lock, desc).unwrap()
    }

    fn cleanup(key: SegmentKey) {
        SharedSegment::remove(key).unwrap();
        WriterLock::remove(key).unwrap();
    }

    #[test]
    fn fixed_width_view_has_two_buffers() {
        let key = fresh_key(1);
        let desc = ColumnDescriptor::new(DataType::Int8, 1);
        let array = open_array(key, &desc);

        assert_eq!(array.n_buffers(), 2);
        assert_eq!(array.len(), 0);
        assert!(array.is_empty());
        assert!(array.capacity() > 0);

        drop(array);
        cleanup(key);
    }

    #[test]
    fn variable_width_view_has_three_buffers() {
        let key = fresh_key(2);
        let desc = ColumnDescriptor::new(DataType::Text, 1);
        let array = open_array(key, &desc);

        assert_eq!(array.n_buffers(), 3);

        drop(array);
        cleanup(key);
    }

    #[test]
    fn append_and_get_round_trip() {
        let key = fresh_key(3);
        let desc = ColumnDescriptor::new(DataType::Int8, 1);
        let mut array = open_array(key, &desc);

        array.append_value(&Value::Int8(1)).unwrap();
        array.append_null().unwrap();
        array.append_value(&Value::Int8(3)).unwrap();

        assert_eq!(array.len(), 3);
        assert_eq!(array.get_value(0).unwrap(), Some(Value::Int8(1)));
        assert_eq!(array.get_value(1).unwrap(), None);
        assert_eq!(array.get_value(2).unwrap(), Some(Value::Int8(3)));

        drop(array);
        cleanup(key);
    }

    #[test]
    fn null_polarity_is_set_means_null() {
        let key = fresh_key(4);
        let desc = ColumnDescriptor::new(DataType::Int4, 1);
        let mut array = open_array(key, &desc);

        array.append_null().unwrap();
        array.append_value(&Value::Int4(42)).unwrap();

        assert!(array.is_null(0));
        assert!(!array.is_null(1));

        // The bit itself, straight from the validity buffer.
        let validity = &array.segment.bytes()[array.layout.validity_buffer_offset];
        assert_eq!(validity & 0b01, 0b01);
        assert_eq!(validity & 0b10, 0);

        drop(array);
        cleanup(key);
    }

    #[test]
    fn every_fixed_width_type_round_trips() {
        let cases = [
            (DataType::Int2, Value::Int2(-7)),
            (DataType::Int4, Value::Int4(123_456)),
            (DataType::Int8, Value::Int8(-9_876_543_210)),
            (DataType::Float4, Value::Float4(2.5)),
            (DataType::Float8, Value::Float8(-0.125)),
        ];

        for (n, (data_type, value)) in cases.into_iter().enumerate() {
            let key = fresh_key(10 + n as u16);
            let desc = ColumnDescriptor::new(data_type, 1);
            let mut array = open_array(key, &desc);

            array.append_value(&value).unwrap();
            assert_eq!(array.get_value(0).unwrap(), Some(value));

            drop(array);
            cleanup(key);
        }
    }

    #[test]
    fn text_and_blob_round_trip() {
        let key = fresh_key(20);
        let desc = ColumnDescriptor::new(DataType::Text, 1);
        let mut array = open_array(key, &desc);

        array.append_value(&Value::from("hello")).unwrap();
        array.append_null().unwrap();
        array.append_value(&Value::from("")).unwrap();
        array.append_value(&Value::from("shared memory")).unwrap();

        assert_eq!(array.get_value(0).unwrap(), Some(Value::from("hello")));
        assert_eq!(array.get_value(1).unwrap(), None);
        assert_eq!(array.get_value(2).unwrap(), Some(Value::from("")));
        assert_eq!(
            array.get_value(3).unwrap(),
            Some(Value::from("shared memory"))
        );

        drop(array);
        cleanup(key);

        let key = fresh_key(21);
        let desc = ColumnDescriptor::new(DataType::Blob, 1);
        let mut array = open_array(key, &desc);

        array.append_value(&Value::from(vec![0u8, 255, 7])).unwrap();
        assert_eq!(
            array.get_value(0).unwrap(),
            Some(Value::from(vec![0u8, 255, 7]))
        );

        drop(array);
        cleanup(key);
    }

    #[test]
    fn append_rejects_mismatched_value_type() {
        let key = fresh_key(30);
        let desc = ColumnDescriptor::new(DataType::Int8, 1);
        let mut array = open_array(key, &desc);

        let report = array.append_value(&Value::Int4(1)).unwrap_err();
        let err = report.downcast_ref::<StorageError>().unwrap();
        assert!(matches!(err, StorageError::TypeNotHandled { .. }));
        assert_eq!(array.len(), 0);

        drop(array);
        cleanup(key);
    }

    #[test]
    fn capacity_boundary_is_exact() {
        let key = fresh_key(31);
        let desc = ColumnDescriptor::new(DataType::Int8, 1);
        let mut array = open_array(key, &desc);

        let capacity = array.capacity();
        for i in 0..capacity {
            array.append_value(&Value::Int8(i as i64)).unwrap();
        }
        assert_eq!(array.len(), capacity);

        let report = array.append_value(&Value::Int8(0)).unwrap_err();
        let err = report.downcast_ref::<StorageError>().unwrap();
        assert!(matches!(err, StorageError::CapacityExceeded { .. }));

        let report = array.append_null().unwrap_err();
        let err = report.downcast_ref::<StorageError>().unwrap();
        assert!(matches!(err, StorageError::CapacityExceeded { .. }));

        // Nothing past the boundary was written.
        assert_eq!(array.len(), capacity);
        assert_eq!(array.get_value(capacity - 1).unwrap(), Some(Value::Int8(capacity as i64 - 1)));

        drop(array);
        cleanup(key);
    }

    #[test]
    fn heap_exhaustion_is_capacity_exceeded() {
        let key = fresh_key(32);
        let desc = ColumnDescriptor::new(DataType::Blob, 1);
        let mut array = open_array(key, &desc);

        let heap = array.layout.data_buffer_size();
        let report = array
            .append_value(&Value::Blob(vec![0u8; heap + 1]))
            .unwrap_err();
        let err = report.downcast_ref::<StorageError>().unwrap();
        assert!(matches!(err, StorageError::CapacityExceeded { .. }));
        assert_eq!(array.len(), 0);

        // The failed append released the writer lock; a fitting value still
        // goes through.
        array.append_value(&Value::Blob(vec![1u8; 16])).unwrap();
        assert_eq!(array.len(), 1);

        drop(array);
        cleanup(key);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn get_past_length_panics() {
        let key = fresh_key(33);
        let desc = ColumnDescriptor::new(DataType::Int8, 1);
        let mut array = open_array(key, &desc);
        array.append_value(&Value::Int8(1)).unwrap();

        let _ = array.get_value(1);
    }
}
