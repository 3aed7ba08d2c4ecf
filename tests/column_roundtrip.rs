//! # Column Round-Trip Tests
//!
//! End-to-end append/get behavior through the public API:
//!
//! 1. Any interleaving of values and nulls reads back exactly as appended,
//!    with the final length equal to the number of appends.
//! 2. Null polarity: a set validity bit means null, and `get_value`
//!    reports it as `None`.
//! 3. Capacity boundary: filling a segment to its computed capacity
//!    succeeds and the next append fails with `CapacityExceeded` without
//!    corrupting adjacent buffers.
//! 4. Variable-width columns round-trip through the offsets buffer,
//!    including empty strings and nulls.
//!
//! Segment names are system global, so every test derives fresh keys from
//! the process id and removes its objects when done.

use std::sync::atomic::{AtomicU32, Ordering};

use colseg::{
    ArrayCache, ColumnDescriptor, DataType, SegmentKey, SharedSegment, StorageError, Value,
    WriterLock,
};

fn fresh_key() -> SegmentKey {
    static NEXT: AtomicU32 = AtomicU32::new(0);
    let key = SegmentKey::new(
        std::process::id(),
        40_000 + NEXT.fetch_add(1, Ordering::Relaxed),
        1,
    );
    SharedSegment::remove(key).unwrap();
    WriterLock::remove(key).unwrap();
    key
}

fn cleanup(key: SegmentKey) {
    SharedSegment::remove(key).unwrap();
    WriterLock::remove(key).unwrap();
}

#[test]
fn appended_values_and_nulls_read_back_exactly() {
    let key = fresh_key();
    let desc = ColumnDescriptor::new(DataType::Int8, 1);
    let mut cache = ArrayCache::new();
    let array = cache.get_or_open(key, &desc, true).unwrap();

    let rows: Vec<Option<i64>> = vec![
        Some(1),
        None,
        Some(3),
        Some(-3000),
        None,
        None,
        Some(i64::MAX),
        Some(i64::MIN),
    ];

    for row in &rows {
        match row {
            Some(v) => array.append_value(&Value::Int8(*v)).unwrap(),
            None => array.append_null().unwrap(),
        }
    }

    assert_eq!(array.len(), rows.len() as u64);
    for (i, row) in rows.iter().enumerate() {
        let expected = row.map(Value::Int8);
        assert_eq!(array.get_value(i as u64).unwrap(), expected, "row {i}");
    }

    drop(cache);
    cleanup(key);
}

#[test]
fn fixed_width_column_scenario() {
    // Create an 8-byte column, append [1, null, 3], expect length 3 and
    // the exact cells back.
    let key = fresh_key();
    let desc = ColumnDescriptor::new(DataType::Int8, 1);
    let mut cache = ArrayCache::new();
    let array = cache.get_or_open(key, &desc, true).unwrap();

    array.append_value(&Value::Int8(1)).unwrap();
    array.append_null().unwrap();
    array.append_value(&Value::Int8(3)).unwrap();

    assert_eq!(array.len(), 3);
    assert_eq!(array.get_value(0).unwrap(), Some(Value::Int8(1)));
    assert_eq!(array.get_value(1).unwrap(), None);
    assert_eq!(array.get_value(2).unwrap(), Some(Value::Int8(3)));

    drop(cache);
    cleanup(key);
}

#[test]
fn null_polarity() {
    let key = fresh_key();
    let desc = ColumnDescriptor::new(DataType::Int4, 1);
    let mut cache = ArrayCache::new();
    let array = cache.get_or_open(key, &desc, true).unwrap();

    array.append_null().unwrap();
    array.append_value(&Value::Int4(5)).unwrap();

    assert!(array.is_null(0));
    assert_eq!(array.get_value(0).unwrap(), None);
    assert!(!array.is_null(1));
    assert_eq!(array.get_value(1).unwrap(), Some(Value::Int4(5)));

    drop(cache);
    cleanup(key);
}

#[test]
fn capacity_boundary_rejects_the_overflowing_append() {
    let key = fresh_key();
    let desc = ColumnDescriptor::new(DataType::Float8, 1);
    let mut cache = ArrayCache::new();
    let array = cache.get_or_open(key, &desc, true).unwrap();

    let capacity = array.capacity();
    for i in 0..capacity {
        array.append_value(&Value::Float8(i as f64)).unwrap();
    }
    assert_eq!(array.len(), capacity);

    let report = array.append_value(&Value::Float8(0.0)).unwrap_err();
    let err = report.downcast_ref::<StorageError>().unwrap();
    assert!(matches!(err, StorageError::CapacityExceeded { .. }));

    // The rejected append changed nothing.
    assert_eq!(array.len(), capacity);
    assert_eq!(
        array.get_value(capacity - 1).unwrap(),
        Some(Value::Float8((capacity - 1) as f64))
    );
    assert_eq!(array.get_value(0).unwrap(), Some(Value::Float8(0.0)));

    drop(cache);
    cleanup(key);
}

#[test]
fn variable_width_round_trip_with_nulls() {
    let key = fresh_key();
    let desc = ColumnDescriptor::new(DataType::Text, 1);
    let mut cache = ArrayCache::new();
    let array = cache.get_or_open(key, &desc, true).unwrap();

    let rows = [
        Some("first"),
        None,
        Some(""),
        Some("a longer cell that spans more of the heap"),
        None,
        Some("last"),
    ];

    for row in &rows {
        match row {
            Some(s) => array.append_value(&Value::from(*s)).unwrap(),
            None => array.append_null().unwrap(),
        }
    }

    assert_eq!(array.len(), rows.len() as u64);
    for (i, row) in rows.iter().enumerate() {
        let expected = row.map(Value::from);
        assert_eq!(array.get_value(i as u64).unwrap(), expected, "row {i}");
    }

    drop(cache);
    cleanup(key);
}

#[test]
fn variable_width_heap_exhaustion() {
    let key = fresh_key();
    let desc = ColumnDescriptor::new(DataType::Blob, 1);
    let mut cache = ArrayCache::new();
    let array = cache.get_or_open(key, &desc, true).unwrap();

    // Fill the heap in large chunks until an append is rejected; the
    // element budget is far larger than the heap allows at this cell size.
    let chunk = vec![0x5Au8; 512];
    let mut appended = 0u64;
    let rejected = loop {
        match array.append_value(&Value::Blob(chunk.clone())) {
            Ok(()) => appended += 1,
            Err(report) => break report,
        }
        assert!(appended < array.capacity(), "heap never filled up");
    };

    let err = rejected.downcast_ref::<StorageError>().unwrap();
    assert!(matches!(err, StorageError::CapacityExceeded { .. }));

    // Everything appended before the rejection is intact.
    assert_eq!(array.len(), appended);
    for i in 0..appended {
        assert_eq!(
            array.get_value(i).unwrap(),
            Some(Value::Blob(chunk.clone()))
        );
    }

    drop(cache);
    cleanup(key);
}

#[test]
fn mismatched_value_type_is_type_not_handled() {
    let key = fresh_key();
    let desc = ColumnDescriptor::new(DataType::Int2, 1);
    let mut cache = ArrayCache::new();
    let array = cache.get_or_open(key, &desc, true).unwrap();

    let report = array.append_value(&Value::from("nope")).unwrap_err();
    let err = report.downcast_ref::<StorageError>().unwrap();
    assert!(matches!(err, StorageError::TypeNotHandled { .. }));
    assert_eq!(array.len(), 0);

    drop(cache);
    cleanup(key);
}
