//! # Error Taxonomy
//!
//! All public APIs in this crate return `eyre::Result`, with context attached
//! via `wrap_err` as errors propagate upward. The failure classes that hosts
//! need to distinguish are modeled as `StorageError` variants; they are
//! carried inside the `eyre::Report` and can be recovered with
//! `report.downcast_ref::<StorageError>()`.
//!
//! Every variant is fatal at the point of detection. Nothing here is retried
//! internally: the caller decides whether to abort the operation, the
//! containing transaction, or the process.

use std::io;

use thiserror::Error;

/// Failure classes of the segment storage and columnar array layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The encoded segment or lock name does not fit the fixed-size name
    /// buffer accepted by the shared-memory namespace. Checked explicitly,
    /// never truncated.
    #[error("name \"{name}\" exceeds the {max}-byte shared object name limit")]
    NameTooLong { name: String, max: usize },

    /// The underlying shared object could not be opened or created: it is
    /// missing and creation was not requested, or access was denied.
    #[error("could not open shared segment \"{name}\": {source}")]
    OpenFailed {
        name: String,
        #[source]
        source: io::Error,
    },

    /// A freshly created shared object could not be sized to the fixed
    /// region size.
    #[error("could not size shared segment \"{name}\" to {size} bytes: {source}")]
    SizeFailed {
        name: String,
        size: usize,
        #[source]
        source: io::Error,
    },

    /// An append or get was requested for a type the array layer does not
    /// handle, or for a value that does not match the column's type. This is
    /// a schema/engine mismatch, never a transient condition.
    #[error("type {type_name} not handled for this column")]
    TypeNotHandled { type_name: &'static str },

    /// An append would push `length` past the element capacity of the fixed
    /// region, or past the variable-width heap. The region never grows; the
    /// write is rejected before any buffer is touched.
    #[error("segment capacity exceeded: {detail}")]
    CapacityExceeded { detail: String },

    /// The named writer-exclusion semaphore could not be opened or waited
    /// on.
    #[error("writer lock \"{name}\" failed: {source}")]
    LockFailed {
        name: String,
        #[source]
        source: io::Error,
    },
}
