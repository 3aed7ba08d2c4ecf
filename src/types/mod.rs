//! # Column Metadata and Values
//!
//! Type discriminants, column descriptors, and the owned cell value enum
//! that cross the boundary between the host and the storage core.

mod column;
mod data_type;
mod value;

pub use column::ColumnDescriptor;
pub use data_type::DataType;
pub use value::Value;
