//! # Column Data Types
//!
//! The canonical `DataType` discriminant for column storage. Hosts supply
//! one per column out of their catalog metadata; the array layer uses it to
//! select the buffer layout (2 buffers fixed-width, 3 variable-width) and
//! the cell encoding.
//!
//! ## Discriminant Values
//!
//! - 1-5: fixed-width primitives (integers, floats)
//! - 20-21: variable-width payloads (text, blob)
//!
//! The `#[repr(u8)]` keeps the discriminant a single byte so it can travel
//! in compact descriptors.
//!
//! ## Element Width Convention
//!
//! `element_width()` returns the byte width for fixed-width types and `-1`
//! for variable-width types, the same sentinel the segment header stores on
//! disk. `fixed_size()` is the `Option`-shaped accessor for Rust callers.

/// Storage type discriminant for one column.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int2 = 1,
    Int4 = 2,
    Int8 = 3,
    Float4 = 4,
    Float8 = 5,

    Text = 20,
    Blob = 21,
}

impl DataType {
    /// Byte width of one element for fixed-width types, `None` for
    /// variable-width types.
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            DataType::Int2 => Some(2),
            DataType::Int4 => Some(4),
            DataType::Int8 => Some(8),
            DataType::Float4 => Some(4),
            DataType::Float8 => Some(8),
            DataType::Text | DataType::Blob => None,
        }
    }

    /// Whether elements of this type need an offsets buffer to locate
    /// variable-length payloads.
    pub fn is_variable(self) -> bool {
        self.fixed_size().is_none()
    }

    /// Element width as stored in the segment header: the byte width for
    /// fixed-width types, `-1` for variable-width types.
    pub fn element_width(self) -> i32 {
        match self.fixed_size() {
            Some(width) => width as i32,
            None => -1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DataType::Int2 => "int2",
            DataType::Int4 => "int4",
            DataType::Int8 => "int8",
            DataType::Float4 => "float4",
            DataType::Float8 => "float8",
            DataType::Text => "text",
            DataType::Blob => "blob",
        }
    }
}
