//! # Columnar Array Layer
//!
//! The buffer-oriented view over mapped segments (`ColumnArray`) and the
//! process-local cache that keeps one live view per column (`ArrayCache`).

mod cache;
mod view;

pub use cache::ArrayCache;
pub use view::ColumnArray;
