//! Storage collaborator boundary
//!
//! Metadata introspection and range reads against a keyed array store.
//! The pipeline only ever talks to [`ArrayHandle`]; [`MemArray`] is the
//! in-memory implementation used by tests and as a reference adapter.

pub mod handle;
pub mod mem;
pub mod meta;

pub use handle::{ArrayHandle, DenseBlock, KeyRange, SparseBlock};
pub use mem::{MemArray, MemArrayBuilder};
pub use meta::{AttributeMeta, Datatype, DimensionMeta};
