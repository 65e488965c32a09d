//! Lattice Core - Batched tensor streaming from keyed array stores
//!
//! This crate streams row-aligned slices from two keyed multi-dimensional
//! arrays (X and Y) and materializes them as batched tensors:
//! - Schema resolution and tensor-kind inference per array
//! - Dense, sparse-COO, sparse-CSR, and ragged representations
//! - Byte-budgeted buffered reads with window-local shuffling
//! - Deterministic worker sharding over the key domain

pub mod array;
pub mod error;
pub mod pipeline;
pub mod schema;
pub mod tensor;

pub use array::{ArrayHandle, KeyRange, MemArray};
pub use error::LatticeError;
pub use pipeline::{Batch, Loader, LoaderConfig};
pub use schema::{ArrayParams, TensorSchema};
pub use tensor::{TensorBlock, TensorKind};

/// Default rows per emitted batch
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Default byte budget per buffered read chunk
pub const DEFAULT_BUFFER_BYTES: usize = 64 * 1024 * 1024;

/// Default shuffle seed
pub const DEFAULT_SEED: u64 = 42;
