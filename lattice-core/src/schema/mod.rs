//! Tensor schemas
//!
//! A tensor schema knows how to turn key-range reads against one array into
//! field tensors of a single [`TensorKind`]. Schemas are built through the
//! kind-keyed factory in [`params::ArrayParams::to_schema`]; construction
//! dispatch is a closed match over the kind, never open registration.

pub mod dense;
pub mod mapped;
pub mod params;
pub mod ragged;
pub mod sparse;

use std::collections::HashMap;
use std::sync::Arc;

use crate::array::KeyRange;
use crate::error::Result;
use crate::pipeline::buffer::Buffer;
use crate::tensor::{TensorBlock, TensorKind};

pub use dense::DenseSchema;
pub use mapped::MappedSchema;
pub use params::{ArrayParams, FieldSpec, KeyDim, SecondarySlice};
pub use ragged::RaggedSchema;
pub use sparse::{CooSchema, CsrSchema};

/// Per-tensor transform applied by [`MappedSchema`]
pub type TensorTransform = Arc<dyn Fn(TensorBlock) -> TensorBlock + Send + Sync>;

/// Gate or transform for one tensor kind
#[derive(Clone)]
pub enum KindPolicy {
    /// Kind is usable as-is (same as no entry)
    Allow,
    /// Kind is explicitly disabled; construction fails
    Deny,
    /// Kind is usable, every produced tensor passes through the function
    Map(TensorTransform),
}

/// Caller-supplied policies keyed by tensor kind
pub type TransformMap = HashMap<TensorKind, KindPolicy>;

/// Uniform read contract across all schema variants
pub trait TensorSchema: Send + Sync {
    /// Representation produced by this schema
    fn kind(&self) -> TensorKind;

    /// Requested field names, in output order
    fn fields(&self) -> &[String];

    /// Non-empty-domain bounds along the key dimension
    fn key_bounds(&self) -> KeyRange;

    /// Number of rows along the key dimension
    fn row_count(&self) -> u64 {
        self.key_bounds().len()
    }

    /// Estimated bytes one row contributes to a buffer
    fn estimated_row_bytes(&self) -> usize;

    /// Read every row of the key range into one buffer
    fn read(&self, range: KeyRange) -> Result<Buffer>;

    /// Lazy sequence of buffers covering `range` in chunks of
    /// `rows_per_chunk` rows, in key order
    fn iter_tensors(&self, range: KeyRange, rows_per_chunk: u64) -> TensorIter<'_>
    where
        Self: Sized,
    {
        TensorIter::new(self, range, rows_per_chunk)
    }
}

impl std::fmt::Debug for dyn TensorSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TensorSchema")
            .field("kind", &self.kind())
            .field("fields", &self.fields())
            .field("key_bounds", &self.key_bounds())
            .finish()
    }
}

/// Iterator over successive chunk reads of one schema
pub struct TensorIter<'a> {
    schema: &'a dyn TensorSchema,
    remaining: KeyRange,
    rows_per_chunk: u64,
    failed: bool,
}

impl<'a> TensorIter<'a> {
    pub fn new(schema: &'a dyn TensorSchema, range: KeyRange, rows_per_chunk: u64) -> Self {
        Self {
            schema,
            remaining: range,
            rows_per_chunk: rows_per_chunk.max(1),
            failed: false,
        }
    }
}

impl Iterator for TensorIter<'_> {
    type Item = Result<Buffer>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.remaining.is_empty() {
            return None;
        }
        let chunk = self.remaining.take(self.rows_per_chunk);
        self.remaining.start = chunk.end + 1;
        match self.schema.read(chunk) {
            Ok(buffer) => Some(Ok(buffer)),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
