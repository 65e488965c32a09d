//! Array handle trait and read result blocks
//!
//! One `ArrayHandle` is opened read-only per array per training run; the
//! pipeline never mutates it. Reads are expressed over inclusive key ranges
//! matching the storage engine's non-empty-domain convention.

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use super::meta::{AttributeMeta, DimensionMeta};
use crate::error::Result;

/// Inclusive range of key-dimension values
///
/// The unit of a single storage read and of worker shard ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRange {
    /// First key, inclusive
    pub start: i64,
    /// Last key, inclusive
    pub end: i64,
}

impl KeyRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// Number of keys covered by the range
    pub fn len(&self) -> u64 {
        if self.end < self.start {
            0
        } else {
            (self.end - self.start + 1) as u64
        }
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn contains(&self, key: i64) -> bool {
        key >= self.start && key <= self.end
    }

    /// Leading sub-range of at most `rows` keys
    pub fn take(&self, rows: u64) -> KeyRange {
        if rows == 0 || self.is_empty() {
            return KeyRange::new(self.start, self.start - 1);
        }
        let end = self.start.saturating_add(rows as i64 - 1).min(self.end);
        KeyRange::new(self.start, end)
    }
}

/// Dense read result: one row-major tensor per requested field,
/// in storage dimension order
#[derive(Debug, Clone)]
pub struct DenseBlock {
    pub fields: Vec<(String, ArrayD<f32>)>,
}

/// Sparse read result: cell-aligned coordinate and value vectors,
/// in stored cell order
#[derive(Debug, Clone)]
pub struct SparseBlock {
    /// One coordinate vector per storage dimension
    pub coords: Vec<Vec<f64>>,
    /// Requested field values, cell-aligned with `coords`
    pub fields: Vec<(String, Vec<f32>)>,
}

impl SparseBlock {
    /// Number of non-empty cells in the block
    pub fn cell_count(&self) -> usize {
        self.coords.first().map_or(0, |c| c.len())
    }
}

/// Read-only handle onto one stored array
///
/// Collaborator interface: the storage engine implements this; the pipeline
/// consumes it. Read errors are surfaced unmodified, retry policy (if any)
/// belongs behind this trait.
pub trait ArrayHandle: Send + Sync {
    /// Identifier for logging
    fn uri(&self) -> &str;

    /// Sparse/dense flag from storage metadata
    fn is_sparse(&self) -> bool;

    /// Dimension metadata in storage order
    fn dimensions(&self) -> &[DimensionMeta];

    /// Attribute metadata
    fn attributes(&self) -> &[AttributeMeta];

    /// Bounding range of populated coordinates per dimension, storage order
    fn nonempty_domain(&self) -> Vec<(i64, i64)>;

    /// Average number of non-empty cells per key-dimension value
    ///
    /// Used only to size byte-budgeted read chunks for sparse arrays.
    fn estimated_cells_per_key(&self, key_dim_index: usize) -> f64;

    /// Read a contiguous block, one inclusive range per storage dimension.
    /// Requested fields may name attributes or dimensions; a dimension field
    /// materializes the coordinate grid along that axis.
    fn read_dense(&self, ranges: &[(i64, i64)], fields: &[String]) -> Result<DenseBlock>;

    /// Read all non-empty cells whose coordinate along `key_dim_index` falls
    /// in `range`, preserving stored cell order.
    fn read_sparse(
        &self,
        range: KeyRange,
        key_dim_index: usize,
        fields: &[String],
    ) -> Result<SparseBlock>;
}
