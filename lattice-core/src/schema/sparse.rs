//! Sparse tensor schemas
//!
//! COO emits cells in stored global order with no per-row ordering
//! guarantee; CSR is restricted to 2-D arrays and preserves the original
//! column order within each row as stored.

use std::sync::Arc;

use tracing::debug;

use super::params::FieldSpec;
use super::TensorSchema;
use crate::array::{ArrayHandle, KeyRange};
use crate::error::{LatticeError, Result};
use crate::pipeline::buffer::Buffer;
use crate::tensor::{TensorBlock, TensorKind};

/// Cells of one key range resolved to block-relative positions,
/// stored cell order
pub(crate) struct SparseCells {
    /// Block-relative row index per cell
    pub rows: Vec<i64>,
    /// Positional coordinates per non-key logical axis, cell-aligned
    pub nonkey: Vec<Vec<i64>>,
    /// Field values, cell-aligned
    pub fields: Vec<(String, Vec<f32>)>,
    /// Block shape: rows in range, then full non-key extents
    pub shape: Vec<usize>,
}

pub(crate) fn read_sparse_cells(
    array: &Arc<dyn ArrayHandle>,
    spec: &FieldSpec,
    range: KeyRange,
) -> Result<SparseCells> {
    let bounds = spec.key_bounds();
    if range.is_empty() || range.start < bounds.start || range.end > bounds.end {
        return Err(LatticeError::OutOfDomain {
            start: range.start,
            end: range.end,
        });
    }

    let block = array.read_sparse(range, spec.key_dim_index, &spec.fields)?;
    debug!(
        uri = array.uri(),
        start = range.start,
        end = range.end,
        cells = block.cell_count(),
        "sparse read"
    );

    let ndim = spec.all_dims.len();
    let key_coords = &block.coords[spec.key_dim_index];
    let rows: Vec<i64> = key_coords.iter().map(|&c| c as i64 - range.start).collect();

    // Non-key coordinates become dense positional indices relative to the
    // dimension's non-empty-domain lower bound.
    let mut nonkey = Vec::with_capacity(ndim - 1);
    for logical in 1..ndim {
        let storage = spec.storage_axis(logical);
        let lo = spec.ned[logical].0;
        nonkey.push(
            block.coords[storage]
                .iter()
                .map(|&c| c as i64 - lo)
                .collect(),
        );
    }

    let mut shape = Vec::with_capacity(ndim);
    shape.push(range.len() as usize);
    for logical in 1..ndim {
        shape.push(spec.extent(logical));
    }

    Ok(SparseCells {
        rows,
        nonkey,
        fields: block.fields,
        shape,
    })
}

pub(crate) fn sparse_row_bytes(
    array: &Arc<dyn ArrayHandle>,
    spec: &FieldSpec,
) -> usize {
    let cells = array.estimated_cells_per_key(spec.key_dim_index).max(1.0);
    let per_cell = spec.fields.len() * 4 + spec.all_dims.len() * 8;
    (cells * per_cell as f64).ceil() as usize
}

/// Coordinate-list sparse schema
pub struct CooSchema {
    array: Arc<dyn ArrayHandle>,
    spec: FieldSpec,
}

impl CooSchema {
    pub fn new(array: Arc<dyn ArrayHandle>, spec: FieldSpec) -> Self {
        Self { array, spec }
    }
}

impl TensorSchema for CooSchema {
    fn kind(&self) -> TensorKind {
        TensorKind::SparseCoo
    }

    fn fields(&self) -> &[String] {
        &self.spec.fields
    }

    fn key_bounds(&self) -> KeyRange {
        self.spec.key_bounds()
    }

    fn estimated_row_bytes(&self) -> usize {
        sparse_row_bytes(&self.array, &self.spec)
    }

    fn read(&self, range: KeyRange) -> Result<Buffer> {
        let cells = read_sparse_cells(&self.array, &self.spec, range)?;
        let mut coords = Vec::with_capacity(1 + cells.nonkey.len());
        coords.push(cells.rows);
        coords.extend(cells.nonkey);

        let fields = cells
            .fields
            .into_iter()
            .map(|(name, values)| {
                (
                    name,
                    TensorBlock::SparseCoo {
                        coords: coords.clone(),
                        values,
                        shape: cells.shape.clone(),
                    },
                )
            })
            .collect();

        Ok(Buffer {
            keys: (range.start..=range.end).collect(),
            fields,
        })
    }
}

/// Compressed-row sparse schema, 2-D arrays only
pub struct CsrSchema {
    array: Arc<dyn ArrayHandle>,
    spec: FieldSpec,
}

impl CsrSchema {
    pub fn new(array: Arc<dyn ArrayHandle>, spec: FieldSpec) -> Self {
        Self { array, spec }
    }
}

impl TensorSchema for CsrSchema {
    fn kind(&self) -> TensorKind {
        TensorKind::SparseCsr
    }

    fn fields(&self) -> &[String] {
        &self.spec.fields
    }

    fn key_bounds(&self) -> KeyRange {
        self.spec.key_bounds()
    }

    fn estimated_row_bytes(&self) -> usize {
        sparse_row_bytes(&self.array, &self.spec)
    }

    fn read(&self, range: KeyRange) -> Result<Buffer> {
        let cells = read_sparse_cells(&self.array, &self.spec, range)?;
        let num_rows = cells.shape[0];

        // Stable bucketing by row keeps the stored column order within
        // each row, which COO does not promise.
        let mut by_row: Vec<Vec<usize>> = vec![Vec::new(); num_rows];
        for (cell, &row) in cells.rows.iter().enumerate() {
            by_row[row as usize].push(cell);
        }

        let mut indptr = Vec::with_capacity(num_rows + 1);
        let mut order = Vec::with_capacity(cells.rows.len());
        indptr.push(0i64);
        for row_cells in &by_row {
            order.extend_from_slice(row_cells);
            indptr.push(order.len() as i64);
        }
        let indices: Vec<i64> = order.iter().map(|&c| cells.nonkey[0][c]).collect();

        let fields = cells
            .fields
            .into_iter()
            .map(|(name, values)| {
                let values: Vec<f32> = order.iter().map(|&c| values[c]).collect();
                (
                    name,
                    TensorBlock::SparseCsr {
                        indptr: indptr.clone(),
                        indices: indices.clone(),
                        values,
                        shape: cells.shape.clone(),
                    },
                )
            })
            .collect();

        Ok(Buffer {
            keys: (range.start..=range.end).collect(),
            fields,
        })
    }
}
