//! Tensor representations
//!
//! A [`TensorBlock`] is one field's data for a group of rows, in one of the
//! four representations. Blocks support the row-group operations the
//! pipeline needs: selecting rows by index (shuffle and batch slicing),
//! concatenating row groups across buffer boundaries, and densifying for
//! equivalence checks.
//!
//! Row coordinates inside a block are always relative to the block's first
//! row, never absolute key values.

use ndarray::{ArrayD, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{LatticeError, Result};

/// Closed set of tensor representations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TensorKind {
    /// Contiguous n-dimensional block
    Dense,
    /// Coordinate-list sparse
    SparseCoo,
    /// Compressed-row sparse, 2-D only
    SparseCsr,
    /// Variable-length row sequences
    Ragged,
}

/// One field's data for a contiguous group of rows
#[derive(Debug, Clone)]
pub enum TensorBlock {
    Dense(ArrayD<f32>),
    SparseCoo {
        /// One coordinate vector per dimension, cell-aligned; `coords[0]`
        /// is the block-relative row index
        coords: Vec<Vec<i64>>,
        values: Vec<f32>,
        shape: Vec<usize>,
    },
    SparseCsr {
        /// Row pointers, length `shape[0] + 1`
        indptr: Vec<i64>,
        /// Column positions, stored order preserved within each row
        indices: Vec<i64>,
        values: Vec<f32>,
        shape: Vec<usize>,
    },
    Ragged(Vec<Vec<f32>>),
}

impl TensorBlock {
    pub fn kind(&self) -> TensorKind {
        match self {
            TensorBlock::Dense(_) => TensorKind::Dense,
            TensorBlock::SparseCoo { .. } => TensorKind::SparseCoo,
            TensorBlock::SparseCsr { .. } => TensorKind::SparseCsr,
            TensorBlock::Ragged(_) => TensorKind::Ragged,
        }
    }

    /// Number of rows in the block
    pub fn num_rows(&self) -> usize {
        match self {
            TensorBlock::Dense(a) => a.shape().first().copied().unwrap_or(0),
            TensorBlock::SparseCoo { shape, .. } => shape.first().copied().unwrap_or(0),
            TensorBlock::SparseCsr { indptr, .. } => indptr.len().saturating_sub(1),
            TensorBlock::Ragged(rows) => rows.len(),
        }
    }

    /// Estimated in-memory footprint in bytes
    pub fn byte_size(&self) -> usize {
        match self {
            TensorBlock::Dense(a) => a.len() * 4,
            TensorBlock::SparseCoo { coords, values, .. } => {
                values.len() * 4 + coords.len() * values.len() * 8
            }
            TensorBlock::SparseCsr {
                indptr,
                indices,
                values,
                ..
            } => indptr.len() * 8 + indices.len() * 8 + values.len() * 4,
            TensorBlock::Ragged(rows) => {
                rows.iter().map(|r| r.len() * 4).sum::<usize>() + rows.len() * 24
            }
        }
    }

    /// New block holding `rows[i]` of `self` at row `i`, in the given order.
    ///
    /// Within-row cell order is preserved for every representation; this is
    /// what keeps CSR column ordering intact through shuffling and slicing.
    pub fn select_rows(&self, rows: &[usize]) -> TensorBlock {
        match self {
            TensorBlock::Dense(a) => TensorBlock::Dense(a.select(Axis(0), rows)),
            TensorBlock::SparseCoo {
                coords,
                values,
                shape,
            } => {
                let cells_by_row = group_cells_by_row(&coords[0], self.num_rows());
                let mut out_coords: Vec<Vec<i64>> = vec![Vec::new(); coords.len()];
                let mut out_values = Vec::new();
                for (new_row, &old_row) in rows.iter().enumerate() {
                    for &cell in &cells_by_row[old_row] {
                        out_coords[0].push(new_row as i64);
                        for d in 1..coords.len() {
                            out_coords[d].push(coords[d][cell]);
                        }
                        out_values.push(values[cell]);
                    }
                }
                let mut out_shape = shape.clone();
                out_shape[0] = rows.len();
                TensorBlock::SparseCoo {
                    coords: out_coords,
                    values: out_values,
                    shape: out_shape,
                }
            }
            TensorBlock::SparseCsr {
                indptr,
                indices,
                values,
                shape,
            } => {
                let mut out_indptr = Vec::with_capacity(rows.len() + 1);
                let mut out_indices = Vec::new();
                let mut out_values = Vec::new();
                out_indptr.push(0i64);
                for &row in rows {
                    let (lo, hi) = (indptr[row] as usize, indptr[row + 1] as usize);
                    out_indices.extend_from_slice(&indices[lo..hi]);
                    out_values.extend_from_slice(&values[lo..hi]);
                    out_indptr.push(out_indices.len() as i64);
                }
                let mut out_shape = shape.clone();
                out_shape[0] = rows.len();
                TensorBlock::SparseCsr {
                    indptr: out_indptr,
                    indices: out_indices,
                    values: out_values,
                    shape: out_shape,
                }
            }
            TensorBlock::Ragged(all) => {
                TensorBlock::Ragged(rows.iter().map(|&r| all[r].clone()).collect())
            }
        }
    }

    /// Concatenate row groups of the same representation
    pub fn concat(blocks: &[TensorBlock]) -> Result<TensorBlock> {
        let first = blocks
            .first()
            .ok_or_else(|| LatticeError::internal("concat of zero blocks"))?;
        if blocks.len() == 1 {
            return Ok(first.clone());
        }
        if blocks.iter().any(|b| b.kind() != first.kind()) {
            return Err(LatticeError::internal("concat of mixed tensor kinds"));
        }
        match first {
            TensorBlock::Dense(_) => {
                let views: Vec<_> = blocks
                    .iter()
                    .map(|b| match b {
                        TensorBlock::Dense(a) => a.view(),
                        _ => unreachable!(),
                    })
                    .collect();
                let joined = ndarray::concatenate(Axis(0), &views)
                    .map_err(|e| LatticeError::internal(format!("dense concat: {}", e)))?;
                Ok(TensorBlock::Dense(joined))
            }
            TensorBlock::SparseCoo { coords, shape, .. } => {
                let ndim = coords.len();
                let mut out_coords: Vec<Vec<i64>> = vec![Vec::new(); ndim];
                let mut out_values = Vec::new();
                let mut row_offset = 0i64;
                for block in blocks {
                    if let TensorBlock::SparseCoo {
                        coords, values, shape, ..
                    } = block
                    {
                        for (i, &v) in values.iter().enumerate() {
                            out_coords[0].push(coords[0][i] + row_offset);
                            for d in 1..ndim {
                                out_coords[d].push(coords[d][i]);
                            }
                            out_values.push(v);
                        }
                        row_offset += shape[0] as i64;
                    }
                }
                let mut out_shape = shape.clone();
                out_shape[0] = row_offset as usize;
                Ok(TensorBlock::SparseCoo {
                    coords: out_coords,
                    values: out_values,
                    shape: out_shape,
                })
            }
            TensorBlock::SparseCsr { shape, .. } => {
                let mut out_indptr = vec![0i64];
                let mut out_indices = Vec::new();
                let mut out_values = Vec::new();
                let mut rows = 0usize;
                for block in blocks {
                    if let TensorBlock::SparseCsr {
                        indptr,
                        indices,
                        values,
                        ..
                    } = block
                    {
                        let base = out_indices.len() as i64;
                        out_indices.extend_from_slice(indices);
                        out_values.extend_from_slice(values);
                        out_indptr.extend(indptr.iter().skip(1).map(|&p| p + base));
                        rows += indptr.len() - 1;
                    }
                }
                let mut out_shape = shape.clone();
                out_shape[0] = rows;
                Ok(TensorBlock::SparseCsr {
                    indptr: out_indptr,
                    indices: out_indices,
                    values: out_values,
                    shape: out_shape,
                })
            }
            TensorBlock::Ragged(_) => {
                let mut out = Vec::new();
                for block in blocks {
                    if let TensorBlock::Ragged(rows) = block {
                        out.extend(rows.iter().cloned());
                    }
                }
                Ok(TensorBlock::Ragged(out))
            }
        }
    }

    /// Materialize as a dense tensor; `None` for ragged blocks
    pub fn densified(&self) -> Option<ArrayD<f32>> {
        match self {
            TensorBlock::Dense(a) => Some(a.clone()),
            TensorBlock::SparseCoo {
                coords,
                values,
                shape,
            } => {
                let mut out = ArrayD::zeros(shape.clone());
                for (i, &v) in values.iter().enumerate() {
                    let idx: Vec<usize> = coords.iter().map(|dim| dim[i] as usize).collect();
                    out[idx.as_slice()] = v;
                }
                Some(out)
            }
            TensorBlock::SparseCsr {
                indptr,
                indices,
                values,
                shape,
            } => {
                let mut out = ArrayD::zeros(shape.clone());
                for row in 0..shape[0] {
                    for cell in indptr[row] as usize..indptr[row + 1] as usize {
                        out[[row, indices[cell] as usize]] = values[cell];
                    }
                }
                Some(out)
            }
            TensorBlock::Ragged(_) => None,
        }
    }
}

fn group_cells_by_row(row_coords: &[i64], num_rows: usize) -> Vec<Vec<usize>> {
    let mut by_row = vec![Vec::new(); num_rows];
    for (cell, &row) in row_coords.iter().enumerate() {
        by_row[row as usize].push(cell);
    }
    by_row
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::ArrayD;

    fn coo_block() -> TensorBlock {
        // rows: 0 -> [(1, 5.0)], 1 -> [(2, 6.0), (0, 7.0)], 2 -> []
        TensorBlock::SparseCoo {
            coords: vec![vec![0, 1, 1], vec![1, 2, 0]],
            values: vec![5.0, 6.0, 7.0],
            shape: vec![3, 3],
        }
    }

    fn csr_block() -> TensorBlock {
        TensorBlock::SparseCsr {
            indptr: vec![0, 1, 3, 3],
            indices: vec![1, 2, 0],
            values: vec![5.0, 6.0, 7.0],
            shape: vec![3, 3],
        }
    }

    #[test]
    fn test_select_rows_dense() {
        let block = TensorBlock::Dense(
            ArrayD::from_shape_vec(vec![3, 2], vec![0., 1., 2., 3., 4., 5.]).unwrap(),
        );
        let picked = block.select_rows(&[2, 0]);
        let dense = picked.densified().unwrap();
        assert_eq!(dense.shape(), &[2, 2]);
        assert_eq!(dense[[0, 0]], 4.0);
        assert_eq!(dense[[1, 1]], 1.0);
    }

    #[test]
    fn test_select_rows_csr_preserves_column_order() {
        let picked = csr_block().select_rows(&[1, 2, 0]);
        if let TensorBlock::SparseCsr {
            indptr, indices, ..
        } = &picked
        {
            assert_eq!(indptr, &vec![0, 2, 2, 3]);
            // Row 1's stored order was col 2 then col 0
            assert_eq!(indices, &vec![2, 0, 1]);
        } else {
            panic!("expected CSR block");
        }
    }

    #[test]
    fn test_coo_and_csr_densify_identically() {
        assert_eq!(
            coo_block().densified().unwrap(),
            csr_block().densified().unwrap()
        );
    }

    #[test]
    fn test_concat_offsets_rows() {
        let a = coo_block();
        let b = coo_block();
        let joined = TensorBlock::concat(&[a, b]).unwrap();
        assert_eq!(joined.num_rows(), 6);
        if let TensorBlock::SparseCoo { coords, .. } = &joined {
            assert_eq!(coords[0], vec![0, 1, 1, 3, 4, 4]);
        } else {
            panic!("expected COO block");
        }
    }

    #[test]
    fn test_concat_mixed_kinds_fails() {
        let err = TensorBlock::concat(&[coo_block(), csr_block()]).unwrap_err();
        assert!(matches!(err, LatticeError::Internal { .. }));
    }
}
