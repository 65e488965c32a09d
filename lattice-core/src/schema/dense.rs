//! Dense tensor schema
//!
//! Reads contiguous row blocks across all dimensions, moves the key axis to
//! position 0, and applies secondary slices as fixed sub-selections on
//! non-key axes.

use std::sync::Arc;

use ndarray::{ArrayD, Axis};
use tracing::debug;

use super::params::FieldSpec;
use super::TensorSchema;
use crate::array::{ArrayHandle, KeyRange};
use crate::error::{LatticeError, Result};
use crate::pipeline::buffer::Buffer;
use crate::tensor::{TensorBlock, TensorKind};

pub struct DenseSchema {
    array: Arc<dyn ArrayHandle>,
    spec: FieldSpec,
}

impl DenseSchema {
    pub fn new(array: Arc<dyn ArrayHandle>, spec: FieldSpec) -> Self {
        Self { array, spec }
    }

    fn to_logical(&self, block: ArrayD<f32>) -> ArrayD<f32> {
        let ndim = self.spec.all_dims.len();
        if self.spec.key_dim_index == 0 || ndim < 2 {
            return block;
        }
        let perm: Vec<usize> = (0..ndim).map(|l| self.spec.storage_axis(l)).collect();
        block.permuted_axes(perm).as_standard_layout().to_owned()
    }
}

impl TensorSchema for DenseSchema {
    fn kind(&self) -> TensorKind {
        TensorKind::Dense
    }

    fn fields(&self) -> &[String] {
        &self.spec.fields
    }

    fn key_bounds(&self) -> KeyRange {
        self.spec.key_bounds()
    }

    fn estimated_row_bytes(&self) -> usize {
        let cells: usize = (1..self.spec.all_dims.len())
            .map(|axis| self.spec.cropped_extent(axis))
            .product();
        cells.max(1) * self.spec.fields.len() * 4
    }

    fn read(&self, range: KeyRange) -> Result<Buffer> {
        let bounds = self.key_bounds();
        if range.is_empty() || range.start < bounds.start || range.end > bounds.end {
            return Err(LatticeError::OutOfDomain {
                start: range.start,
                end: range.end,
            });
        }

        // Per-dimension ranges in storage order: the key dimension gets the
        // requested range, every other dimension its full non-empty extent.
        let ndim = self.spec.all_dims.len();
        let mut ranges = vec![(0i64, 0i64); ndim];
        for storage in 0..ndim {
            let logical = self.spec.storage_axis(storage);
            ranges[storage] = if storage == self.spec.key_dim_index {
                (range.start, range.end)
            } else {
                self.spec.ned[logical]
            };
        }

        let block = self.array.read_dense(&ranges, &self.spec.fields)?;
        debug!(
            uri = self.array.uri(),
            start = range.start,
            end = range.end,
            "dense read"
        );

        let mut fields = Vec::with_capacity(block.fields.len());
        for (name, tensor) in block.fields {
            let mut tensor = self.to_logical(tensor);
            for (&axis, positions) in &self.spec.secondary {
                tensor = tensor.select(Axis(axis), positions);
            }
            fields.push((name, TensorBlock::Dense(tensor)));
        }

        Ok(Buffer {
            keys: (range.start..=range.end).collect(),
            fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::MemArray;
    use crate::schema::{ArrayParams, SecondarySlice};
    use ndarray::ArrayD;

    fn array_3d() -> Arc<dyn ArrayHandle> {
        let data = ArrayD::from_shape_fn(vec![4, 3, 2], |idx| {
            (idx[0] * 6 + idx[1] * 2 + idx[2]) as f32
        });
        Arc::new(
            MemArray::dense(&["time", "height", "width"])
                .dense_attr("pixels", data)
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_read_block_shape_and_keys() {
        let schema = ArrayParams::new(array_3d())
            .to_schema(&Default::default())
            .unwrap();
        let buffer = schema.read(KeyRange::new(1, 2)).unwrap();
        assert_eq!(buffer.keys, vec![1, 2]);
        let dense = buffer.fields[0].1.densified().unwrap();
        assert_eq!(dense.shape(), &[2, 3, 2]);
        assert_eq!(dense[[0, 0, 0]], 6.0);
    }

    #[test]
    fn test_non_zero_key_dim_transposes_rows() {
        let schema = ArrayParams::new(array_3d())
            .with_key_dim("height")
            .to_schema(&Default::default())
            .unwrap();
        assert_eq!(schema.row_count(), 3);
        let buffer = schema.read(KeyRange::new(0, 2)).unwrap();
        let dense = buffer.fields[0].1.densified().unwrap();
        assert_eq!(dense.shape(), &[3, 4, 2]);
        // logical [h, t, w] == storage [t, h, w]
        assert_eq!(dense[[1, 2, 0]], 14.0);
    }

    #[test]
    fn test_secondary_slice_crops_axis() {
        let schema = ArrayParams::new(array_3d())
            .with_secondary_slice("height", SecondarySlice::Indices(vec![2, 0]))
            .to_schema(&Default::default())
            .unwrap();
        let buffer = schema.read(KeyRange::new(0, 3)).unwrap();
        let dense = buffer.fields[0].1.densified().unwrap();
        assert_eq!(dense.shape(), &[4, 2, 2]);
        // Position 0 of the cropped axis is original height index 2
        assert_eq!(dense[[0, 0, 0]], 4.0);
    }

    #[test]
    fn test_read_outside_domain_fails() {
        let schema = ArrayParams::new(array_3d())
            .to_schema(&Default::default())
            .unwrap();
        let err = schema.read(KeyRange::new(2, 9)).unwrap_err();
        assert!(matches!(err, LatticeError::OutOfDomain { .. }));
    }
}
