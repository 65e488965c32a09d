//! Ragged tensor schema
//!
//! Used when a non-key dimension's coordinates cannot serve as dense
//! positional indices. Each row materializes as a variable-length list of
//! the cell values that fall on that key, in stored order.

use std::sync::Arc;

use super::params::FieldSpec;
use super::sparse::sparse_row_bytes;
use super::TensorSchema;
use crate::array::{ArrayHandle, KeyRange};
use crate::error::{LatticeError, Result};
use crate::pipeline::buffer::Buffer;
use crate::tensor::{TensorBlock, TensorKind};

pub struct RaggedSchema {
    array: Arc<dyn ArrayHandle>,
    spec: FieldSpec,
}

impl RaggedSchema {
    pub fn new(array: Arc<dyn ArrayHandle>, spec: FieldSpec) -> Self {
        Self { array, spec }
    }
}

impl TensorSchema for RaggedSchema {
    fn kind(&self) -> TensorKind {
        TensorKind::Ragged
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
        let bounds = self.key_bounds();
        if range.is_empty() || range.start < bounds.start || range.end > bounds.end {
            return Err(LatticeError::OutOfDomain {
                start: range.start,
                end: range.end,
            });
        }

        let block = self
            .array
            .read_sparse(range, self.spec.key_dim_index, &self.spec.fields)?;
        let num_rows = range.len() as usize;
        let key_coords = &block.coords[self.spec.key_dim_index];

        let fields = block
            .fields
            .into_iter()
            .map(|(name, values)| {
                let mut rows: Vec<Vec<f32>> = vec![Vec::new(); num_rows];
                for (cell, &v) in values.iter().enumerate() {
                    let row = (key_coords[cell] as i64 - range.start) as usize;
                    rows[row].push(v);
                }
                (name, TensorBlock::Ragged(rows))
            })
            .collect();

        Ok(Buffer {
            keys: (range.start..=range.end).collect(),
            fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::{Datatype, MemArray};
    use crate::schema::ArrayParams;

    fn float_dim_array() -> Arc<dyn ArrayHandle> {
        Arc::new(
            MemArray::sparse(&["row", "pos"])
                .dim_datatype("pos", Datatype::Float64)
                .sparse_attr("a")
                .cell(&[0.0, 0.5], &[1.0])
                .cell(&[0.0, 0.25], &[2.0])
                .cell(&[2.0, 0.75], &[3.0])
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_ragged_inferred_for_non_integer_dims() {
        let schema = ArrayParams::new(float_dim_array())
            .to_schema(&Default::default())
            .unwrap();
        assert_eq!(schema.kind(), TensorKind::Ragged);
    }

    #[test]
    fn test_rows_are_variable_length_value_lists() {
        let schema = ArrayParams::new(float_dim_array())
            .to_schema(&Default::default())
            .unwrap();
        let buffer = schema.read(KeyRange::new(0, 2)).unwrap();
        if let TensorBlock::Ragged(rows) = &buffer.fields[0].1 {
            assert_eq!(rows.len(), 3);
            assert_eq!(rows[0], vec![1.0, 2.0]);
            assert!(rows[1].is_empty());
            assert_eq!(rows[2], vec![3.0]);
        } else {
            panic!("expected ragged block");
        }
    }
}
