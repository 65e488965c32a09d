//! Byte-budgeted row buffers
//!
//! A [`Buffer`] is the transient accumulation of rows read from one key
//! range, tagged with the keys it contains so paired X/Y buffers can be
//! shuffled with an identical permutation. A [`Batch`] is the fixed-size
//! slice of a buffer handed to the consumer.

use crate::error::{LatticeError, Result};
use crate::tensor::TensorBlock;

/// Rows read from one key range, one block per field
#[derive(Debug, Clone)]
pub struct Buffer {
    /// Key value of each row, buffer order
    pub keys: Vec<i64>,
    /// Field blocks, all with `keys.len()` rows
    pub fields: Vec<(String, TensorBlock)>,
}

impl Buffer {
    pub fn num_rows(&self) -> usize {
        self.keys.len()
    }

    /// Estimated in-memory footprint in bytes
    pub fn byte_size(&self) -> usize {
        self.keys.len() * 8 + self.fields.iter().map(|(_, b)| b.byte_size()).sum::<usize>()
    }

    /// New buffer holding row `rows[i]` at position `i`
    pub fn select_rows(&self, rows: &[usize]) -> Buffer {
        Buffer {
            keys: rows.iter().map(|&r| self.keys[r]).collect(),
            fields: self
                .fields
                .iter()
                .map(|(name, block)| (name.clone(), block.select_rows(rows)))
                .collect(),
        }
    }

    /// Concatenate buffers row-wise; field layout must match
    pub fn concat(buffers: &[Buffer]) -> Result<Buffer> {
        let first = buffers
            .first()
            .ok_or_else(|| LatticeError::internal("concat of zero buffers"))?;
        if buffers.len() == 1 {
            return Ok(first.clone());
        }
        let mut keys = Vec::new();
        for buf in buffers {
            if buf.fields.len() != first.fields.len() {
                return Err(LatticeError::internal("buffer field count mismatch"));
            }
            keys.extend_from_slice(&buf.keys);
        }
        let mut fields = Vec::with_capacity(first.fields.len());
        for (i, (name, _)) in first.fields.iter().enumerate() {
            let blocks: Vec<TensorBlock> =
                buffers.iter().map(|b| b.fields[i].1.clone()).collect();
            fields.push((name.clone(), TensorBlock::concat(&blocks)?));
        }
        Ok(Buffer { keys, fields })
    }

    /// Consume into a batch of the same rows
    pub fn into_batch(self) -> Batch {
        Batch {
            keys: self.keys,
            fields: self.fields,
        }
    }
}

/// An ordered group of up to `batch_size` rows, one tensor per field
#[derive(Debug, Clone)]
pub struct Batch {
    /// Key value of each row, batch order
    pub keys: Vec<i64>,
    /// Field tensors, all with `keys.len()` rows
    pub fields: Vec<(String, TensorBlock)>,
}

impl Batch {
    pub fn num_rows(&self) -> usize {
        self.keys.len()
    }

    /// Tensor for a named field, if present
    pub fn field(&self, name: &str) -> Option<&TensorBlock> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, b)| b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::ArrayD;

    fn buffer(rows: usize, base: i64) -> Buffer {
        let data = ArrayD::from_shape_fn(vec![rows, 2], |idx| {
            (base as usize * 10 + idx[0] * 2 + idx[1]) as f32
        });
        Buffer {
            keys: (base..base + rows as i64).collect(),
            fields: vec![("a".into(), TensorBlock::Dense(data))],
        }
    }

    #[test]
    fn test_select_rows_reorders_keys_and_data() {
        let buf = buffer(4, 0);
        let picked = buf.select_rows(&[3, 1]);
        assert_eq!(picked.keys, vec![3, 1]);
        let dense = picked.fields[0].1.densified().unwrap();
        assert_eq!(dense[[0, 0]], 6.0);
        assert_eq!(dense[[1, 0]], 2.0);
    }

    #[test]
    fn test_concat_appends_rows() {
        let joined = Buffer::concat(&[buffer(2, 0), buffer(3, 2)]).unwrap();
        assert_eq!(joined.num_rows(), 5);
        assert_eq!(joined.keys, vec![0, 1, 2, 3, 4]);
        assert_eq!(joined.fields[0].1.num_rows(), 5);
    }
}
