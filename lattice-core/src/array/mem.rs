//! In-memory array store
//!
//! Backs the test suite and serves as the reference `ArrayHandle`
//! implementation. Dense arrays hold one row-major tensor per attribute;
//! sparse arrays hold cell-aligned coordinate/value vectors in insertion
//! order, which is the "stored order" the CSR schema must preserve.

use ndarray::{ArrayD, Slice};

use super::handle::{ArrayHandle, DenseBlock, KeyRange, SparseBlock};
use super::meta::{AttributeMeta, Datatype, DimensionMeta};
use crate::error::{LatticeError, Result};

/// In-memory dense or sparse array
pub struct MemArray {
    uri: String,
    sparse: bool,
    dimensions: Vec<DimensionMeta>,
    attributes: Vec<AttributeMeta>,
    /// Lower coordinate bound per dimension (dense arrays)
    origin: Vec<i64>,
    /// Dense payload, one tensor per attribute, storage dimension order
    dense: Vec<(String, ArrayD<f32>)>,
    /// Sparse coordinates, one vector per dimension, cell-aligned
    coords: Vec<Vec<f64>>,
    /// Sparse payload, one value vector per attribute, cell-aligned
    values: Vec<(String, Vec<f32>)>,
    nonempty: Vec<(i64, i64)>,
}

impl MemArray {
    /// Start building a dense array with the given dimension names
    pub fn dense(dims: &[&str]) -> MemArrayBuilder {
        MemArrayBuilder::new(dims, false)
    }

    /// Start building a sparse array with the given dimension names
    pub fn sparse(dims: &[&str]) -> MemArrayBuilder {
        MemArrayBuilder::new(dims, true)
    }

    fn dim_index(&self, name: &str) -> Option<usize> {
        self.dimensions.iter().position(|d| d.name == name)
    }

    fn attr_values(&self, name: &str) -> Option<&Vec<f32>> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

impl ArrayHandle for MemArray {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn is_sparse(&self) -> bool {
        self.sparse
    }

    fn dimensions(&self) -> &[DimensionMeta] {
        &self.dimensions
    }

    fn attributes(&self) -> &[AttributeMeta] {
        &self.attributes
    }

    fn nonempty_domain(&self) -> Vec<(i64, i64)> {
        self.nonempty.clone()
    }

    fn estimated_cells_per_key(&self, key_dim_index: usize) -> f64 {
        if !self.sparse {
            let cells: u64 = self
                .nonempty
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != key_dim_index)
                .map(|(_, (lo, hi))| (hi - lo + 1) as u64)
                .product();
            return cells as f64;
        }
        let (lo, hi) = self.nonempty[key_dim_index];
        let keys = (hi - lo + 1).max(1) as f64;
        let cells = self.coords.first().map_or(0, |c| c.len()) as f64;
        cells / keys
    }

    fn read_dense(&self, ranges: &[(i64, i64)], fields: &[String]) -> Result<DenseBlock> {
        if self.sparse {
            return Err(LatticeError::internal(format!(
                "dense read on sparse array {}",
                self.uri
            )));
        }
        if ranges.len() != self.dimensions.len() {
            return Err(LatticeError::internal("range rank mismatch"));
        }
        for (i, &(lo, hi)) in ranges.iter().enumerate() {
            let (nlo, nhi) = self.nonempty[i];
            if lo < nlo || hi > nhi || hi < lo {
                return Err(LatticeError::OutOfDomain { start: lo, end: hi });
            }
        }

        let block_shape: Vec<usize> = ranges
            .iter()
            .map(|&(lo, hi)| (hi - lo + 1) as usize)
            .collect();

        let mut out = Vec::with_capacity(fields.len());
        for field in fields {
            if let Some((_, data)) = self.dense.iter().find(|(n, _)| n == field) {
                let sliced = data
                    .slice_each_axis(|ad| {
                        let axis = ad.axis.index();
                        let (lo, hi) = ranges[axis];
                        let start = lo - self.origin[axis];
                        let end = hi - self.origin[axis];
                        Slice::from(start as isize..=end as isize)
                    })
                    .to_owned();
                out.push((field.clone(), sliced));
            } else if let Some(axis) = self.dim_index(field) {
                // Coordinate grid along the named axis
                let lo = ranges[axis].0;
                let grid =
                    ArrayD::from_shape_fn(block_shape.clone(), |idx| (lo + idx[axis] as i64) as f32);
                out.push((field.clone(), grid));
            } else {
                return Err(LatticeError::InvalidField {
                    field: field.clone(),
                });
            }
        }
        Ok(DenseBlock { fields: out })
    }

    fn read_sparse(
        &self,
        range: KeyRange,
        key_dim_index: usize,
        fields: &[String],
    ) -> Result<SparseBlock> {
        if !self.sparse {
            return Err(LatticeError::internal(format!(
                "sparse read on dense array {}",
                self.uri
            )));
        }
        let key_coords = &self.coords[key_dim_index];
        let selected: Vec<usize> = key_coords
            .iter()
            .enumerate()
            .filter(|(_, &c)| range.contains(c as i64))
            .map(|(i, _)| i)
            .collect();

        let coords: Vec<Vec<f64>> = self
            .coords
            .iter()
            .map(|dim| selected.iter().map(|&i| dim[i]).collect())
            .collect();

        let mut out = Vec::with_capacity(fields.len());
        for field in fields {
            if let Some(vals) = self.attr_values(field) {
                let v: Vec<f32> = selected.iter().map(|&i| vals[i]).collect();
                out.push((field.clone(), v));
            } else if let Some(axis) = self.dim_index(field) {
                let v: Vec<f32> = selected.iter().map(|&i| self.coords[axis][i] as f32).collect();
                out.push((field.clone(), v));
            } else {
                return Err(LatticeError::InvalidField {
                    field: field.clone(),
                });
            }
        }
        Ok(SparseBlock { coords, fields: out })
    }
}

/// Builder for [`MemArray`]
pub struct MemArrayBuilder {
    uri: String,
    sparse: bool,
    dimensions: Vec<DimensionMeta>,
    attributes: Vec<AttributeMeta>,
    origin: Vec<i64>,
    dense: Vec<(String, ArrayD<f32>)>,
    coords: Vec<Vec<f64>>,
    values: Vec<(String, Vec<f32>)>,
}

impl MemArrayBuilder {
    fn new(dims: &[&str], sparse: bool) -> Self {
        Self {
            uri: "mem://array".into(),
            sparse,
            dimensions: dims
                .iter()
                .map(|d| DimensionMeta::new(*d, Datatype::Int64))
                .collect(),
            attributes: Vec::new(),
            origin: vec![0; dims.len()],
            dense: Vec::new(),
            coords: vec![Vec::new(); dims.len()],
            values: Vec::new(),
        }
    }

    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }

    /// Override a dimension's coordinate type (e.g. float for ragged data)
    pub fn dim_datatype(mut self, name: &str, datatype: Datatype) -> Self {
        if let Some(d) = self.dimensions.iter_mut().find(|d| d.name == name) {
            d.datatype = datatype;
        }
        self
    }

    /// Lower coordinate bound per dimension for dense arrays (default all 0)
    pub fn origin(mut self, origin: Vec<i64>) -> Self {
        self.origin = origin;
        self
    }

    /// Add a dense attribute with its full-domain payload
    pub fn dense_attr(mut self, name: &str, data: ArrayD<f32>) -> Self {
        self.attributes
            .push(AttributeMeta::new(name, Datatype::Float32));
        self.dense.push((name.into(), data));
        self
    }

    /// Declare a sparse attribute
    pub fn sparse_attr(mut self, name: &str) -> Self {
        self.attributes
            .push(AttributeMeta::new(name, Datatype::Float32));
        self.values.push((name.into(), Vec::new()));
        self
    }

    /// Append one non-empty cell; insertion order is the stored order
    pub fn cell(mut self, coords: &[f64], values: &[f32]) -> Self {
        for (dim, &c) in self.coords.iter_mut().zip(coords) {
            dim.push(c);
        }
        for ((_, vals), &v) in self.values.iter_mut().zip(values) {
            vals.push(v);
        }
        self
    }

    pub fn build(self) -> Result<MemArray> {
        let nonempty = if self.sparse {
            if self.coords.first().map_or(true, |c| c.is_empty()) {
                return Err(LatticeError::internal("sparse array has no cells"));
            }
            self.coords
                .iter()
                .map(|dim| {
                    let lo = dim.iter().cloned().fold(f64::INFINITY, f64::min);
                    let hi = dim.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                    (lo.floor() as i64, hi.ceil() as i64)
                })
                .collect()
        } else {
            let shape = self
                .dense
                .first()
                .map(|(_, a)| a.shape().to_vec())
                .ok_or_else(|| LatticeError::internal("dense array has no attributes"))?;
            for (name, a) in &self.dense {
                if a.shape() != shape.as_slice() {
                    return Err(LatticeError::internal(format!(
                        "attribute {} shape mismatch",
                        name
                    )));
                }
            }
            self.origin
                .iter()
                .zip(&shape)
                .map(|(&lo, &extent)| (lo, lo + extent as i64 - 1))
                .collect()
        };

        Ok(MemArray {
            uri: self.uri,
            sparse: self.sparse,
            dimensions: self.dimensions,
            attributes: self.attributes,
            origin: self.origin,
            dense: self.dense,
            coords: self.coords,
            values: self.values,
            nonempty,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::ArrayD;

    fn dense_2d() -> MemArray {
        let data = ArrayD::from_shape_fn(vec![4, 3], |idx| (idx[0] * 3 + idx[1]) as f32);
        MemArray::dense(&["row", "col"])
            .dense_attr("a", data)
            .build()
            .unwrap()
    }

    #[test]
    fn test_dense_read_block() {
        let arr = dense_2d();
        assert_eq!(arr.nonempty_domain(), vec![(0, 3), (0, 2)]);

        let block = arr
            .read_dense(&[(1, 2), (0, 2)], &["a".to_string()])
            .unwrap();
        let (_, tensor) = &block.fields[0];
        assert_eq!(tensor.shape(), &[2, 3]);
        assert_eq!(tensor[[0, 0]], 3.0);
        assert_eq!(tensor[[1, 2]], 8.0);
    }

    #[test]
    fn test_dense_dim_field_is_coordinate_grid() {
        let arr = dense_2d();
        let block = arr
            .read_dense(&[(2, 3), (0, 2)], &["row".to_string()])
            .unwrap();
        let (_, grid) = &block.fields[0];
        assert_eq!(grid[[0, 1]], 2.0);
        assert_eq!(grid[[1, 0]], 3.0);
    }

    #[test]
    fn test_dense_out_of_domain() {
        let arr = dense_2d();
        let err = arr
            .read_dense(&[(0, 9), (0, 2)], &["a".to_string()])
            .unwrap_err();
        assert!(matches!(err, LatticeError::OutOfDomain { .. }));
    }

    #[test]
    fn test_sparse_read_preserves_stored_order() {
        let arr = MemArray::sparse(&["row", "col"])
            .sparse_attr("a")
            .cell(&[0.0, 2.0], &[1.0])
            .cell(&[0.0, 1.0], &[2.0])
            .cell(&[1.0, 0.0], &[3.0])
            .build()
            .unwrap();

        let block = arr
            .read_sparse(KeyRange::new(0, 0), 0, &["a".to_string()])
            .unwrap();
        assert_eq!(block.cell_count(), 2);
        // Stored order, not coordinate order
        assert_eq!(block.coords[1], vec![2.0, 1.0]);
        assert_eq!(block.fields[0].1, vec![1.0, 2.0]);
    }
}
