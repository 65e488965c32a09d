//! Field/shape resolution
//!
//! [`ArrayParams`] validates the caller's field selection and key-dimension
//! choice against array metadata and resolves them into an immutable
//! [`FieldSpec`], then builds the matching schema variant. All validation
//! here is fail-fast: nothing is read before resolution succeeds.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use super::{
    CooSchema, CsrSchema, DenseSchema, KindPolicy, MappedSchema, RaggedSchema, TensorSchema,
    TransformMap,
};
use crate::array::{ArrayHandle, KeyRange};
use crate::error::{LatticeError, Result};
use crate::tensor::TensorKind;

/// Key-dimension selector
#[derive(Debug, Clone)]
pub enum KeyDim {
    Index(usize),
    Name(String),
}

impl From<usize> for KeyDim {
    fn from(index: usize) -> Self {
        KeyDim::Index(index)
    }
}

impl From<&str> for KeyDim {
    fn from(name: &str) -> Self {
        KeyDim::Name(name.to_string())
    }
}

/// Secondary sub-selection on one non-key dimension
///
/// Positions are 0-based within the dimension's non-empty domain.
#[derive(Debug, Clone)]
pub enum SecondarySlice {
    /// Single fixed position
    Index(usize),
    /// Half-open position range
    Range(usize, usize),
    /// Discrete position list, applied in the given order
    Indices(Vec<usize>),
}

impl SecondarySlice {
    fn resolve(&self, extent: usize, dim: &str) -> Result<Vec<usize>> {
        let positions = match self {
            SecondarySlice::Index(i) => vec![*i],
            SecondarySlice::Range(lo, hi) => (*lo..*hi).collect(),
            SecondarySlice::Indices(list) => list.clone(),
        };
        if positions.is_empty() || positions.iter().any(|&p| p >= extent) {
            return Err(LatticeError::InvalidConfig {
                reason: format!(
                    "secondary slice on dimension '{}' outside extent {}",
                    dim, extent
                ),
            });
        }
        Ok(positions)
    }
}

/// Resolved read plan for one array
///
/// Immutable once constructed; built once per array per training run.
/// The key dimension is always logical position 0.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// Requested field names, output order
    pub fields: Vec<String>,
    /// Storage-order index of the key dimension
    pub key_dim_index: usize,
    /// Dimension names in logical order, key first
    pub all_dims: Vec<String>,
    /// Non-empty-domain bounds in logical order, key first
    pub ned: Vec<(i64, i64)>,
    /// Resolved secondary positions per logical axis (never axis 0)
    pub secondary: BTreeMap<usize, Vec<usize>>,
}

impl FieldSpec {
    /// Key-dimension bounds
    pub fn key_bounds(&self) -> KeyRange {
        KeyRange::new(self.ned[0].0, self.ned[0].1)
    }

    /// Full extent of a logical axis
    pub fn extent(&self, axis: usize) -> usize {
        let (lo, hi) = self.ned[axis];
        (hi - lo + 1) as usize
    }

    /// Extent of a logical axis after secondary cropping
    pub fn cropped_extent(&self, axis: usize) -> usize {
        self.secondary
            .get(&axis)
            .map(|positions| positions.len())
            .unwrap_or_else(|| self.extent(axis))
    }

    /// Map a logical axis to its storage-order axis
    pub fn storage_axis(&self, logical: usize) -> usize {
        if logical == 0 {
            self.key_dim_index
        } else if logical == self.key_dim_index {
            0
        } else {
            logical
        }
    }
}

/// Parameters for accessing one array
///
/// Built with `with_*` methods, consumed by [`ArrayParams::to_schema`].
#[derive(Clone)]
pub struct ArrayParams {
    array: Arc<dyn ArrayHandle>,
    key_dim: KeyDim,
    fields: Vec<String>,
    secondary_slices: Vec<(String, SecondarySlice)>,
    tensor_kind: Option<TensorKind>,
}

impl ArrayParams {
    pub fn new(array: Arc<dyn ArrayHandle>) -> Self {
        Self {
            array,
            key_dim: KeyDim::Index(0),
            fields: Vec::new(),
            secondary_slices: Vec::new(),
            tensor_kind: None,
        }
    }

    /// Select the key dimension by name or positional index (default: 0)
    pub fn with_key_dim(mut self, key_dim: impl Into<KeyDim>) -> Self {
        self.key_dim = key_dim.into();
        self
    }

    /// Restrict retrieved fields (default: all attributes)
    pub fn with_fields(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Add a fixed sub-selection on a non-key dimension (dense only)
    pub fn with_secondary_slice(mut self, dim: &str, slice: SecondarySlice) -> Self {
        self.secondary_slices.push((dim.to_string(), slice));
        self
    }

    /// Pin the tensor representation instead of inferring it
    pub fn with_tensor_kind(mut self, kind: TensorKind) -> Self {
        self.tensor_kind = Some(kind);
        self
    }

    pub fn array(&self) -> &Arc<dyn ArrayHandle> {
        &self.array
    }

    /// Resolve field selection and dimension ordering into a [`FieldSpec`]
    pub fn resolve(&self) -> Result<FieldSpec> {
        let all_attrs: Vec<&str> = self.array.attributes().iter().map(|a| a.name.as_str()).collect();
        let all_dim_names: Vec<String> =
            self.array.dimensions().iter().map(|d| d.name.clone()).collect();

        let fields: Vec<String> = if self.fields.is_empty() {
            all_attrs.iter().map(|a| a.to_string()).collect()
        } else {
            for f in &self.fields {
                let known = all_attrs.iter().any(|a| *a == f.as_str())
                    || all_dim_names.iter().any(|d| d == f);
                if !known {
                    return Err(LatticeError::InvalidField { field: f.clone() });
                }
            }
            self.fields.clone()
        };

        let key_dim_index = match &self.key_dim {
            KeyDim::Index(i) => {
                if *i >= all_dim_names.len() {
                    return Err(LatticeError::InvalidConfig {
                        reason: format!(
                            "key_dim index {} out of range for {}-dimensional array",
                            i,
                            all_dim_names.len()
                        ),
                    });
                }
                *i
            }
            KeyDim::Name(name) => all_dim_names
                .iter()
                .position(|d| d == name)
                .ok_or_else(|| LatticeError::InvalidField {
                    field: name.clone(),
                })?,
        };

        // Swap the key dimension to logical position 0; bounds move with it
        let mut all_dims = all_dim_names.clone();
        let mut ned = self.array.nonempty_domain();
        if key_dim_index > 0 {
            all_dims.swap(0, key_dim_index);
            ned.swap(0, key_dim_index);
        }

        let mut secondary = BTreeMap::new();
        for (dim, slice) in &self.secondary_slices {
            let logical = all_dims
                .iter()
                .position(|d| d == dim)
                .ok_or_else(|| LatticeError::InvalidField { field: dim.clone() })?;
            if logical == 0 {
                // Never secondarily slice the key dimension
                continue;
            }
            let extent = (ned[logical].1 - ned[logical].0 + 1) as usize;
            secondary.insert(logical, slice.resolve(extent, dim)?);
        }

        Ok(FieldSpec {
            fields,
            key_dim_index,
            all_dims,
            ned,
            secondary,
        })
    }

    /// Infer the tensor kind from array metadata (when not pinned)
    fn infer_kind(&self, spec: &FieldSpec, transforms: &TransformMap) -> TensorKind {
        if let Some(kind) = self.tensor_kind {
            return kind;
        }
        if !self.array.is_sparse() {
            return TensorKind::Dense;
        }
        let dims = self.array.dimensions();
        let non_key_integer = spec
            .all_dims
            .iter()
            .skip(1)
            .all(|name| {
                dims.iter()
                    .find(|d| &d.name == name)
                    .map(|d| d.datatype.is_integer())
                    .unwrap_or(false)
            });
        if !non_key_integer {
            // Coordinates cannot serve as dense positional indices
            return TensorKind::Ragged;
        }
        let csr_denied = matches!(
            transforms.get(&TensorKind::SparseCsr),
            Some(KindPolicy::Deny)
        );
        if dims.len() != 2 || csr_denied {
            TensorKind::SparseCoo
        } else {
            TensorKind::SparseCsr
        }
    }

    /// Resolve, infer, validate, and build the schema for this array
    pub fn to_schema(&self, transforms: &TransformMap) -> Result<Box<dyn TensorSchema>> {
        let spec = self.resolve()?;
        let kind = self.infer_kind(&spec, transforms);

        if kind != TensorKind::Dense && !spec.secondary.is_empty() {
            return Err(LatticeError::not_supported(
                "slicing on secondary indices is only implemented for dense arrays",
            ));
        }
        if kind == TensorKind::Dense && self.array.is_sparse() {
            return Err(LatticeError::not_supported(
                "dense tensors cannot be materialized from a sparse array",
            ));
        }
        if kind != TensorKind::Dense && !self.array.is_sparse() {
            return Err(LatticeError::not_supported(format!(
                "{:?} tensors require a sparse array",
                kind
            )));
        }
        if kind == TensorKind::SparseCsr && self.array.dimensions().len() != 2 {
            return Err(LatticeError::not_supported(
                "CSR tensors are only defined for 2-dimensional arrays",
            ));
        }

        let policy = transforms.get(&kind).cloned().unwrap_or(KindPolicy::Allow);
        if matches!(policy, KindPolicy::Deny) {
            return Err(LatticeError::not_supported(format!(
                "mapping to {:?} tensors is disabled",
                kind
            )));
        }

        debug!(
            uri = self.array.uri(),
            ?kind,
            fields = spec.fields.len(),
            "resolved tensor schema"
        );

        let array = self.array.clone();
        let schema: Box<dyn TensorSchema> = match kind {
            TensorKind::Dense => Box::new(DenseSchema::new(array, spec)),
            TensorKind::SparseCoo => Box::new(CooSchema::new(array, spec)),
            TensorKind::SparseCsr => Box::new(CsrSchema::new(array, spec)),
            TensorKind::Ragged => Box::new(RaggedSchema::new(array, spec)),
        };

        match policy {
            KindPolicy::Map(transform) => Ok(Box::new(MappedSchema::new(schema, transform))),
            _ => Ok(schema),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::MemArray;
    use ndarray::ArrayD;

    fn dense_3d() -> Arc<dyn ArrayHandle> {
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
    fn test_key_dim_moves_to_front() {
        let params = ArrayParams::new(dense_3d()).with_key_dim("height");
        let spec = params.resolve().unwrap();
        assert_eq!(spec.all_dims, vec!["height", "time", "width"]);
        assert_eq!(spec.ned[0], (0, 2));
        assert_eq!(spec.key_dim_index, 1);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let params = ArrayParams::new(dense_3d()).with_fields(&["pixels", "labels"]);
        let err = params.resolve().unwrap_err();
        match err {
            LatticeError::InvalidField { field } => assert_eq!(field, "labels"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_secondary_slice_on_key_dim_is_dropped() {
        let params = ArrayParams::new(dense_3d())
            .with_secondary_slice("time", SecondarySlice::Index(1))
            .with_secondary_slice("width", SecondarySlice::Index(0));
        let spec = params.resolve().unwrap();
        assert_eq!(spec.secondary.len(), 1);
        assert!(spec.secondary.contains_key(&2));
    }

    #[test]
    fn test_default_fields_are_all_attributes() {
        let spec = ArrayParams::new(dense_3d()).resolve().unwrap();
        assert_eq!(spec.fields, vec!["pixels"]);
    }
}
