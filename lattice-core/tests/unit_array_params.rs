//! Unit tests for field/shape resolution and tensor-kind inference
//!
//! Covers the kind inference matrix, transform-table gating, and
//! fail-fast validation errors.

use std::sync::Arc;

use ndarray::ArrayD;

use lattice_core::array::{ArrayHandle, Datatype, MemArray};
use lattice_core::schema::{ArrayParams, KindPolicy, SecondarySlice, TransformMap};
use lattice_core::tensor::{TensorBlock, TensorKind};
use lattice_core::{KeyRange, LatticeError};

fn dense_2d(rows: usize, cols: usize) -> Arc<dyn ArrayHandle> {
    let data = ArrayD::from_shape_fn(vec![rows, cols], |idx| (idx[0] * cols + idx[1]) as f32);
    Arc::new(
        MemArray::dense(&["row", "col"])
            .dense_attr("features", data)
            .build()
            .unwrap(),
    )
}

fn sparse_2d() -> Arc<dyn ArrayHandle> {
    Arc::new(
        MemArray::sparse(&["row", "col"])
            .sparse_attr("a")
            .cell(&[0.0, 1.0], &[1.0])
            .cell(&[1.0, 0.0], &[2.0])
            .cell(&[2.0, 2.0], &[3.0])
            .build()
            .unwrap(),
    )
}

fn sparse_3d() -> Arc<dyn ArrayHandle> {
    Arc::new(
        MemArray::sparse(&["row", "a1", "a2"])
            .sparse_attr("a")
            .cell(&[0.0, 0.0, 1.0], &[1.0])
            .cell(&[1.0, 1.0, 0.0], &[2.0])
            .build()
            .unwrap(),
    )
}

#[test]
fn test_dense_array_infers_dense() {
    let schema = ArrayParams::new(dense_2d(4, 3))
        .to_schema(&TransformMap::new())
        .unwrap();
    assert_eq!(schema.kind(), TensorKind::Dense);
    assert_eq!(schema.row_count(), 4);
}

#[test]
fn test_two_dimensional_sparse_infers_csr() {
    let schema = ArrayParams::new(sparse_2d())
        .to_schema(&TransformMap::new())
        .unwrap();
    assert_eq!(schema.kind(), TensorKind::SparseCsr);
}

#[test]
fn test_csr_denied_falls_back_to_coo() {
    let mut transforms = TransformMap::new();
    transforms.insert(TensorKind::SparseCsr, KindPolicy::Deny);
    let schema = ArrayParams::new(sparse_2d()).to_schema(&transforms).unwrap();
    assert_eq!(schema.kind(), TensorKind::SparseCoo);
}

#[test]
fn test_higher_rank_sparse_infers_coo() {
    let schema = ArrayParams::new(sparse_3d())
        .to_schema(&TransformMap::new())
        .unwrap();
    assert_eq!(schema.kind(), TensorKind::SparseCoo);
}

#[test]
fn test_non_integer_dimension_infers_ragged() {
    let arr: Arc<dyn ArrayHandle> = Arc::new(
        MemArray::sparse(&["row", "pos"])
            .dim_datatype("pos", Datatype::Float32)
            .sparse_attr("a")
            .cell(&[0.0, 0.5], &[1.0])
            .build()
            .unwrap(),
    );
    let schema = ArrayParams::new(arr).to_schema(&TransformMap::new()).unwrap();
    assert_eq!(schema.kind(), TensorKind::Ragged);
}

#[test]
fn test_explicit_kind_overrides_inference() {
    let schema = ArrayParams::new(sparse_2d())
        .with_tensor_kind(TensorKind::SparseCoo)
        .to_schema(&TransformMap::new())
        .unwrap();
    assert_eq!(schema.kind(), TensorKind::SparseCoo);
}

#[test]
fn test_unknown_field_fails_with_name() {
    let err = ArrayParams::new(dense_2d(4, 3))
        .with_fields(&["features", "missing"])
        .to_schema(&TransformMap::new())
        .unwrap_err();
    match err {
        LatticeError::InvalidField { field } => assert_eq!(field, "missing"),
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_secondary_slice_on_sparse_is_rejected() {
    let err = ArrayParams::new(sparse_2d())
        .with_secondary_slice("col", SecondarySlice::Index(0))
        .to_schema(&TransformMap::new())
        .unwrap_err();
    assert!(matches!(err, LatticeError::NotSupported { .. }));
    assert!(err.is_construction());
}

#[test]
fn test_denied_inferred_kind_fails_construction() {
    let mut transforms = TransformMap::new();
    transforms.insert(TensorKind::Dense, KindPolicy::Deny);
    let err = ArrayParams::new(dense_2d(4, 3))
        .to_schema(&transforms)
        .unwrap_err();
    assert!(matches!(err, LatticeError::NotSupported { .. }));
}

#[test]
fn test_key_dim_selected_by_name() {
    let schema = ArrayParams::new(dense_2d(4, 3))
        .with_key_dim("col")
        .to_schema(&TransformMap::new())
        .unwrap();
    assert_eq!(schema.row_count(), 3);
    assert_eq!(schema.key_bounds(), KeyRange::new(0, 2));
}

#[test]
fn test_key_dim_index_out_of_range() {
    let err = ArrayParams::new(dense_2d(4, 3))
        .with_key_dim(5usize)
        .to_schema(&TransformMap::new())
        .unwrap_err();
    assert!(matches!(err, LatticeError::InvalidConfig { .. }));
}

#[test]
fn test_dim_requested_as_field() {
    let schema = ArrayParams::new(dense_2d(3, 2))
        .with_fields(&["features", "row"])
        .to_schema(&TransformMap::new())
        .unwrap();
    let buffer = schema.read(KeyRange::new(1, 2)).unwrap();
    assert_eq!(buffer.fields.len(), 2);
    let grid = buffer.fields[1].1.densified().unwrap();
    assert_eq!(grid[[0, 0]], 1.0);
    assert_eq!(grid[[1, 1]], 2.0);
}

#[test]
fn test_iter_tensors_chunks_in_key_order() {
    let schema = ArrayParams::new(dense_2d(10, 2))
        .to_schema(&TransformMap::new())
        .unwrap();
    let chunks: Vec<Vec<i64>> = lattice_core::schema::TensorIter::new(&*schema, KeyRange::new(0, 9), 4)
        .map(|buffer| buffer.unwrap().keys)
        .collect();
    assert_eq!(chunks, vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7], vec![8, 9]]);
}

#[test]
fn test_mapped_schema_keeps_kind_and_row_count() {
    let mut transforms = TransformMap::new();
    transforms.insert(
        TensorKind::SparseCsr,
        KindPolicy::Map(Arc::new(|block| match block {
            TensorBlock::SparseCsr {
                indptr,
                indices,
                values,
                shape,
            } => TensorBlock::SparseCsr {
                indptr,
                indices,
                values: values.into_iter().map(|v| -v).collect(),
                shape,
            },
            other => other,
        })),
    );

    let schema = ArrayParams::new(sparse_2d()).to_schema(&transforms).unwrap();
    assert_eq!(schema.kind(), TensorKind::SparseCsr);
    assert_eq!(schema.row_count(), 3);

    let buffer = schema.read(KeyRange::new(0, 2)).unwrap();
    if let TensorBlock::SparseCsr { values, .. } = &buffer.fields[0].1 {
        assert_eq!(values, &vec![-1.0, -2.0, -3.0]);
    } else {
        panic!("expected CSR block");
    }
}
