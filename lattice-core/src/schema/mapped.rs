//! Mapped schema decorator
//!
//! Wraps any schema and applies a user transform to every produced tensor,
//! passing row count and kind identity through unchanged.

use super::{TensorSchema, TensorTransform};
use crate::array::KeyRange;
use crate::error::Result;
use crate::pipeline::buffer::Buffer;
use crate::tensor::TensorKind;

pub struct MappedSchema {
    inner: Box<dyn TensorSchema>,
    transform: TensorTransform,
}

impl MappedSchema {
    pub fn new(inner: Box<dyn TensorSchema>, transform: TensorTransform) -> Self {
        Self { inner, transform }
    }
}

impl TensorSchema for MappedSchema {
    fn kind(&self) -> TensorKind {
        self.inner.kind()
    }

    fn fields(&self) -> &[String] {
        self.inner.fields()
    }

    fn key_bounds(&self) -> KeyRange {
        self.inner.key_bounds()
    }

    fn estimated_row_bytes(&self) -> usize {
        self.inner.estimated_row_bytes()
    }

    fn read(&self, range: KeyRange) -> Result<Buffer> {
        let buffer = self.inner.read(range)?;
        let fields = buffer
            .fields
            .into_iter()
            .map(|(name, block)| (name, (self.transform)(block)))
            .collect();
        Ok(Buffer {
            keys: buffer.keys,
            fields,
        })
    }
}
