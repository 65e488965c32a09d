//! Array schema metadata
//!
//! Dimension and attribute descriptors reported by the storage engine.

use serde::{Deserialize, Serialize};

/// Cell value type of a dimension or attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Datatype {
    Int32,
    Int64,
    UInt32,
    UInt64,
    Float32,
    Float64,
    StringAscii,
}

impl Datatype {
    /// Integer-typed coordinates can be interpreted as dense positional indices
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Datatype::Int32 | Datatype::Int64 | Datatype::UInt32 | Datatype::UInt64
        )
    }

    /// In-memory size of one cell value in bytes
    pub fn byte_size(&self) -> usize {
        match self {
            Datatype::Int32 | Datatype::UInt32 | Datatype::Float32 => 4,
            Datatype::Int64 | Datatype::UInt64 | Datatype::Float64 => 8,
            // Variable-length; a rough per-cell estimate for budgeting
            Datatype::StringAscii => 16,
        }
    }
}

/// Metadata for one array dimension
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionMeta {
    /// Dimension name
    pub name: String,
    /// Coordinate value type
    pub datatype: Datatype,
}

impl DimensionMeta {
    pub fn new(name: impl Into<String>, datatype: Datatype) -> Self {
        Self {
            name: name.into(),
            datatype,
        }
    }
}

/// Metadata for one array attribute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeMeta {
    /// Attribute name
    pub name: String,
    /// Cell value type
    pub datatype: Datatype,
}

impl AttributeMeta {
    pub fn new(name: impl Into<String>, datatype: Datatype) -> Self {
        Self {
            name: name.into(),
            datatype,
        }
    }
}
