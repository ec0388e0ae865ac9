use serde::{Deserialize, Serialize};

/// A column data type. Mirrors the subset of Arrow types the Dataframe
/// Adapter needs to expose at the graph-model layer; the adapter
/// crate maps these to concrete Arrow `DataType`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DType {
    Int64,
    Float64,
    Utf8,
    Boolean,
    Date32,
    Timestamp,
    Binary,
}

impl DType {
    pub fn name(&self) -> &'static str {
        match self {
            DType::Int64 => "int64",
            DType::Float64 => "float64",
            DType::Utf8 => "string",
            DType::Boolean => "boolean",
            DType::Date32 => "date",
            DType::Timestamp => "timestamp",
            DType::Binary => "binary",
        }
    }
}

/// A single `(name, dtype)` schema field, as predicted or materialized for a
/// node's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    pub dtype: DType,
}

impl SchemaField {
    pub fn new(name: impl Into<String>, dtype: DType) -> Self {
        Self {
            name: name.into(),
            dtype,
        }
    }
}

/// An ordered list of fields. Column order is part of schema identity for
/// node types that build positional output (e.g. `select`).
pub type Schema = Vec<SchemaField>;

pub fn schema_contains(schema: &Schema, name: &str) -> bool {
    schema.iter().any(|f| f.name == name)
}

pub fn schema_names(schema: &Schema) -> Vec<&str> {
    schema.iter().map(|f| f.name.as_str()).collect()
}
