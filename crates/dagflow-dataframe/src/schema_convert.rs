//! Conversions between the graph model's backend-agnostic `Schema` and
//! Arrow's `SchemaRef`.

use datafusion::arrow::datatypes::{DataType, Field, Schema as ArrowSchema, SchemaRef, TimeUnit};
use dagflow_core::{DType, Schema, SchemaField};
use std::sync::Arc;

pub fn dtype_to_arrow(dtype: DType) -> DataType {
    match dtype {
        DType::Int64 => DataType::Int64,
        DType::Float64 => DataType::Float64,
        DType::Utf8 => DataType::Utf8,
        DType::Boolean => DataType::Boolean,
        DType::Date32 => DataType::Date32,
        DType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
        DType::Binary => DataType::Binary,
    }
}

pub fn arrow_to_dtype(dtype: &DataType) -> DType {
    match dtype {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => DType::Int64,
        DataType::Float16 | DataType::Float32 | DataType::Float64 => DType::Float64,
        DataType::Boolean => DType::Boolean,
        DataType::Date32 | DataType::Date64 => DType::Date32,
        DataType::Timestamp(_, _) => DType::Timestamp,
        DataType::Binary | DataType::LargeBinary => DType::Binary,
        _ => DType::Utf8,
    }
}

pub fn schema_to_arrow(schema: &Schema) -> SchemaRef {
    Arc::new(ArrowSchema::new(
        schema
            .iter()
            .map(|f| Field::new(&f.name, dtype_to_arrow(f.dtype), true))
            .collect::<Vec<_>>(),
    ))
}

pub fn arrow_to_schema(schema: &ArrowSchema) -> Schema {
    schema
        .fields()
        .iter()
        .map(|f| SchemaField::new(f.name(), arrow_to_dtype(f.data_type())))
        .collect()
}
