use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::error::{Error, ErrorKind, Result};

/// Primitive column data types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Int,
    Long,
    Float,
    Double,
    String,
    Bytes,
}

impl DataType {
    /// Fixed slot width in bytes; `None` for variable-length types
    pub fn width(&self) -> Option<usize> {
        match self {
            DataType::Int | DataType::Float => Some(4),
            DataType::Long | DataType::Double => Some(8),
            DataType::String | DataType::Bytes => None,
        }
    }

    pub fn is_fixed_width(&self) -> bool {
        self.width().is_some()
    }
}

/// A single cell value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Int(_) => DataType::Int,
            Value::Long(_) => DataType::Long,
            Value::Float(_) => DataType::Float,
            Value::Double(_) => DataType::Double,
            Value::Str(_) => DataType::String,
            Value::Bytes(_) => DataType::Bytes,
        }
    }

    pub fn as_int(&self) -> Result<i32> {
        match self {
            Value::Int(v) => Ok(*v),
            _ => Err(type_mismatch(DataType::Int, self)),
        }
    }

    pub fn as_long(&self) -> Result<i64> {
        match self {
            Value::Long(v) => Ok(*v),
            _ => Err(type_mismatch(DataType::Long, self)),
        }
    }

    pub fn as_float(&self) -> Result<f32> {
        match self {
            Value::Float(v) => Ok(*v),
            _ => Err(type_mismatch(DataType::Float, self)),
        }
    }

    pub fn as_double(&self) -> Result<f64> {
        match self {
            Value::Double(v) => Ok(*v),
            _ => Err(type_mismatch(DataType::Double, self)),
        }
    }

    /// Widening read for the time column: any numeric value as millis/units
    pub fn as_time_long(&self) -> Result<i64> {
        match self {
            Value::Int(v) => Ok(*v as i64),
            Value::Long(v) => Ok(*v),
            Value::Float(v) => Ok(*v as i64),
            Value::Double(v) => Ok(*v as i64),
            _ => Err(Error::new(
                ErrorKind::TypeMismatch,
                format!("Time column value is not numeric: {:?}", self.data_type()),
            )),
        }
    }

    /// Raw bytes of a variable-length value
    pub fn var_bytes(&self) -> Result<&[u8]> {
        match self {
            Value::Str(s) => Ok(s.as_bytes()),
            Value::Bytes(b) => Ok(b),
            _ => Err(Error::new(
                ErrorKind::TypeMismatch,
                format!("Not a variable-length value: {:?}", self.data_type()),
            )),
        }
    }
}

fn type_mismatch(expected: DataType, actual: &Value) -> Error {
    Error::new(
        ErrorKind::TypeMismatch,
        format!(
            "Expected {:?} value, got {:?}",
            expected,
            actual.data_type()
        ),
    )
}

/// Cell content of one column in one row
#[derive(Debug, Clone, PartialEq)]
pub enum RowValue {
    Single(Value),
    Multi(Vec<Value>),
}

impl RowValue {
    pub fn as_single(&self) -> Result<&Value> {
        match self {
            RowValue::Single(v) => Ok(v),
            RowValue::Multi(_) => Err(Error::new(
                ErrorKind::TypeMismatch,
                "Expected single value, got multi-value".to_string(),
            )),
        }
    }

    pub fn as_multi(&self) -> Result<&[Value]> {
        match self {
            RowValue::Multi(v) => Ok(v),
            RowValue::Single(_) => Err(Error::new(
                ErrorKind::TypeMismatch,
                "Expected multi-value, got single value".to_string(),
            )),
        }
    }
}

/// One ingested row, keyed by column name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub fields: HashMap<String, RowValue>,
}

impl Row {
    pub fn new() -> Self {
        Row {
            fields: HashMap::new(),
        }
    }

    pub fn put(&mut self, column: &str, value: Value) {
        self.fields
            .insert(column.to_string(), RowValue::Single(value));
    }

    pub fn put_multi(&mut self, column: &str, values: Vec<Value>) {
        self.fields
            .insert(column.to_string(), RowValue::Multi(values));
    }

    pub fn get(&self, column: &str) -> Option<&RowValue> {
        self.fields.get(column)
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }
}

/// Per-row metadata handed over by the stream consumer
#[derive(Debug, Clone, Copy, Default)]
pub struct RowMetadata {
    pub ingestion_time_ms: Option<i64>,
}
