use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conveyor_error;
use crate::error::{ConveyorError, ConveyorResult, ErrorKind};

/// Declared type of a dataset field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Bool,
    Int,
    Float,
    String,
    Timestamp,
    /// Arbitrary nested JSON, for sources with permissive typing.
    Json,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Bool => write!(f, "bool"),
            FieldType::Int => write!(f, "int"),
            FieldType::Float => write!(f, "float"),
            FieldType::String => write!(f, "string"),
            FieldType::Timestamp => write!(f, "timestamp"),
            FieldType::Json => write!(f, "json"),
        }
    }
}

/// A single field value within a [`crate::types::Row`].
///
/// Missing values are represented as [`Cell::Null`], never omitted, so every
/// row always carries exactly one cell per schema field.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
}

impl Cell {
    /// Returns `true` for a missing value.
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Returns the [`FieldType`] this cell carries, or `None` for null.
    pub fn field_type(&self) -> Option<FieldType> {
        match self {
            Cell::Null => None,
            Cell::Bool(_) => Some(FieldType::Bool),
            Cell::Int(_) => Some(FieldType::Int),
            Cell::Float(_) => Some(FieldType::Float),
            Cell::String(_) => Some(FieldType::String),
            Cell::Timestamp(_) => Some(FieldType::Timestamp),
            Cell::Json(_) => Some(FieldType::Json),
        }
    }

    /// Returns `true` when this cell may populate a field of type `ty`.
    pub fn matches(&self, ty: FieldType) -> bool {
        match self.field_type() {
            None => true,
            Some(own) => own == ty,
        }
    }

    /// Converts a JSON value into a cell of the declared type.
    ///
    /// Integer JSON numbers are accepted for float fields, and RFC 3339
    /// strings for timestamp fields; anything else must match exactly.
    pub fn from_json(value: &serde_json::Value, ty: FieldType) -> ConveyorResult<Cell> {
        if value.is_null() {
            return Ok(Cell::Null);
        }

        let cell = match ty {
            FieldType::Bool => value.as_bool().map(Cell::Bool),
            FieldType::Int => value.as_i64().map(Cell::Int),
            FieldType::Float => value.as_f64().map(Cell::Float),
            FieldType::String => value.as_str().map(|s| Cell::String(s.to_string())),
            FieldType::Timestamp => match value.as_str() {
                Some(raw) => {
                    let parsed = DateTime::parse_from_rfc3339(raw)?;
                    Some(Cell::Timestamp(parsed.with_timezone(&Utc)))
                }
                None => None,
            },
            FieldType::Json => Some(Cell::Json(value.clone())),
        };

        cell.ok_or_else(|| {
            conveyor_error!(
                ErrorKind::ConversionError,
                "JSON value does not match declared field type",
                format!("expected {ty}, got {value}")
            )
        })
    }

    /// Converts this cell back into a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Cell::Null => serde_json::Value::Null,
            Cell::Bool(value) => serde_json::Value::Bool(*value),
            Cell::Int(value) => serde_json::Value::Number((*value).into()),
            Cell::Float(value) => serde_json::Number::from_f64(*value)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Cell::String(value) => serde_json::Value::String(value.clone()),
            Cell::Timestamp(value) => serde_json::Value::String(value.to_rfc3339()),
            Cell::Json(value) => value.clone(),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => write!(f, "null"),
            Cell::Bool(value) => write!(f, "{value}"),
            Cell::Int(value) => write!(f, "{value}"),
            Cell::Float(value) => write!(f, "{value}"),
            Cell::String(value) => write!(f, "{value}"),
            Cell::Timestamp(value) => write!(f, "{}", value.to_rfc3339()),
            Cell::Json(value) => write!(f, "{value}"),
        }
    }
}
