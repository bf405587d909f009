use chrono::{DateTime, Utc};

use crate::conveyor_error;
use crate::error::{ConveyorError, ConveyorResult, ErrorKind};
use crate::types::cell::{Cell, FieldType};

/// Name and declared type of one dataset field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    pub name: String,
    pub ty: FieldType,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Ordered set of field definitions shared by every row of a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    fields: Vec<FieldSchema>,
}

impl Schema {
    pub fn new(fields: Vec<FieldSchema>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the positional index of the named field.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.name.as_str())
    }
}

/// A complete record of a dataset, with one cell per schema field.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Cell values in schema field order.
    pub values: Vec<Cell>,
}

impl Row {
    pub fn new(values: Vec<Cell>) -> Self {
        Self { values }
    }
}

/// Provenance information attached to a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetMetadata {
    /// Identifier of the source that produced this dataset.
    pub source: String,
    /// When the extraction produced this dataset.
    pub extracted_at: DateTime<Utc>,
    /// Record count captured at extraction time.
    pub record_count: u64,
    /// Free-form provenance tags, e.g. `truncated` or `flagged:3`.
    pub tags: Vec<String>,
}

impl DatasetMetadata {
    pub fn new(source: impl Into<String>, record_count: u64) -> Self {
        Self {
            source: source.into(),
            extracted_at: Utc::now(),
            record_count,
            tags: Vec::new(),
        }
    }
}

/// A named, ordered collection of homogeneous records flowing between
/// pipeline stages.
///
/// Invariant: every row carries exactly one cell per schema field, and every
/// non-null cell matches its declared [`FieldType`]. Construction through
/// [`Dataset::new`] enforces this, so consumers never observe ragged rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub name: String,
    pub schema: Schema,
    pub rows: Vec<Row>,
    pub metadata: DatasetMetadata,
}

impl Dataset {
    /// Creates a dataset after checking every row against the schema.
    pub fn new(
        name: impl Into<String>,
        schema: Schema,
        rows: Vec<Row>,
        metadata: DatasetMetadata,
    ) -> ConveyorResult<Self> {
        let name = name.into();
        for (index, row) in rows.iter().enumerate() {
            check_row(&name, &schema, row, index)?;
        }

        Ok(Self {
            name,
            schema,
            rows,
            metadata,
        })
    }

    /// Creates an empty dataset with the given schema.
    pub fn empty(name: impl Into<String>, schema: Schema) -> Self {
        let name = name.into();
        let metadata = DatasetMetadata::new(name.clone(), 0);

        Self {
            name,
            schema,
            rows: Vec::new(),
            metadata,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns this dataset registered under a different name.
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Appends a provenance tag.
    pub fn tag(&mut self, tag: impl Into<String>) {
        self.metadata.tags.push(tag.into());
    }

    /// Appends a row after checking it against the schema.
    pub fn push_row(&mut self, row: Row) -> ConveyorResult<()> {
        check_row(&self.name, &self.schema, &row, self.rows.len())?;
        self.rows.push(row);

        Ok(())
    }
}

fn check_row(name: &str, schema: &Schema, row: &Row, index: usize) -> ConveyorResult<()> {
    if row.values.len() != schema.len() {
        return Err(conveyor_error!(
            ErrorKind::SchemaViolation,
            "Row does not match dataset schema",
            format!(
                "dataset '{name}' row {index} has {} cells, schema has {} fields",
                row.values.len(),
                schema.len()
            )
        ));
    }

    for (cell, field) in row.values.iter().zip(schema.fields()) {
        if !cell.matches(field.ty) {
            return Err(conveyor_error!(
                ErrorKind::SchemaViolation,
                "Cell type does not match declared field type",
                format!(
                    "dataset '{name}' row {index} field '{}': expected {}, got {cell}",
                    field.name, field.ty
                )
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders_schema() -> Schema {
        Schema::new(vec![
            FieldSchema::new("id", FieldType::Int),
            FieldSchema::new("category", FieldType::String),
        ])
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = Dataset::new(
            "orders",
            orders_schema(),
            vec![Row::new(vec![Cell::Int(1)])],
            DatasetMetadata::new("test", 1),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaViolation);
    }

    #[test]
    fn type_mismatches_are_rejected() {
        let err = Dataset::new(
            "orders",
            orders_schema(),
            vec![Row::new(vec![Cell::String("x".into()), Cell::Int(2)])],
            DatasetMetadata::new("test", 1),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaViolation);
    }

    #[test]
    fn nulls_satisfy_any_field() {
        let dataset = Dataset::new(
            "orders",
            orders_schema(),
            vec![Row::new(vec![Cell::Null, Cell::Null])],
            DatasetMetadata::new("test", 1),
        )
        .unwrap();
        assert_eq!(dataset.len(), 1);
    }

    #[test]
    fn field_index_follows_declaration_order() {
        let schema = orders_schema();
        assert_eq!(schema.field_index("id"), Some(0));
        assert_eq!(schema.field_index("category"), Some(1));
        assert_eq!(schema.field_index("missing"), None);
    }
}
