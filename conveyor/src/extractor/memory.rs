use async_trait::async_trait;
use serde::Deserialize;

use crate::conveyor_error;
use crate::error::{ConveyorError, ConveyorResult, ErrorKind};
use crate::extractor::base::{ExtractOutput, Extractor};
use crate::types::{Cell, Dataset, DatasetMetadata, FieldSchema, FieldType, Row, Schema};

/// Declarative shape of the `memory` extractor options.
#[derive(Debug, Deserialize)]
struct MemoryOptions {
    datasets: Vec<MemoryDatasetSpec>,
}

#[derive(Debug, Deserialize)]
struct MemoryDatasetSpec {
    name: String,
    fields: Vec<MemoryFieldSpec>,
    #[serde(default)]
    rows: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct MemoryFieldSpec {
    name: String,
    #[serde(rename = "type")]
    ty: FieldType,
}

/// Extractor producing datasets declared inline in the job configuration.
///
/// Used by dry runs, examples, and tests; also the reference implementation
/// of the multi-dataset extraction contract.
#[derive(Debug, Clone)]
pub struct MemoryExtractor {
    datasets: Vec<Dataset>,
}

impl MemoryExtractor {
    pub fn new(datasets: Vec<Dataset>) -> Self {
        Self { datasets }
    }

    /// Builds the extractor from untyped connector options.
    pub fn from_options(options: &serde_json::Value) -> ConveyorResult<Self> {
        let options: MemoryOptions = serde_json::from_value(options.clone()).map_err(|err| {
            conveyor_error!(
                ErrorKind::ConfigError,
                "Invalid memory extractor options",
                err
            )
        })?;

        if options.datasets.is_empty() {
            return Err(conveyor_error!(
                ErrorKind::ConfigError,
                "Memory extractor declares no datasets"
            ));
        }

        let mut datasets = Vec::with_capacity(options.datasets.len());
        for spec in options.datasets {
            let schema = Schema::new(
                spec.fields
                    .iter()
                    .map(|field| FieldSchema::new(field.name.clone(), field.ty))
                    .collect(),
            );

            let mut rows = Vec::with_capacity(spec.rows.len());
            for (index, values) in spec.rows.iter().enumerate() {
                if values.len() != spec.fields.len() {
                    return Err(conveyor_error!(
                        ErrorKind::ConfigError,
                        "Declared row does not match the declared fields",
                        format!(
                            "dataset '{}' row {index} has {} values for {} fields",
                            spec.name,
                            values.len(),
                            spec.fields.len()
                        )
                    ));
                }

                let mut cells = Vec::with_capacity(values.len());
                for (value, field) in values.iter().zip(spec.fields.iter()) {
                    cells.push(Cell::from_json(value, field.ty)?);
                }
                rows.push(Row::new(cells));
            }

            let record_count = rows.len() as u64;
            datasets.push(Dataset::new(
                spec.name.clone(),
                schema,
                rows,
                DatasetMetadata::new(format!("memory:{}", spec.name), record_count),
            )?);
        }

        Ok(Self::new(datasets))
    }
}

#[async_trait]
impl Extractor for MemoryExtractor {
    async fn validate_source(&self) -> ConveyorResult<()> {
        Ok(())
    }

    async fn extract(&self) -> ConveyorResult<ExtractOutput> {
        let mut datasets = self.datasets.clone();

        if datasets.len() == 1 {
            Ok(ExtractOutput::Single(datasets.remove(0)))
        } else {
            Ok(ExtractOutput::Many(datasets))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn builds_datasets_from_options() {
        let extractor = MemoryExtractor::from_options(&json!({
            "datasets": [{
                "name": "orders",
                "fields": [
                    {"name": "id", "type": "int"},
                    {"name": "category", "type": "string"}
                ],
                "rows": [[1, "a"], [2, "b"], [3, null]]
            }]
        }))
        .unwrap();

        let output = extractor.extract().await.unwrap();
        assert_eq!(output.record_count(), 3);

        let datasets = output.into_datasets();
        assert_eq!(datasets[0].name, "orders");
        assert_eq!(datasets[0].rows[2].values[1], Cell::Null);
    }

    #[tokio::test]
    async fn rejects_mistyped_rows() {
        let err = MemoryExtractor::from_options(&json!({
            "datasets": [{
                "name": "orders",
                "fields": [{"name": "id", "type": "int"}],
                "rows": [["not an int"]]
            }]
        }))
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ConversionError);
    }

    #[tokio::test]
    async fn rejects_empty_dataset_list() {
        let err = MemoryExtractor::from_options(&json!({"datasets": []})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
    }

    #[tokio::test]
    async fn multiple_datasets_extract_as_many() {
        let extractor = MemoryExtractor::from_options(&json!({
            "datasets": [
                {"name": "orders", "fields": [{"name": "id", "type": "int"}], "rows": [[1]]},
                {"name": "users", "fields": [{"name": "id", "type": "int"}], "rows": [[1], [2]]}
            ]
        }))
        .unwrap();

        let output = extractor.extract().await.unwrap();
        assert!(matches!(output, ExtractOutput::Many(_)));
        assert_eq!(output.record_count(), 3);
    }
}
