use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use crate::conveyor_error;
use crate::error::{ConveyorError, ConveyorResult, ErrorKind};
use crate::transformer::base::{TransformInput, TransformOutput, Transformer};
use crate::types::{Cell, Dataset, DatasetMetadata, FieldSchema, FieldType, Row, Schema};

fn default_output_dataset() -> String {
    "summary".to_string()
}

#[derive(Debug, Deserialize)]
struct AggregateOptions {
    /// Field whose distinct values define the groups.
    group_by: String,
    /// Name the summary dataset is registered under.
    #[serde(default = "default_output_dataset")]
    output_dataset: String,
    /// Whether the input dataset stays registered alongside the summary.
    #[serde(default)]
    preserve_original: bool,
}

/// Forking transformer that counts records per distinct group value.
///
/// Produces a summary dataset with one row per group in first-seen order.
/// With `preserve_original` the input dataset is returned untouched next to
/// the summary; without it the summary alone survives and the input is
/// retired from the store.
#[derive(Debug)]
pub struct AggregateTransformer {
    group_by: String,
    output_dataset: String,
    preserve_original: bool,
}

impl AggregateTransformer {
    pub fn from_options(options: &serde_json::Value) -> ConveyorResult<Self> {
        let options: AggregateOptions = serde_json::from_value(options.clone()).map_err(|err| {
            conveyor_error!(
                ErrorKind::ConfigError,
                "Invalid aggregate transformer options",
                err
            )
        })?;

        Ok(Self {
            group_by: options.group_by,
            output_dataset: options.output_dataset,
            preserve_original: options.preserve_original,
        })
    }
}

#[async_trait]
impl Transformer for AggregateTransformer {
    async fn transform(&self, input: TransformInput) -> ConveyorResult<TransformOutput> {
        let dataset = input.into_single()?;

        let group_index = dataset.schema.field_index(&self.group_by).ok_or_else(|| {
            conveyor_error!(
                ErrorKind::TransformFailed,
                "Aggregation field not present in input dataset",
                format!("field '{}' in dataset '{}'", self.group_by, dataset.name)
            )
        })?;
        let group_type = dataset.schema.fields()[group_index].ty;

        // Group keys are compared by display form; the first cell seen for a
        // key is the one emitted, preserving first-seen order.
        let mut order: Vec<(Cell, u64)> = Vec::new();
        let mut index_by_key: HashMap<String, usize> = HashMap::new();
        for row in &dataset.rows {
            let cell = &row.values[group_index];
            let key = cell.to_string();
            match index_by_key.get(&key) {
                Some(&index) => order[index].1 += 1,
                None => {
                    index_by_key.insert(key, order.len());
                    order.push((cell.clone(), 1));
                }
            }
        }

        let schema = Schema::new(vec![
            FieldSchema::new(self.group_by.clone(), group_type),
            FieldSchema::new("count", FieldType::Int),
        ]);
        let rows: Vec<Row> = order
            .into_iter()
            .map(|(cell, count)| Row::new(vec![cell, Cell::Int(count as i64)]))
            .collect();

        let record_count = rows.len() as u64;
        let mut metadata =
            DatasetMetadata::new(format!("aggregate:{}", dataset.name), record_count);
        metadata.tags.push(format!("group_by:{}", self.group_by));

        let summary = Dataset::new(self.output_dataset.clone(), schema, rows, metadata)?;

        let datasets = if self.preserve_original {
            vec![dataset, summary]
        } else {
            vec![summary]
        };

        Ok(TransformOutput::Datasets(datasets))
    }
}
