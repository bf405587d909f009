use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use crate::conveyor_error;
use crate::error::{ConveyorError, ConveyorResult, ErrorKind};
use crate::transformer::base::{TransformInput, TransformOutput, Transformer};
use crate::types::{Dataset, FieldSchema, Row, Schema};

#[derive(Debug, Default, Deserialize)]
struct RenameOptions {
    /// Fields to keep, in output order; everything is kept when empty.
    #[serde(default)]
    select_fields: Vec<String>,
    /// Mapping from current field name to new field name.
    #[serde(default)]
    rename_fields: BTreeMap<String, String>,
}

/// Structural transformer that projects and renames dataset fields.
///
/// A select or rename naming a field the dataset does not have is logged and
/// skipped, matching the permissive behavior expected from shape-only
/// transforms; the records themselves are never touched.
#[derive(Debug)]
pub struct RenameTransformer {
    select_fields: Vec<String>,
    rename_fields: BTreeMap<String, String>,
}

impl RenameTransformer {
    pub fn from_options(options: &serde_json::Value) -> ConveyorResult<Self> {
        let options: RenameOptions = serde_json::from_value(options.clone()).map_err(|err| {
            conveyor_error!(
                ErrorKind::ConfigError,
                "Invalid rename transformer options",
                err
            )
        })?;

        if options.select_fields.is_empty() && options.rename_fields.is_empty() {
            return Err(conveyor_error!(
                ErrorKind::ConfigError,
                "Rename transformer configures neither selection nor renames"
            ));
        }

        Ok(Self {
            select_fields: options.select_fields,
            rename_fields: options.rename_fields,
        })
    }
}

#[async_trait]
impl Transformer for RenameTransformer {
    async fn transform(&self, input: TransformInput) -> ConveyorResult<TransformOutput> {
        let dataset = input.into_single()?;

        // Resolve the projection first: indices of kept fields in input order.
        let kept: Vec<usize> = if self.select_fields.is_empty() {
            (0..dataset.schema.len()).collect()
        } else {
            let mut kept = Vec::with_capacity(self.select_fields.len());
            for name in &self.select_fields {
                match dataset.schema.field_index(name) {
                    Some(index) => kept.push(index),
                    None => warn!(field = name, "selected field not present, skipping"),
                }
            }
            kept
        };

        let fields = dataset.schema.fields();
        let mut out_fields = Vec::with_capacity(kept.len());
        for &index in &kept {
            let field = &fields[index];
            let name = self
                .rename_fields
                .get(&field.name)
                .cloned()
                .unwrap_or_else(|| field.name.clone());
            out_fields.push(FieldSchema::new(name, field.ty));
        }

        for missing in self
            .rename_fields
            .keys()
            .filter(|name| dataset.schema.field_index(name).is_none())
        {
            warn!(field = %missing, "renamed field not present, skipping");
        }

        let schema = Schema::new(out_fields);
        let rows = dataset
            .rows
            .iter()
            .map(|row| Row::new(kept.iter().map(|&index| row.values[index].clone()).collect()))
            .collect();

        let shaped = Dataset::new(
            dataset.name.clone(),
            schema,
            rows,
            dataset.metadata.clone(),
        )?;

        Ok(TransformOutput::Replace(shaped))
    }
}
