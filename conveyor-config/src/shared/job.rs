use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::ValidationError;
use crate::shared::{LoadBatchConfig, PaginationConfig, PipelineSettings, RateLimitConfig, RetryConfig};

/// Declarative configuration for one extraction stage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Stage name, unique among extractors.
    pub name: String,
    /// Connector type tag resolved through the registry.
    #[serde(rename = "type")]
    pub kind: String,
    /// Names of the datasets this stage registers; defaults to the stage name.
    #[serde(default)]
    pub outputs: Option<Vec<String>>,
    /// Request budget for throttled sources.
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
    /// Fetch-level retry policy; falls back to the pipeline policy.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    /// Pagination strategy for paged sources.
    #[serde(default)]
    pub pagination: Option<PaginationConfig>,
    /// Connector-specific options, interpreted by the concrete connector.
    #[serde(default)]
    pub options: serde_json::Value,
}

impl ExtractorConfig {
    /// Dataset names this stage registers in the store.
    pub fn output_names(&self) -> Vec<String> {
        match &self.outputs {
            Some(outputs) if !outputs.is_empty() => outputs.clone(),
            _ => vec![self.name.clone()],
        }
    }
}

/// Declarative configuration for one transform stage.
///
/// Transform stages run sequentially in the order they are declared, since a
/// later transform may depend on datasets produced by an earlier one.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransformerConfig {
    /// Stage name, unique among transformers.
    pub name: String,
    /// Connector type tag resolved through the registry.
    #[serde(rename = "type")]
    pub kind: String,
    /// Datasets this stage reads from the store.
    pub inputs: Vec<String>,
    /// Datasets this stage leaves registered; defaults to `inputs`.
    ///
    /// Forking transformers (aggregation with a preserved original) must
    /// declare the extra names here so downstream stages pass static
    /// dependency validation.
    #[serde(default)]
    pub outputs: Option<Vec<String>>,
    /// Connector-specific options.
    #[serde(default)]
    pub options: serde_json::Value,
}

impl TransformerConfig {
    /// Dataset names registered after this stage runs.
    pub fn output_names(&self) -> Vec<String> {
        match &self.outputs {
            Some(outputs) if !outputs.is_empty() => outputs.clone(),
            _ => self.inputs.clone(),
        }
    }
}

/// Declarative configuration for one load stage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Stage name, unique among loaders.
    pub name: String,
    /// Connector type tag resolved through the registry.
    #[serde(rename = "type")]
    pub kind: String,
    /// Dataset this stage reads; defaults to the sole dataset left by the
    /// preceding phase when unambiguous.
    #[serde(default)]
    pub source_dataset: Option<String>,
    /// Chunked loading configuration.
    #[serde(default)]
    pub batch: LoadBatchConfig,
    /// Connector-specific options.
    #[serde(default)]
    pub options: serde_json::Value,
}

/// Complete declarative description of one ETL job.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobConfig {
    /// Run-level pipeline settings.
    #[serde(default)]
    pub pipeline: PipelineSettings,
    pub extractors: Vec<ExtractorConfig>,
    #[serde(default)]
    pub transformers: Vec<TransformerConfig>,
    pub loaders: Vec<LoaderConfig>,
}

impl JobConfig {
    /// Validates the structural shape of the job configuration.
    ///
    /// Dataset dependency ordering is checked separately by the pipeline's
    /// validation phase; this only rejects configurations that can never run.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.pipeline.validate()?;

        if self.extractors.is_empty() {
            return Err(ValidationError::NoExtractors);
        }
        if self.loaders.is_empty() {
            return Err(ValidationError::NoLoaders);
        }

        check_unique_names(self.extractors.iter().map(|e| e.name.as_str()))?;
        check_unique_names(self.transformers.iter().map(|t| t.name.as_str()))?;
        check_unique_names(self.loaders.iter().map(|l| l.name.as_str()))?;

        for extractor in &self.extractors {
            if extractor.kind.trim().is_empty() {
                return Err(ValidationError::MissingStageType(extractor.name.clone()));
            }
            if let Some(rate_limit) = &extractor.rate_limit {
                rate_limit.validate()?;
            }
            if let Some(retry) = &extractor.retry {
                retry.validate()?;
            }
            if let Some(pagination) = &extractor.pagination {
                pagination.validate()?;
            }
        }

        for transformer in &self.transformers {
            if transformer.kind.trim().is_empty() {
                return Err(ValidationError::MissingStageType(transformer.name.clone()));
            }
            if transformer.inputs.is_empty() {
                return Err(ValidationError::NoTransformerInputs(
                    transformer.name.clone(),
                ));
            }
        }

        for loader in &self.loaders {
            if loader.kind.trim().is_empty() {
                return Err(ValidationError::MissingStageType(loader.name.clone()));
            }
            loader.batch.validate()?;
        }

        Ok(())
    }
}

fn check_unique_names<'a>(names: impl Iterator<Item = &'a str>) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(ValidationError::DuplicateStageName(name.to_string()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config() -> JobConfig {
        JobConfig {
            pipeline: PipelineSettings::default(),
            extractors: vec![ExtractorConfig {
                name: "orders".into(),
                kind: "memory".into(),
                outputs: None,
                rate_limit: None,
                retry: None,
                pagination: None,
                options: serde_json::Value::Null,
            }],
            transformers: vec![],
            loaders: vec![LoaderConfig {
                name: "sink".into(),
                kind: "memory".into(),
                source_dataset: Some("orders".into()),
                batch: LoadBatchConfig::default(),
                options: serde_json::Value::Null,
            }],
        }
    }

    #[test]
    fn minimal_config_is_valid() {
        assert!(minimal_config().validate().is_ok());
    }

    #[test]
    fn empty_extractors_are_rejected() {
        let mut config = minimal_config();
        config.extractors.clear();
        assert!(matches!(
            config.validate(),
            Err(ValidationError::NoExtractors)
        ));
    }

    #[test]
    fn duplicate_stage_names_are_rejected() {
        let mut config = minimal_config();
        let duplicate = config.extractors[0].clone();
        config.extractors.push(duplicate);
        assert!(matches!(
            config.validate(),
            Err(ValidationError::DuplicateStageName(name)) if name == "orders"
        ));
    }

    #[test]
    fn transformer_without_inputs_is_rejected() {
        let mut config = minimal_config();
        config.transformers.push(TransformerConfig {
            name: "shape".into(),
            kind: "rename".into(),
            inputs: vec![],
            outputs: None,
            options: serde_json::Value::Null,
        });
        assert!(matches!(
            config.validate(),
            Err(ValidationError::NoTransformerInputs(name)) if name == "shape"
        ));
    }

    #[test]
    fn extractor_outputs_default_to_stage_name() {
        let config = minimal_config();
        assert_eq!(config.extractors[0].output_names(), vec!["orders"]);
    }
}
