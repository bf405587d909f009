use std::path::Path;

use serde::de::DeserializeOwned;

/// Prefix for environment variable configuration overrides.
const ENV_PREFIX: &str = "CONVEYOR";

/// Separator between environment variable prefix and key segments.
const ENV_PREFIX_SEPARATOR: &str = "_";

/// Separator for nested configuration keys in environment variables.
///
/// Example: `CONVEYOR_PIPELINE__CONTINUE_ON_ERROR=true` sets the
/// `pipeline.continue_on_error` field.
const ENV_SEPARATOR: &str = "__";

/// Loads a configuration value from a YAML file and environment variables.
///
/// Loads in this order, later sources overriding earlier ones:
/// 1. The YAML file at `path`
/// 2. Environment variable overrides prefixed with `CONVEYOR`
///
/// Nested keys use double underscores, as in
/// `CONVEYOR_PIPELINE__MAX_PARALLEL_EXTRACTORS=8`.
pub fn load_from_path<T>(path: &Path) -> Result<T, config::ConfigError>
where
    T: DeserializeOwned,
{
    let settings = config::Config::builder()
        .add_source(config::File::from(path.to_path_buf()))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_PREFIX_SEPARATOR)
                .separator(ENV_SEPARATOR),
        )
        .build()?;

    settings.try_deserialize::<T>()
}

/// Loads a configuration value from an in-memory YAML document.
///
/// Environment overrides are intentionally not applied here so that tests and
/// programmatic callers get exactly the document they wrote.
pub fn load_from_str<T>(yaml: &str) -> Result<T, config::ConfigError>
where
    T: DeserializeOwned,
{
    let settings = config::Config::builder()
        .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
        .build()?;

    settings.try_deserialize::<T>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::JobConfig;

    #[test]
    fn minimal_job_config_parses() {
        let yaml = r#"
extractors:
  - name: orders
    type: memory
loaders:
  - name: sink
    type: memory
    source_dataset: orders
"#;
        let config: JobConfig = load_from_str(yaml).unwrap();
        assert_eq!(config.extractors.len(), 1);
        assert_eq!(config.loaders.len(), 1);
        assert!(config.transformers.is_empty());
        assert!(!config.pipeline.continue_on_error);
    }

    #[test]
    fn invalid_yaml_is_rejected() {
        let result = load_from_str::<JobConfig>("extractors: 42");
        assert!(result.is_err());
    }
}
