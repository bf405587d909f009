//! Connector registry mapping configuration type tags to constructors.
//!
//! Connectors form a closed, curated set resolved at startup: a type tag in
//! configuration maps to a constructor function registered here, trading
//! runtime extensibility for type safety. Deployments register additional
//! connectors (file readers, SQL drivers, HTTP fetchers) before the pipeline
//! is built; nothing is ever resolved by class-path lookup.

use std::collections::HashMap;

use conveyor_config::shared::{ExtractorConfig, LoaderConfig, TransformerConfig};

use crate::conveyor_error;
use crate::error::{ConveyorError, ConveyorResult, ErrorKind};
use crate::extractor::Extractor;
use crate::extractor::memory::MemoryExtractor;
use crate::loader::Loader;
use crate::loader::memory::MemoryLoader;
use crate::transformer::Transformer;
use crate::transformer::aggregate::AggregateTransformer;
use crate::transformer::rename::RenameTransformer;
use crate::transformer::validate::ValidateTransformer;
use crate::types::JobContext;

pub type ExtractorFactory =
    Box<dyn Fn(&JobContext, &ExtractorConfig) -> ConveyorResult<Box<dyn Extractor>> + Send + Sync>;
pub type TransformerFactory = Box<
    dyn Fn(&JobContext, &TransformerConfig) -> ConveyorResult<Box<dyn Transformer>> + Send + Sync,
>;
pub type LoaderFactory =
    Box<dyn Fn(&JobContext, &LoaderConfig) -> ConveyorResult<Box<dyn Loader>> + Send + Sync>;

/// Startup-time mapping from connector type tags to constructors.
pub struct Registry {
    extractors: HashMap<String, ExtractorFactory>,
    transformers: HashMap<String, TransformerFactory>,
    loaders: HashMap<String, LoaderFactory>,
}

impl Registry {
    /// An empty registry with no connectors.
    pub fn new() -> Self {
        Self {
            extractors: HashMap::new(),
            transformers: HashMap::new(),
            loaders: HashMap::new(),
        }
    }

    /// A registry with the connectors shipped in this crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        registry.register_extractor("memory", |_ctx, config| {
            Ok(Box::new(MemoryExtractor::from_options(&config.options)?))
        });

        registry.register_transformer("rename", |_ctx, config| {
            Ok(Box::new(RenameTransformer::from_options(&config.options)?))
        });
        registry.register_transformer("aggregate", |_ctx, config| {
            Ok(Box::new(AggregateTransformer::from_options(&config.options)?))
        });
        registry.register_transformer("validate", |_ctx, config| {
            Ok(Box::new(ValidateTransformer::from_options(&config.options)?))
        });

        registry.register_loader("memory", |_ctx, _config| Ok(Box::new(MemoryLoader::new())));

        registry
    }

    pub fn register_extractor(
        &mut self,
        tag: impl Into<String>,
        factory: impl Fn(&JobContext, &ExtractorConfig) -> ConveyorResult<Box<dyn Extractor>>
        + Send
        + Sync
        + 'static,
    ) {
        self.extractors.insert(tag.into(), Box::new(factory));
    }

    pub fn register_transformer(
        &mut self,
        tag: impl Into<String>,
        factory: impl Fn(&JobContext, &TransformerConfig) -> ConveyorResult<Box<dyn Transformer>>
        + Send
        + Sync
        + 'static,
    ) {
        self.transformers.insert(tag.into(), Box::new(factory));
    }

    pub fn register_loader(
        &mut self,
        tag: impl Into<String>,
        factory: impl Fn(&JobContext, &LoaderConfig) -> ConveyorResult<Box<dyn Loader>>
        + Send
        + Sync
        + 'static,
    ) {
        self.loaders.insert(tag.into(), Box::new(factory));
    }

    pub fn build_extractor(
        &self,
        ctx: &JobContext,
        config: &ExtractorConfig,
    ) -> ConveyorResult<Box<dyn Extractor>> {
        let factory = self.extractors.get(&config.kind).ok_or_else(|| {
            conveyor_error!(
                ErrorKind::ConfigError,
                "Unknown extractor type",
                format!("'{}' for stage '{}'", config.kind, config.name)
            )
        })?;

        factory(ctx, config)
    }

    pub fn build_transformer(
        &self,
        ctx: &JobContext,
        config: &TransformerConfig,
    ) -> ConveyorResult<Box<dyn Transformer>> {
        let factory = self.transformers.get(&config.kind).ok_or_else(|| {
            conveyor_error!(
                ErrorKind::ConfigError,
                "Unknown transformer type",
                format!("'{}' for stage '{}'", config.kind, config.name)
            )
        })?;

        factory(ctx, config)
    }

    pub fn build_loader(
        &self,
        ctx: &JobContext,
        config: &LoaderConfig,
    ) -> ConveyorResult<Box<dyn Loader>> {
        let factory = self.loaders.get(&config.kind).ok_or_else(|| {
            conveyor_error!(
                ErrorKind::ConfigError,
                "Unknown loader type",
                format!("'{}' for stage '{}'", config.kind, config.name)
            )
        })?;

        factory(ctx, config)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
