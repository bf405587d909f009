use std::sync::Arc;

use conveyor::extractor::memory::MemoryExtractor;
use conveyor::loader::memory::MemoryLoader;
use conveyor::registry::Registry;
use conveyor::test_utils::{FailingLoader, sample_dataset};
use conveyor_config::shared::JobConfig;

/// Parses a YAML job configuration document.
pub fn job_config(yaml: &str) -> JobConfig {
    conveyor_config::load_from_str(yaml).expect("test YAML must parse")
}

/// A registry with builtins plus a `capture` loader delegating to the given
/// memory loader, so tests can assert on what was committed.
pub fn registry_with_capture(loader: &MemoryLoader) -> Registry {
    let mut registry = Registry::with_builtins();
    let capture = loader.clone();
    registry.register_loader("capture", move |_ctx, _config| Ok(Box::new(capture.clone())));
    registry
}

/// Registers a `sample` extractor producing a fixed-size sample dataset.
pub fn register_sample_extractor(registry: &mut Registry, dataset_name: &str, rows: usize) {
    let dataset = sample_dataset(dataset_name, rows);
    registry.register_extractor("sample", move |_ctx, _config| {
        Ok(Box::new(MemoryExtractor::new(vec![dataset.clone()])))
    });
}

/// Registers a `flaky_sink` loader delegating to the given failing loader.
pub fn register_failing_loader(registry: &mut Registry, loader: &Arc<FailingLoader>) {
    let shared = loader.clone();
    registry.register_loader("flaky_sink", move |_ctx, _config| Ok(Box::new(shared.clone())));
}
