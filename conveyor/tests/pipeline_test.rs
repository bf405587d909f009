use std::sync::Arc;

use conveyor::error::ErrorKind;
use conveyor::loader::memory::MemoryLoader;
use conveyor::pipeline::{Pipeline, RunMode};
use conveyor::registry::Registry;
use conveyor::test_utils::FailingLoader;
use conveyor::types::JobStatus;
use conveyor_telemetry::init_test_tracing;
use rand::random;

mod common;

use common::{job_config, register_failing_loader, register_sample_extractor, registry_with_capture};

const ORDERS_YAML: &str = r#"
extractors:
  - name: orders
    type: memory
    options:
      datasets:
        - name: orders
          fields:
            - {name: id, type: int}
            - {name: category, type: string}
            - {name: amount, type: float}
          rows:
            - [1, "books", 12.5]
            - [2, "games", 30.0]
            - [3, "books", 5.25]
            - [4, "music", 8.0]
            - [5, "games", 14.75]
transformers:
  - name: shape_orders
    type: rename
    inputs: [orders]
    options:
      rename_fields: {category: segment}
loaders:
  - name: warehouse
    type: capture
    source_dataset: orders
"#;

#[tokio::test(flavor = "multi_thread")]
async fn rename_pipeline_reports_five_records_at_every_stage() {
    init_test_tracing();

    let loader = MemoryLoader::new();
    let registry = registry_with_capture(&loader);

    let pipeline = Pipeline::new(
        Some("job_scenario_a".into()),
        job_config(ORDERS_YAML),
        registry,
    )
    .unwrap();
    let report = pipeline.run(RunMode::Full).await.unwrap();

    assert_eq!(report.status, JobStatus::CompletedSuccess);
    assert_eq!(report.stages.len(), 3);
    for stage in &report.stages {
        assert!(stage.success, "stage {} failed", stage.stage);
        assert_eq!(stage.records_in, 5);
        assert_eq!(stage.records_out, 5);
    }

    // The loader observed the renamed field.
    let batches = loader.batches().await;
    assert_eq!(batches.len(), 1);
    let loaded = &batches[0].1;
    assert_eq!(loaded.len(), 5);
    assert!(loaded.schema.field_index("segment").is_some());
    assert!(loaded.schema.field_index("category").is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn aggregation_keeps_original_and_registers_summary() {
    init_test_tracing();

    let orders_loader = MemoryLoader::new();
    let summary_loader = MemoryLoader::new();

    let mut registry = Registry::with_builtins();
    register_sample_extractor(&mut registry, "orders", 12);
    let orders_capture = orders_loader.clone();
    registry.register_loader("orders_sink", move |_ctx, _config| {
        Ok(Box::new(orders_capture.clone()))
    });
    let summary_capture = summary_loader.clone();
    registry.register_loader("summary_sink", move |_ctx, _config| {
        Ok(Box::new(summary_capture.clone()))
    });

    let config = job_config(
        r#"
extractors:
  - name: orders
    type: sample
transformers:
  - name: summarize
    type: aggregate
    inputs: [orders]
    outputs: [orders, summary]
    options:
      group_by: category
      output_dataset: summary
      preserve_original: true
loaders:
  - name: orders_out
    type: orders_sink
    source_dataset: orders
  - name: summary_out
    type: summary_sink
    source_dataset: summary
"#,
    );

    let pipeline = Pipeline::new(Some("job_scenario_b".into()), config, registry).unwrap();
    let report = pipeline.run(RunMode::Full).await.unwrap();

    assert_eq!(report.status, JobStatus::CompletedSuccess);

    // The original dataset is unchanged next to the 3-group summary.
    let orders_batches = orders_loader.batches().await;
    assert_eq!(orders_batches[0].1.len(), 12);
    let summary_batches = summary_loader.batches().await;
    assert_eq!(summary_batches[0].1.len(), 3);
    assert!(summary_batches[0].1.schema.field_index("count").is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_batch_yields_partial_completion() {
    init_test_tracing();

    let loader = Arc::new(FailingLoader::failing_on_batch(2));
    let mut registry = Registry::with_builtins();
    register_sample_extractor(&mut registry, "orders", 2500);
    register_failing_loader(&mut registry, &loader);

    let config = job_config(
        r#"
pipeline:
  continue_on_error: true
extractors:
  - name: orders
    type: sample
loaders:
  - name: warehouse
    type: flaky_sink
    source_dataset: orders
    batch:
      batch_size: 1000
      if_exists: append
"#,
    );

    let pipeline = Pipeline::new(Some("job_scenario_d".into()), config, registry).unwrap();
    let report = pipeline.run(RunMode::Full).await.unwrap();

    assert_eq!(report.status, JobStatus::CompletedPartial);

    let failed: Vec<_> = report.failed_stages().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].stage, "warehouse");
    assert_eq!(failed[0].error_kind.as_deref(), Some("LoadBatchFailed"));
    assert!(failed[0].error.as_deref().unwrap().contains("batch 2 of 3"));

    // Batch 1 stays committed; nothing was rolled back.
    assert_eq!(loader.committed_rows().await, 1000);
    assert_eq!(failed[0].records_out, 1000);
}

#[tokio::test(flavor = "multi_thread")]
async fn stage_failure_aborts_the_run_without_continue_on_error() {
    init_test_tracing();

    let loader = Arc::new(FailingLoader::failing_on_batch(1));
    let mut registry = Registry::with_builtins();
    register_sample_extractor(&mut registry, "orders", 10);
    register_failing_loader(&mut registry, &loader);

    let config = job_config(
        r#"
extractors:
  - name: orders
    type: sample
loaders:
  - name: warehouse
    type: flaky_sink
    source_dataset: orders
"#,
    );

    let job_id = format!("job_{:08x}", random::<u32>());
    let pipeline = Pipeline::new(Some(job_id.clone()), config, registry).unwrap();
    let report = pipeline.run(RunMode::Full).await.unwrap();

    assert_eq!(report.job_id, job_id);
    assert_eq!(report.status, JobStatus::Failed);
    assert_eq!(loader.committed_rows().await, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn validate_only_runs_no_stage() {
    init_test_tracing();

    let loader = MemoryLoader::new();
    let registry = registry_with_capture(&loader);

    let pipeline = Pipeline::new(None, job_config(ORDERS_YAML), registry).unwrap();
    let report = pipeline.run(RunMode::ValidateOnly).await.unwrap();

    assert_eq!(report.status, JobStatus::CompletedSuccess);
    assert!(report.stages.is_empty());
    assert!(loader.batches().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn dry_run_validates_connectors_without_moving_data() {
    init_test_tracing();

    let loader = MemoryLoader::new();
    let registry = registry_with_capture(&loader);

    let pipeline = Pipeline::new(None, job_config(ORDERS_YAML), registry).unwrap();
    let report = pipeline.run(RunMode::DryRun).await.unwrap();

    assert_eq!(report.status, JobStatus::CompletedSuccess);
    assert!(loader.batches().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn undeclared_dataset_fails_static_validation() {
    init_test_tracing();

    let config = job_config(
        r#"
extractors:
  - name: orders
    type: memory
    options:
      datasets:
        - name: orders
          fields: [{name: id, type: int}]
          rows: [[1]]
transformers:
  - name: shape
    type: rename
    inputs: [users]
    options:
      rename_fields: {a: b}
loaders:
  - name: warehouse
    type: memory
    source_dataset: orders
"#,
    );

    let pipeline = Pipeline::new(None, config, Registry::with_builtins()).unwrap();
    let err = pipeline.run(RunMode::Full).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MissingDataset);
    assert!(err.detail().unwrap().contains("users"));
}

#[tokio::test(flavor = "multi_thread")]
async fn ambiguous_load_source_is_a_config_error() {
    init_test_tracing();

    let config = job_config(
        r#"
extractors:
  - name: orders
    type: memory
    options:
      datasets:
        - name: orders
          fields: [{name: id, type: int}]
          rows: [[1]]
        - name: users
          fields: [{name: id, type: int}]
          rows: [[2]]
    outputs: [orders, users]
loaders:
  - name: warehouse
    type: memory
"#,
    );

    let pipeline = Pipeline::new(None, config, Registry::with_builtins()).unwrap();
    let err = pipeline.run(RunMode::Full).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConfigError);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelled_run_finishes_as_failed() {
    init_test_tracing();

    let loader = MemoryLoader::new();
    let registry = registry_with_capture(&loader);

    let pipeline = Pipeline::new(None, job_config(ORDERS_YAML), registry).unwrap();
    pipeline.shutdown_tx().shutdown().unwrap();

    let report = pipeline.run(RunMode::Full).await.unwrap();

    assert_eq!(report.status, JobStatus::Failed);
    let failed: Vec<_> = report.failed_stages().collect();
    assert!(
        failed
            .iter()
            .any(|stage| stage.error_kind.as_deref() == Some("Cancelled"))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_extraction_completes_without_loading() {
    init_test_tracing();

    let loader = MemoryLoader::new();
    let registry = registry_with_capture(&loader);

    let config = job_config(
        r#"
extractors:
  - name: orders
    type: memory
    options:
      datasets:
        - name: orders
          fields: [{name: id, type: int}]
          rows: []
loaders:
  - name: warehouse
    type: capture
    source_dataset: orders
"#,
    );

    let pipeline = Pipeline::new(None, config, registry).unwrap();
    let report = pipeline.run(RunMode::Full).await.unwrap();

    assert_eq!(report.status, JobStatus::CompletedSuccess);
    assert!(loader.batches().await.is_empty());
}

#[test]
fn duplicate_stage_names_are_rejected_at_construction() {
    let config = job_config(
        r#"
extractors:
  - name: orders
    type: memory
  - name: orders
    type: memory
loaders:
  - name: warehouse
    type: memory
    source_dataset: orders
"#,
    );

    let err = match Pipeline::new(None, config, Registry::with_builtins()) {
        Ok(_) => panic!("expected Pipeline::new to fail"),
        Err(e) => e,
    };
    assert_eq!(err.kind(), ErrorKind::ConfigError);
}
