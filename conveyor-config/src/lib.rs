//! Configuration management for conveyor jobs.
//!
//! Provides declarative job configuration types, YAML file loading with
//! environment variable overrides, and semantic validation of job settings
//! before a pipeline touches any source or destination.

mod load;
pub mod shared;

pub use load::*;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A job must declare at least one extractor.
    #[error("at least one extractor must be configured")]
    NoExtractors,
    /// A job must declare at least one loader.
    #[error("at least one loader must be configured")]
    NoLoaders,
    /// A stage entry is missing its connector type tag.
    #[error("stage '{0}' is missing a connector `type`")]
    MissingStageType(String),
    /// Two stages of the same kind share a name.
    #[error("duplicate stage name '{0}'")]
    DuplicateStageName(String),
    /// A transform stage must declare the datasets it reads.
    #[error("transformer '{0}' declares no input datasets")]
    NoTransformerInputs(String),
    /// Requests per minute must be strictly positive.
    #[error("`requests_per_minute` must be greater than zero")]
    RequestsPerMinuteZero,
    /// The exponential backoff multiplier cannot shrink delays.
    #[error("`backoff_factor` must be at least 1.0")]
    BackoffFactorBelowOne,
    /// Load batches must hold at least one record.
    #[error("`batch_size` cannot be zero")]
    BatchSizeZero,
    /// Pagination page size must be strictly positive.
    #[error("`page_size` cannot be zero")]
    PageSizeZero,
    /// Pagination must allow at least one page.
    #[error("`max_pages` cannot be zero")]
    MaxPagesZero,
    /// Cursor pagination needs to know where the next token lives.
    #[error("cursor pagination requires `cursor_path`")]
    MissingCursorPath,
    /// Worker parallelism limits cannot be zero.
    #[error("`{0}` cannot be zero")]
    ParallelismZero(&'static str),
}
