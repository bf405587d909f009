//! Resilience layer for extraction from unreliable, throttled sources.
//!
//! Combines per-extractor request throttling, exponential backoff retries
//! driven by the closed failure classification, and the pagination state
//! machine that turns page-by-page fetches into whole datasets.

pub mod paginator;
pub mod rate_limiter;
pub mod retry;

pub use paginator::*;
pub use rate_limiter::*;
pub use retry::*;
