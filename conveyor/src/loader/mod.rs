pub mod base;
pub mod chunked;
pub mod memory;

pub use base::{BatchDisposition, Loader};
pub use chunked::{ChunkedLoadReport, load_chunked, plan_batches};
