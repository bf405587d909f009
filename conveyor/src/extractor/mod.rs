pub mod base;
pub mod memory;
pub mod paged;

pub use base::{ExtractOutput, Extractor};
