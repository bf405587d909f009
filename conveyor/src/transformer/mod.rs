pub mod aggregate;
pub mod base;
pub mod rename;
pub mod validate;

pub use base::{TransformInput, TransformOutput, Transformer};
