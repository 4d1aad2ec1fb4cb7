pub mod errors;
pub mod tracing;
