pub mod cancel;
pub mod tracing;
