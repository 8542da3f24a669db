//! Structured logging setup and JSON-lines record output.

mod format;

pub use format::StructuredLogger;
