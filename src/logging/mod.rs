//! Structured logging to stderr and NDJSON output on stdout.

mod format;

pub use format::StructuredLogger;
