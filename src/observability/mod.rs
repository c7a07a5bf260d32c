//! Observability for docvault
//!
//! Structured JSON logging with explicit severities. The logger is handed
//! to each pipeline through its options; nothing here is process-global.
//!
//! Principles:
//! 1. Observability is read-only
//! 2. No side effects on execution
//! 3. No async or background threads
//! 4. Deterministic output

mod logger;

pub use logger::{Logger, Severity};
