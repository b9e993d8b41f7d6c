//! Tracing setup: structured JSON logs and optional OTLP span export.
//!
//! # Telemetry invariants
//!
//! - **No plaintext field values or key material** may appear in any span
//!   attribute or log field. Logs carry record kinds, field names, user ids,
//!   and lengths only.
//! - Log level is configurable via `LOG_LEVEL` (default: `info`); `RUST_LOG`
//!   takes precedence when set.

pub mod init;

pub use init::init_telemetry;
