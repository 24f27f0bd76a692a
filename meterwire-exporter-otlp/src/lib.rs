//! OTLP/gRPC export client for meterwire metric batches.
//!
//! This crate ships locally aggregated metric batches to an OTLP collector
//! over gRPC, one batch per call, on behalf of a metrics pipeline that
//! decides export cadence.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐     ┌──────────────────┐
//! │ Metrics Pipeline │────>│  MetricsClient   │────>│  OTLP Collector  │
//! │ (periodic flush) │     │ (deadline+retry) │     │     (gRPC)       │
//! └──────────────────┘     └──────────────────┘     └──────────────────┘
//! ```
//!
//! The client owns three concerns:
//!
//! - **Connection lifecycle**: it either dials the configured endpoint and
//!   later tears that channel down on shutdown, or borrows a caller-supplied
//!   channel it will never close.
//! - **Per-call context**: every upload runs under a derived scope bounded by
//!   the export timeout and the caller's own deadline, and carries the
//!   configured outgoing headers.
//! - **Retry policy**: failed calls are classified ([`retry::evaluate`]) into
//!   retryable/non-retryable plus a server-recommended throttle delay; the
//!   retry loop itself is an injected [`Retry`] strategy.
//!
//! # Usage
//!
//! ```ignore
//! use meterwire_common::Scope;
//! use meterwire_exporter_otlp::{MetricsClient, OtlpConfig};
//!
//! let config = OtlpConfig::load_from_file("otlp.json5")?;
//! let client = MetricsClient::builder(config).connect(&Scope::new()).await?;
//! client.upload_metrics(&Scope::new(), batch).await?;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod retry;

pub use client::{Client, ClientBuilder, MetricsClient};
pub use config::{ConfigError, OtlpConfig};
pub use error::{ExportError, Result};
pub use retry::{NoRetry, Retry, RetryDecision, evaluate};
