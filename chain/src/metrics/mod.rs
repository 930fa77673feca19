//! Metrics and instrumentation for the chain.
//!
//! Defines Prometheus-compatible metrics for consensus, the mempool, and
//! the gossip/sync layer, plus a small HTTP exporter that serves
//! `/metrics` in Prometheus text format.
//!
//! Typical usage in a node:
//!
//! ```ignore
//! use std::net::SocketAddr;
//! use std::sync::Arc;
//! use chain::metrics::{MetricsRegistry, run_prometheus_http_server};
//!
//! let registry = Arc::new(MetricsRegistry::new()?);
//! let addr: SocketAddr = "127.0.0.1:9898".parse()?;
//! tokio::spawn(run_prometheus_http_server(registry.clone(), addr));
//!
//! registry.node.blocks_applied_total.inc();
//! ```

pub mod prometheus;

pub use prometheus::{MetricsRegistry, NodeMetrics, run_prometheus_http_server};
