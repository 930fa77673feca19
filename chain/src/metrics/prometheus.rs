//! Prometheus-backed metrics and HTTP exporter.
//!
//! This module defines a [`MetricsRegistry`] that owns a Prometheus
//! registry and a set of strongly-typed node metrics, and an async HTTP
//! exporter that serves `/metrics` using `hyper`.

use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    Method, Request, Response, StatusCode, body::Incoming, header, server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use prometheus::{self, Encoder, Gauge, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder};

/// Node-wide Prometheus metrics: consensus, mempool, and gossip/peer
/// instrumentation in one registered set.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Latency of full block validation (structural + semantic), in seconds.
    pub block_validation_seconds: Histogram,
    /// Total number of blocks successfully applied to the canonical chain.
    pub blocks_applied_total: IntCounter,
    /// Total number of blocks rejected by validation.
    pub blocks_rejected_total: IntCounter,
    /// Current number of transactions held in the mempool.
    pub mempool_size: Gauge,
    /// Total number of transactions admitted into the mempool.
    pub mempool_admitted_total: IntCounter,
    /// Total number of gossip messages received from peers.
    pub gossip_messages_received_total: IntCounter,
    /// Total number of gossip messages dropped as duplicates.
    pub gossip_messages_deduped_total: IntCounter,
    /// Total number of rate-limit or protocol violations recorded against peers.
    pub peer_violations_total: IntCounter,
    /// Total number of peers banned for repeated violations.
    pub peer_bans_total: IntCounter,
    /// Total number of sync sessions started (initial catch-up or partition recovery).
    pub sync_sessions_total: IntCounter,
}

impl NodeMetrics {
    /// Registers all node metrics into the given `Registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let block_validation_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "block_validation_seconds",
                "Time to validate a block (structural + semantic) in seconds",
            )
            .buckets(vec![
                0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
            ]),
        )?;
        registry.register(Box::new(block_validation_seconds.clone()))?;

        let blocks_applied_total = IntCounter::with_opts(Opts::new(
            "blocks_applied_total",
            "Total number of blocks applied to the canonical chain",
        ))?;
        registry.register(Box::new(blocks_applied_total.clone()))?;

        let blocks_rejected_total = IntCounter::with_opts(Opts::new(
            "blocks_rejected_total",
            "Total number of blocks rejected by validation",
        ))?;
        registry.register(Box::new(blocks_rejected_total.clone()))?;

        let mempool_size = Gauge::with_opts(Opts::new(
            "mempool_size",
            "Current number of transactions held in the mempool",
        ))?;
        registry.register(Box::new(mempool_size.clone()))?;

        let mempool_admitted_total = IntCounter::with_opts(Opts::new(
            "mempool_admitted_total",
            "Total number of transactions admitted into the mempool",
        ))?;
        registry.register(Box::new(mempool_admitted_total.clone()))?;

        let gossip_messages_received_total = IntCounter::with_opts(Opts::new(
            "gossip_messages_received_total",
            "Total number of gossip messages received from peers",
        ))?;
        registry.register(Box::new(gossip_messages_received_total.clone()))?;

        let gossip_messages_deduped_total = IntCounter::with_opts(Opts::new(
            "gossip_messages_deduped_total",
            "Total number of gossip messages dropped as duplicates",
        ))?;
        registry.register(Box::new(gossip_messages_deduped_total.clone()))?;

        let peer_violations_total = IntCounter::with_opts(Opts::new(
            "peer_violations_total",
            "Total number of rate-limit or protocol violations recorded against peers",
        ))?;
        registry.register(Box::new(peer_violations_total.clone()))?;

        let peer_bans_total = IntCounter::with_opts(Opts::new(
            "peer_bans_total",
            "Total number of peers banned for repeated violations",
        ))?;
        registry.register(Box::new(peer_bans_total.clone()))?;

        let sync_sessions_total = IntCounter::with_opts(Opts::new(
            "sync_sessions_total",
            "Total number of sync sessions started",
        ))?;
        registry.register(Box::new(sync_sessions_total.clone()))?;

        Ok(Self {
            block_validation_seconds,
            blocks_applied_total,
            blocks_rejected_total,
            mempool_size,
            mempool_admitted_total,
            gossip_messages_received_total,
            gossip_messages_deduped_total,
            peer_violations_total,
            peer_bans_total,
            sync_sessions_total,
        })
    }
}

/// Wrapper around a Prometheus registry and the node metrics. The main
/// handle passed around the node; wrap in an [`Arc`] to share across tasks.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    pub node: NodeMetrics,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("chain".to_string()), None)?;
        let node = NodeMetrics::register(&registry)?;
        Ok(Self { registry, node })
    }

    /// Encodes all metrics in this registry into the Prometheus text format.
    pub fn gather_text(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!(error = %e, "failed to encode Prometheus metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Runs an HTTP server that exposes Prometheus metrics at `GET /metrics`.
/// All other paths return 404. Intended to be spawned onto a Tokio runtime.
pub async fn run_prometheus_http_server(
    metrics: Arc<MetricsRegistry>,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let svc = service_fn(move |req| {
                let metrics = metrics.clone();
                handle_request(req, metrics)
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, svc).await {
                tracing::warn!(error = %err, "prometheus HTTP connection error");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    metrics: Arc<MetricsRegistry>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body = metrics.gather_text();
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
                .body(Full::new(Bytes::from(body)))
                .unwrap())
        }
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("not found")))
            .unwrap()),
    }
}
