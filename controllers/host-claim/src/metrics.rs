//! Prometheus metrics and probe endpoints.
//!
//! Metrics carry the `hostclaim` prefix and are served on `/metrics` next
//! to the `/healthz` and `/readyz` probes.
//!
//! - `hostclaim_associate_total{result}`: association attempts by outcome
//!   (`success`, `requeue`, `error`)
//! - `hostclaim_reconcile_total{result}`: reconciliations by outcome
//! - `hostclaim_reconcile_duration_seconds`: reconciliation latency

use crate::error::ControllerError;
use crate::requeue::is_requeue_after_error;
use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use prometheus::{CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::LazyLock;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const METRICS_NAMESPACE: &str = "hostclaim";

/// Registry served on `/metrics`.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

struct Metrics {
    associations_total: CounterVec,
    reconciliations_total: CounterVec,
    reconciliation_duration_seconds: Histogram,
}

impl Metrics {
    fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let associations_total = CounterVec::new(
            Opts::new(
                format!("{METRICS_NAMESPACE}_associate_total"),
                "Total number of HostClaim association attempts by result",
            ),
            &["result"],
        )?;
        registry.register(Box::new(associations_total.clone()))?;

        let reconciliations_total = CounterVec::new(
            Opts::new(
                format!("{METRICS_NAMESPACE}_reconcile_total"),
                "Total number of HostClaim reconciliations by result",
            ),
            &["result"],
        )?;
        registry.register(Box::new(reconciliations_total.clone()))?;

        let reconciliation_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                format!("{METRICS_NAMESPACE}_reconcile_duration_seconds"),
                "Duration of HostClaim reconciliations in seconds",
            )
            .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        )?;
        registry.register(Box::new(reconciliation_duration_seconds.clone()))?;

        Ok(Self {
            associations_total,
            reconciliations_total,
            reconciliation_duration_seconds,
        })
    }
}

static METRICS: LazyLock<Result<Metrics, prometheus::Error>> =
    LazyLock::new(|| Metrics::register(&METRICS_REGISTRY));

/// Outcome label of a reconciliation or association result.
pub fn outcome<T>(result: &Result<T, ControllerError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(e) if is_requeue_after_error(e).is_some() => "requeue",
        Err(_) => "error",
    }
}

/// Count one association attempt.
pub fn record_associate(result: &Result<(), ControllerError>) {
    if let Ok(metrics) = METRICS.as_ref() {
        metrics
            .associations_total
            .with_label_values(&[outcome(result)])
            .inc();
    }
}

/// Count one reconciliation and observe its duration.
pub fn record_reconcile(result: &'static str, duration: Duration) {
    if let Ok(metrics) = METRICS.as_ref() {
        metrics.reconciliations_total.with_label_values(&[result]).inc();
        metrics
            .reconciliation_duration_seconds
            .observe(duration.as_secs_f64());
    }
}

/// Render every registered metric in the Prometheus text format.
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    if let Err(e) = METRICS.as_ref() {
        return Err(prometheus::Error::Msg(format!("metrics registration failed: {e}")));
    }
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&METRICS_REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}

async fn metrics_handler() -> (StatusCode, String) {
    match gather_metrics() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!(error = %e, "Failed to gather metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

fn router() -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(|| async { "ok" }))
}

/// Serve metrics and probes on `addr` until `shutdown` fires.
pub async fn serve(addr: SocketAddr, shutdown: CancellationToken) -> Result<(), ControllerError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Metrics server starting");
    axum::serve(listener, router())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("Metrics server stopped");
    Ok(())
}
