//! Prometheus metrics definitions and HTTP server

use std::net::SocketAddr;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info};

lazy_static::lazy_static! {
    /// Total number of reconciliations
    pub static ref RECONCILIATIONS: CounterVec = register_counter_vec!(
        "ingress_monitor_operator_reconciliations_total",
        "Total number of reconciliations",
        &["queue"]
    ).unwrap();

    /// Total number of reconciliation errors
    pub static ref RECONCILIATION_ERRORS: CounterVec = register_counter_vec!(
        "ingress_monitor_operator_reconciliation_errors_total",
        "Total number of reconciliation errors",
        &["queue"]
    ).unwrap();

    /// Reconciliation duration histogram
    pub static ref RECONCILE_DURATION: HistogramVec = register_histogram_vec!(
        "ingress_monitor_operator_reconcile_duration_seconds",
        "Duration of reconciliations in seconds",
        &["queue"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    /// IngressMonitors currently managed by the operator
    pub static ref INGRESS_MONITORS_TOTAL: GaugeVec = register_gauge_vec!(
        "ingressmonitor_ingressmonitor_total",
        "Number of IngressMonitors managed by the operator",
        &["namespace"]
    ).unwrap();

    /// IngressMonitor backend syncs attempted
    pub static ref SYNC_TOTAL: GaugeVec = register_gauge_vec!(
        "ingressmonitor_ingressmonitor_sync_total",
        "Number of IngressMonitor syncs with a provider",
        &["namespace"]
    ).unwrap();

    /// IngressMonitor backend syncs that succeeded
    pub static ref SYNC_SUCCESS: GaugeVec = register_gauge_vec!(
        "ingressmonitor_ingressmonitor_success_total",
        "Number of successful IngressMonitor syncs",
        &["namespace"]
    ).unwrap();

    /// IngressMonitor backend syncs that failed
    pub static ref SYNC_FAILED: GaugeVec = register_gauge_vec!(
        "ingressmonitor_ingressmonitor_failed_total",
        "Number of failed IngressMonitor syncs",
        &["namespace"]
    ).unwrap();

    /// Operator health (1 = healthy, 0 = unhealthy)
    pub static ref OPERATOR_HEALTH: prometheus::Gauge = prometheus::register_gauge!(
        "ingress_monitor_operator_health",
        "Operator health status (1 = healthy, 0 = unhealthy)"
    ).unwrap();
}

/// Start the metrics and health HTTP server
pub async fn serve(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    OPERATOR_HEALTH.set(1.0);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(handle_request))
                .await
            {
                error!("Error serving connection: {}", e);
            }
        });
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    Ok(route(req.uri().path()))
}

/// Response for a request path
pub fn route(path: &str) -> Response<Full<Bytes>> {
    match path {
        "/metrics" => metrics_response(),
        "/_healthz" | "/healthz" | "/health" => respond(StatusCode::OK, "OK"),
        "/readyz" | "/ready" => respond(StatusCode::OK, "ok"),
        _ => respond(StatusCode::NOT_FOUND, "Not Found"),
    }
}

fn metrics_response() -> Response<Full<Bytes>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return respond(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics");
    }

    let mut response = Response::new(Full::new(Bytes::from(buffer)));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(prometheus::TEXT_FORMAT));
    response
}

fn respond(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}
