use crate::config::MetricsConfig;
use std::net::SocketAddr;
use tracing::{info, warn};

pub const REQUESTS_TOTAL: &str = "sale_api_requests_total";
pub const ERRORS_TOTAL: &str = "sale_api_errors_total";

pub fn init_metrics(config: &MetricsConfig) {
    if !config.enabled {
        return;
    }
    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => info!("Prometheus exporter listening on http://{}/metrics", addr),
        Err(e) => warn!("Prometheus exporter install failed (possibly already installed): {}", e),
    }
}

pub fn record_request(resource: &'static str, action: &'static str) {
    metrics::counter!(REQUESTS_TOTAL, "resource" => resource, "action" => action).increment(1);
}

pub fn record_error(resource: &'static str, status: u16) {
    metrics::counter!(ERRORS_TOTAL, "resource" => resource, "status" => status.to_string())
        .increment(1);
}
