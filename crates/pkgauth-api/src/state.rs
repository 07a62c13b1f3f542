//! Application state

use metrics_exporter_prometheus::PrometheusHandle;
use pkgauth_core::AuthPlugin;
use std::sync::Arc;

/// Handle used to render the Prometheus exposition format
pub type MetricsHandle = PrometheusHandle;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub plugin: Arc<AuthPlugin>,
}

impl AppState {
    pub fn new(plugin: Arc<AuthPlugin>) -> Self {
        Self { plugin }
    }
}
