//! Health check HTTP server for Kubernetes probes.
//!
//! Provides `/healthz` (liveness) and `/readyz` (readiness) endpoints.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::client::ClientAccessor;

pub const DEFAULT_HEALTH_PORT: u16 = 8081;

/// Shared state for health check endpoints.
pub struct HealthState {
    started: AtomicBool,
    /// Used to probe the provisioning backend.
    accessor: Arc<dyn ClientAccessor>,
}

impl HealthState {
    pub fn new(accessor: Arc<dyn ClientAccessor>) -> Self {
        Self {
            started: AtomicBool::new(false),
            accessor,
        }
    }

    pub fn mark_started(&self) {
        self.started.store(true, Ordering::SeqCst);
        info!("Health check: operator marked as started");
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

/// Port from `HEALTH_PORT`, falling back to [`DEFAULT_HEALTH_PORT`].
pub fn port_from_env() -> u16 {
    match std::env::var("HEALTH_PORT") {
        Ok(v) => v.parse().unwrap_or_else(|e| {
            warn!(value = %v, error = %e, "Invalid HEALTH_PORT, using default");
            DEFAULT_HEALTH_PORT
        }),
        Err(_) => DEFAULT_HEALTH_PORT,
    }
}

/// Run the health check HTTP server.
///
/// The operator is marked as started only once the listener is bound.
pub async fn run_health_server(state: Arc<HealthState>, port: u16) -> std::io::Result<()> {
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(state.clone());

    // Probes come from the kubelet inside the pod network namespace
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(addr).await?;

    info!(port = port, "Health check server listening");
    state.mark_started();

    axum::serve(listener, app).await
}

async fn healthz() -> StatusCode {
    debug!("Liveness probe: OK");
    StatusCode::OK
}

/// 200 once started and the provisioning backend answers, 503 otherwise.
async fn readyz(State(state): State<Arc<HealthState>>) -> StatusCode {
    if !state.is_started() {
        debug!("Readiness probe: NOT READY (startup incomplete)");
        return StatusCode::SERVICE_UNAVAILABLE;
    }

    match state.accessor.check_readiness().await {
        Ok(true) => {
            debug!("Readiness probe: OK");
            StatusCode::OK
        }
        Ok(false) => {
            debug!("Readiness probe: NOT READY (backend not ready)");
            StatusCode::SERVICE_UNAVAILABLE
        }
        Err(e) => {
            warn!(error = %e, "Readiness probe: NOT READY (backend unreachable)");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ApiError, MockClientAccessor};
    use serial_test::serial;

    fn state(accessor: MockClientAccessor) -> Arc<HealthState> {
        Arc::new(HealthState::new(Arc::new(accessor)))
    }

    #[tokio::test]
    async fn test_healthz_returns_ok() {
        assert_eq!(healthz().await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_readyz_returns_unavailable_before_startup() {
        let mut accessor = MockClientAccessor::new();
        accessor.expect_check_readiness().never();

        let result = readyz(State(state(accessor))).await;
        assert_eq!(result, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_readyz_returns_ok_when_backend_answers() {
        let mut accessor = MockClientAccessor::new();
        accessor.expect_check_readiness().returning(|| Ok(true));

        let state = state(accessor);
        state.mark_started();

        assert_eq!(readyz(State(state)).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_readyz_returns_unavailable_when_backend_unreachable() {
        let mut accessor = MockClientAccessor::new();
        accessor
            .expect_check_readiness()
            .returning(|| Err(ApiError::Other("secret garden-kubeconfig not found".to_string())));

        let state = state(accessor);
        state.mark_started();

        assert_eq!(readyz(State(state)).await, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    #[serial]
    fn test_port_from_env() {
        std::env::remove_var("HEALTH_PORT");
        assert_eq!(port_from_env(), DEFAULT_HEALTH_PORT);

        std::env::set_var("HEALTH_PORT", "9090");
        assert_eq!(port_from_env(), 9090);

        std::env::set_var("HEALTH_PORT", "not-a-port");
        assert_eq!(port_from_env(), DEFAULT_HEALTH_PORT);

        std::env::remove_var("HEALTH_PORT");
    }
}
