//! `HostServer`: the Axum HTTP server whose upgrade requests the firehose shares.
//!
//! Plain requests are routed normally (`/health`, `/metrics`). Any request
//! asking for a protocol upgrade is diverted before routing to the shared
//! [`UpgradeListeners`], where the [`UpgradeMux`] (once installed) claims the
//! firehose path.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use firehose_core::Result;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::firehose::Firehose;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::upgrade::{MuxOptions, UpgradeListeners, UpgradeMux};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
struct AppState {
    firehose: Arc<Firehose>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

/// Host HTTP server.
pub struct HostServer {
    config: ServerConfig,
    firehose: Arc<Firehose>,
    upgrades: UpgradeListeners,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl HostServer {
    /// Create a server. `metrics` enables `/metrics` when a recorder is installed.
    pub fn new(
        config: ServerConfig,
        firehose: Arc<Firehose>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            config,
            firehose,
            upgrades: UpgradeListeners::new(),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics,
            start_time: Instant::now(),
        }
    }

    /// The shared upgrade listener list.
    pub fn upgrades(&self) -> &UpgradeListeners {
        &self.upgrades
    }

    /// Attach the firehose to this server's upgrade listeners.
    ///
    /// Listeners registered before this call become the fallback for
    /// non-firehose paths.
    pub fn install_firehose(&self) -> Arc<UpgradeMux> {
        UpgradeMux::install(
            &self.upgrades,
            Arc::clone(&self.firehose),
            MuxOptions::from(&self.config),
        )
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            firehose: Arc::clone(&self.firehose),
            metrics: self.metrics.clone(),
            start_time: self.start_time,
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .fallback(not_found)
            .with_state(state)
            .layer(middleware::from_fn_with_state(
                self.upgrades.clone(),
                divert_upgrades,
            ))
            .layer(TraceLayer::new_for_http())
    }

    /// Bind and serve in the background until shutdown.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let token = self.shutdown.token();

        let handle = tokio::spawn(async move {
            let served = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await;
            if let Err(e) = served {
                error!(error = %e, "host server failed");
            }
        });

        info!(%addr, path = %self.config.upgrade_path, "host server listening");
        Ok((addr, handle))
    }

    /// The dispatcher behind this server.
    pub fn firehose(&self) -> &Arc<Firehose> {
        &self.firehose
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Whether `headers` ask for a protocol upgrade.
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    if !headers.contains_key(header::UPGRADE) {
        return false;
    }
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
}

/// Hand upgrade requests to the listener list instead of the router.
async fn divert_upgrades(
    State(upgrades): State<UpgradeListeners>,
    request: Request,
    next: Next,
) -> Response {
    if is_upgrade_request(request.headers()) {
        return upgrades.emit(request).await;
    }
    next.run(request).await
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.firehose.pool().size(),
        state.firehose.registrations().len(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}
