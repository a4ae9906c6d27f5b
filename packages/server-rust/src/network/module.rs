//! Network module with deferred startup lifecycle.
//!
//! `new()` creates the shared state, `start()` binds the TCP listener, and
//! `serve()` accepts connections until shutdown. Binding before serving lets
//! the caller learn the OS-assigned port (tests bind port 0).

use std::future::Future;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::handlers::{
    create_foo, delete_foo, health_handler, liveness_handler, metrics_handler, read_foo,
    readiness_handler, update_foo, AppState,
};
use super::middleware::{build_pipeline, AllowAll, Authenticator, InFlightLayer};
use super::shutdown::ShutdownController;
use crate::telemetry::SharedMetrics;
use crate::traits::FooService;

/// Assembles the axum router.
///
/// Routes behind the request pipeline:
/// - `POST /v1/foos`
/// - `GET | PATCH | DELETE /v1/foos/{id}`
///
/// Operational routes, no auth:
/// - `GET /health`, `/health/live`, `/health/ready`
/// - `GET /metrics`
pub fn build_router(
    state: AppState,
    authenticator: Arc<dyn Authenticator>,
    config: &NetworkConfig,
) -> Router {
    let pipeline = build_pipeline(authenticator, state.metrics.clone(), config.request_timeout);

    let api = Router::new()
        .route("/v1/foos", post(create_foo))
        .route(
            "/v1/foos/{id}",
            get(read_foo).patch(update_foo).delete(delete_foo),
        )
        .layer(pipeline)
        .layer(TraceLayer::new_for_http());

    let ops = Router::new()
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .route("/metrics", get(metrics_handler));

    api.merge(ops)
        .layer(InFlightLayer::new(Arc::clone(&state.shutdown)))
        .with_state(state)
}

/// Manages the HTTP server lifecycle.
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    state: AppState,
    authenticator: Arc<dyn Authenticator>,
}

impl NetworkModule {
    /// Creates the module without binding any port. Auth defaults to [`AllowAll`].
    #[must_use]
    pub fn new(config: NetworkConfig, svc: Arc<dyn FooService>, metrics: SharedMetrics) -> Self {
        Self {
            config,
            listener: None,
            state: AppState::new(svc, metrics),
            authenticator: Arc::new(AllowAll),
        }
    }

    #[must_use]
    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    /// Shared handle for health checks and triggering shutdown from outside.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.state.shutdown)
    }

    #[must_use]
    pub fn build_router(&self) -> Router {
        build_router(
            self.state.clone(),
            Arc::clone(&self.authenticator),
            &self.config,
        )
    }

    /// Binds the TCP listener and returns the bound port.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let listener = TcpListener::bind(self.config.addr()).await?;
        let port = listener.local_addr()?.port();
        info!(host = %self.config.host, port, "TCP listener bound");

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves until `shutdown` resolves or the controller is triggered, then
    /// waits up to the drain timeout for in-flight requests.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first or the server hits
    /// a fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;

        let router = self.build_router();
        let ctrl = self.shutdown_controller();
        let signal = ctrl.shutdown_signal();
        let trigger = Arc::clone(&ctrl);

        ctrl.set_ready();
        info!("serving HTTP");

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    () = shutdown => {}
                    () = signal => {}
                }
                trigger.trigger_shutdown();
                info!("shutdown signal received, draining");
            })
            .await?;

        ctrl.trigger_shutdown();
        if ctrl.wait_for_drain(self.config.drain_timeout).await {
            info!("all in-flight requests drained");
        } else {
            warn!(
                in_flight = ctrl.in_flight_count(),
                "drain timeout expired with requests in flight"
            );
        }
        Ok(())
    }
}
