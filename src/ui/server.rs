//! Control server

use axum::{routing::get, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::config::ControlConfig;
use crate::control::Dispatcher;
use crate::error::{Error, NetworkError, Result};
use crate::network::bind_control_listener;
use crate::ui::{handlers, websocket};

/// Shared application state
pub struct AppState {
    pub dispatcher: Dispatcher,
}

/// Routes: the duplex endpoint at `path` and the read-only HTTP API
pub fn router(state: Arc<AppState>, path: &str) -> Router {
    Router::new()
        .route(path, get(websocket::ws_handler))
        .route("/api/status", get(handlers::get_status))
        .route("/api/peers", get(handlers::get_peers))
        .route("/api/devices", get(handlers::get_devices))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Control server
pub struct WebServer {
    config: ControlConfig,
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(config: ControlConfig, dispatcher: Dispatcher) -> Self {
        Self {
            config,
            state: Arc::new(AppState { dispatcher }),
        }
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let addr = format!("{}:{}", self.config.bind_address, self.config.port);
        addr.parse()
            .map_err(|e| Error::Config(format!("Invalid bind address {}: {}", addr, e)))
    }

    /// Bind the listening socket. Failing here is the one fatal startup error.
    pub fn bind(&self) -> Result<TcpListener> {
        let listener = bind_control_listener(self.bind_addr()?)?;
        Ok(listener)
    }

    /// Serve until `shutdown` resolves
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local = listener
            .local_addr()
            .map_err(|e| NetworkError::BindFailed(e.to_string()))?;
        tracing::info!("Control server listening on ws://{}{}", local, self.config.path);

        let app = router(self.state.clone(), &self.config.path);
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown)
            .await?;

        self.state.dispatcher.session().close_all();
        tracing::info!("Control server stopped");
        Ok(())
    }
}
