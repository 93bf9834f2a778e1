//! Relay server lifecycle
//!
//! Builds the HTTP router, binds the listener and runs until a shutdown
//! signal arrives. On shutdown every open socket is told to close and the
//! server waits (bounded) for the registry to empty.

use axum::{
    http::{HeaderValue, Method},
    routing::get,
    Router,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use dialtone_core::{Config, ServerConfig};

use crate::error::{RelayError, Result};
use crate::registry::EndpointRegistry;
use crate::router::Relay;
use crate::ws;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Shared state handed to every request handler
#[derive(Clone)]
pub struct AppState {
    pub relay: Relay,
    pub settings: Arc<ServerConfig>,
    /// Flips to `true` when the server starts shutting down
    pub shutdown: watch::Receiver<bool>,
}

/// Create the relay router
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.settings.cors_origins);

    Router::new()
        .route("/ws", get(ws::websocket_handler))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods([Method::GET, Method::POST]);

    if origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

/// The signaling relay: registry, router and listener settings
pub struct RelayServer {
    settings: Arc<ServerConfig>,
    relay: Relay,
    shutdown_tx: watch::Sender<bool>,
}

impl RelayServer {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let registry = EndpointRegistry::new(config.server.outbound_buffer);
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            settings: Arc::new(config.server.clone()),
            relay: Relay::new(registry, &config.relay),
            shutdown_tx,
        }
    }

    #[must_use]
    pub const fn relay(&self) -> &Relay {
        &self.relay
    }

    #[must_use]
    pub fn router(&self) -> Router {
        create_router(AppState {
            relay: self.relay.clone(),
            settings: Arc::clone(&self.settings),
            shutdown: self.shutdown_tx.subscribe(),
        })
    }

    /// Bind the configured host and port
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = format!("{}:{}", self.settings.host, self.settings.port);
        TcpListener::bind((self.settings.host.as_str(), self.settings.port))
            .await
            .map_err(|source| RelayError::Bind { addr, source })
    }

    /// Bind and serve until Ctrl+C or SIGTERM
    pub async fn run(self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `signal` completes
    pub async fn serve<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener.local_addr()?;
        let router = self.router();
        let Self {
            settings,
            relay,
            shutdown_tx,
        } = self;

        info!("Relay listening on {}", local_addr);

        let graceful = async move {
            signal.await;
            info!("Shutdown signal received, closing endpoints...");
            let _ = shutdown_tx.send(true);
        };

        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(graceful)
            .await
        {
            error!("HTTP server error: {}", e);
            return Err(RelayError::Serve(e));
        }

        drain(&relay, settings.drain_timeout()).await;
        info!("Relay shut down complete");
        Ok(())
    }
}

/// Wait for active connections to close, up to `timeout`
async fn drain(relay: &Relay, timeout: Duration) {
    let active = relay.registry().connection_count();
    if active == 0 {
        return;
    }

    info!(
        "Waiting up to {}s for {} active connection(s) to drain...",
        timeout.as_secs(),
        active
    );
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remaining = relay.registry().connection_count();
        if remaining == 0 {
            info!("All connections drained");
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            warn!(
                "Drain timeout reached with {} connection(s) still active, proceeding with shutdown",
                remaining
            );
            break;
        }
        tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
    }
}

/// Wait for Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C"); }
        () = terminate => { info!("Received SIGTERM"); }
    }
}
