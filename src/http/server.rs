//! Eyeball-facing HTTP server.
//!
//! # Responsibilities
//! - Accept HTTP/1.1 and HTTP/2 connections (upgrades included)
//! - Hand every request to the routing engine current at arrival time
//! - Map routing errors to `502 Bad Gateway`

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::lifecycle::ShutdownSignal;
use crate::orchestration::Orchestrator;

/// HTTP server dispatching to the orchestrator's current routing engine.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            router: Self::build_router(orchestrator),
        }
    }

    fn build_router(orchestrator: Arc<Orchestrator>) -> Router {
        Router::new()
            .fallback(proxy_handler)
            .with_state(orchestrator)
            .layer(TraceLayer::new_for_http())
    }

    /// The router, for serving on a custom listener or for tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: ShutdownSignal) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.recv().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Route one request through the engine current at arrival.
async fn proxy_handler(State(orchestrator): State<Arc<Orchestrator>>, request: Request<Body>) -> Response {
    let engine = orchestrator.current_routing_engine();
    match engine.proxy_http(request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(error = %e, "Proxy error");
            (StatusCode::BAD_GATEWAY, "Bad Gateway").into_response()
        }
    }
}
