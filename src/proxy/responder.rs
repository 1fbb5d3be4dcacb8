//! Embedded hello-world responder.
//!
//! A tiny axum server on an ephemeral loopback port, owned by exactly one
//! generation. It stops accepting when that generation's release handle
//! fires.

use std::net::{Ipv4Addr, SocketAddr};

use axum::{
    body::Body,
    http::{header, Request},
    response::IntoResponse,
    Router,
};
use tokio::net::TcpListener;

use crate::lifecycle::ShutdownSignal;

/// Body prefix of every hello-world response.
pub const GREETING: &str = "Hello world from tunnel-orchestrator";

/// Running responder bound to a loopback address.
#[derive(Debug, Clone, Copy)]
pub struct HelloWorldResponder {
    addr: SocketAddr,
}

impl HelloWorldResponder {
    /// Bind a loopback port and serve until `release` fires.
    ///
    /// Binding happens synchronously so a failure surfaces as a build error.
    pub fn spawn(mut release: ShutdownSignal) -> Result<Self, std::io::Error> {
        let std_listener = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
        std_listener.set_nonblocking(true)?;
        let addr = std_listener.local_addr()?;
        let listener = TcpListener::from_std(std_listener)?;

        let app = Router::new().fallback(hello);

        tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { release.recv().await })
                .await;
            match served {
                Ok(()) => tracing::debug!(address = %addr, "Hello world responder stopped"),
                Err(e) => tracing::warn!(address = %addr, error = %e, "Hello world responder failed"),
            }
        });

        tracing::debug!(address = %addr, "Hello world responder listening");
        Ok(Self { addr })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

async fn hello(request: Request<Body>) -> impl IntoResponse {
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        format!(
            "{GREETING}\n{} {} (host: {host})\n",
            request.method(),
            request.uri().path()
        ),
    )
}
