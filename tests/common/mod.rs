//! Shared origins and harness for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, Request},
    response::IntoResponse,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;

use tunnel_orchestrator::{HttpServer, InitialConfig, Orchestrator, Shutdown, Tag};

/// Start an HTTP origin that answers with `name` and echoes the routing
/// headers it received back as `x-origin-saw-*`.
pub async fn start_http_origin(name: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let app = Router::new().fallback(move |request: Request<Body>| async move {
        let mut headers = HeaderMap::new();
        for (key, value) in request.headers() {
            let key = key.as_str();
            if key == "host" || key == "x-request-id" || key.starts_with("x-tunnel-tag-") {
                let echoed = HeaderName::from_bytes(format!("x-origin-saw-{key}").as_bytes()).unwrap();
                headers.insert(echoed, value.clone());
            }
        }
        (headers, name).into_response()
    });

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// Start a TCP origin that echoes every byte back.
pub async fn start_tcp_echo() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut r, mut w) = socket.split();
                let _ = tokio::io::copy(&mut r, &mut w).await;
            });
        }
    });
    addr
}

/// Start a WebSocket origin that echoes text and binary messages.
pub async fn start_ws_echo() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(socket).await else {
                    return;
                };
                while let Some(Ok(msg)) = ws.next().await {
                    if msg.is_text() || msg.is_binary() {
                        if ws.send(msg).await.is_err() {
                            break;
                        }
                    } else if msg.is_close() {
                        break;
                    }
                }
            });
        }
    });
    addr
}

/// A port nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn orchestrator(initial: InitialConfig, tags: Vec<Tag>) -> (Arc<Orchestrator>, Shutdown) {
    let shutdown = Shutdown::new();
    let orchestrator = Orchestrator::new(initial, tags, Vec::new(), shutdown.subscribe()).unwrap();
    (Arc::new(orchestrator), shutdown)
}

/// Serve the orchestrator's HTTP listener on an ephemeral port.
pub async fn serve_http(orchestrator: Arc<Orchestrator>, shutdown: &Shutdown) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let signal = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = HttpServer::new(orchestrator).run(listener, signal).await;
    });
    addr
}

/// Poll `check` until it holds or about two seconds pass.
pub async fn eventually<F, Fut>(check: F) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
