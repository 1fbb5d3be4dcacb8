//! TCP listener that forwards every accepted connection to a fixed
//! destination through the current routing engine.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::lifecycle::ShutdownSignal;
use crate::orchestration::Orchestrator;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Accept loop for warp routing flows.
pub struct FlowListener {
    inner: TcpListener,
    dest: Arc<str>,
    orchestrator: Arc<Orchestrator>,
}

impl FlowListener {
    pub async fn bind(addr: SocketAddr, dest: &str, orchestrator: Arc<Orchestrator>) -> Result<Self, ListenerError> {
        let inner = TcpListener::bind(addr)
            .await
            .map_err(|source| ListenerError::Bind { addr, source })?;

        let local_addr = inner.local_addr().unwrap_or(addr);
        tracing::info!(address = %local_addr, dest = %dest, "Flow listener bound");

        Ok(Self {
            inner,
            dest: dest.into(),
            orchestrator,
        })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    /// Accept until `shutdown` fires. Flows already running are left alone.
    pub async fn run(self, mut shutdown: ShutdownSignal) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                accepted = self.inner.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let engine = self.orchestrator.current_routing_engine();
                        let dest = Arc::clone(&self.dest);
                        tokio::spawn(async move {
                            if let Err(e) = engine.proxy_tcp(stream, &dest).await {
                                tracing::warn!(peer_addr = %peer, dest = %dest, error = %e, "TCP flow failed");
                            }
                        });
                    }
                    Err(e) => tracing::warn!(error = %e, "Failed to accept connection"),
                },
            }
        }
        tracing::info!(dest = %self.dest, "Flow listener stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Shutdown;
    use crate::orchestration::InitialConfig;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn forwards_accepted_connections_to_dest() {
        let echo = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dest = echo.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut socket, _) = echo.accept().await.unwrap();
            let (mut r, mut w) = socket.split();
            let _ = tokio::io::copy(&mut r, &mut w).await;
        });

        let shutdown = Shutdown::new();
        let orchestrator = Arc::new(
            Orchestrator::new(InitialConfig::default(), Vec::new(), Vec::new(), shutdown.subscribe()).unwrap(),
        );
        let listener = FlowListener::bind("127.0.0.1:0".parse().unwrap(), &dest, orchestrator)
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(listener.run(shutdown.subscribe()));

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"flow").await.unwrap();
        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"flow");
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();
        let shutdown = Shutdown::new();
        let orchestrator = Arc::new(
            Orchestrator::new(InitialConfig::default(), Vec::new(), Vec::new(), shutdown.subscribe()).unwrap(),
        );

        let err = FlowListener::bind(addr, "127.0.0.1:9", orchestrator).await.err().unwrap();
        assert!(matches!(err, ListenerError::Bind { addr: a, .. } if a == addr));
    }
}
