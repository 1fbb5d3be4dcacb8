//! Warp routing: raw TCP flow forwarding.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::OwnedSemaphorePermit;

use crate::ingress::WarpRoutingConfig;
use crate::proxy::{Proxy, ProxyError};

impl Proxy {
    /// Forward a raw stream to `dest` (`host:port`) until either side closes.
    ///
    /// Returns the bytes copied `(to_dest, from_dest)`. Once dialed, the flow
    /// only depends on its own sockets, not on this engine.
    pub async fn proxy_tcp<S>(&self, mut stream: S, dest: &str) -> Result<(u64, u64), ProxyError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let _permit = self.admit_flow()?;
        let mut origin = dial(dest, &self.config.warp_routing).await?;

        tracing::debug!(dest = %dest, "TCP flow established");
        let copied = tokio::io::copy_bidirectional(&mut stream, &mut origin).await?;
        tracing::debug!(dest = %dest, bytes_up = copied.0, bytes_down = copied.1, "TCP flow closed");
        Ok(copied)
    }

    fn admit_flow(&self) -> Result<Option<OwnedSemaphorePermit>, ProxyError> {
        match &self.flows {
            None => Ok(None),
            Some(flows) => Arc::clone(flows)
                .try_acquire_owned()
                .map(Some)
                .map_err(|_| ProxyError::FlowLimitReached {
                    limit: self.config.warp_routing.max_active_flows,
                }),
        }
    }
}

/// Dial `dest` with the warp routing timeout, trying each resolved address.
async fn dial(dest: &str, config: &WarpRoutingConfig) -> Result<TcpStream, ProxyError> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host(dest)
        .await
        .map_err(|source| ProxyError::Dial {
            dest: dest.to_string(),
            source,
        })?
        .collect();

    let mut last_err = None;
    for addr in addrs {
        match tokio::time::timeout(config.connect_timeout, connect(addr, config)).await {
            Ok(Ok(stream)) => return Ok(stream),
            Ok(Err(source)) => {
                last_err = Some(ProxyError::Dial {
                    dest: dest.to_string(),
                    source,
                })
            }
            Err(_) => {
                last_err = Some(ProxyError::DialTimeout {
                    dest: dest.to_string(),
                })
            }
        }
    }

    Err(last_err.unwrap_or_else(|| ProxyError::Unresolvable {
        dest: dest.to_string(),
    }))
}

async fn connect(addr: SocketAddr, config: &WarpRoutingConfig) -> std::io::Result<TcpStream> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_keepalive(!config.tcp_keep_alive.is_zero())?;
    let stream = socket.connect(addr).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingress::{Ingress, OriginRequestConfig, Rule, Service};
    use crate::orchestration::RuntimeConfig;
    use crate::proxy::ProxyBuilder;
    use axum::http::StatusCode;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn proxy(max_active_flows: u64) -> Proxy {
        let config = Arc::new(RuntimeConfig {
            ingress: Ingress::new(
                vec![Rule::catch_all(
                    Service::HttpStatus(StatusCode::NOT_FOUND),
                    OriginRequestConfig::default(),
                )],
                OriginRequestConfig::default(),
            ),
            warp_routing: WarpRoutingConfig {
                max_active_flows,
                connect_timeout: Duration::from_secs(1),
                ..Default::default()
            },
        });
        ProxyBuilder::new(&[]).unwrap().build(config).unwrap().0
    }

    async fn echo_server() -> SocketAddr {
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

    #[tokio::test]
    async fn forwards_bytes_both_ways() {
        let proxy = Arc::new(proxy(0));
        let origin = echo_server().await;

        let (mut client, server_side) = tokio::io::duplex(1024);
        let flow = tokio::spawn({
            let proxy = Arc::clone(&proxy);
            async move { proxy.proxy_tcp(server_side, &origin.to_string()).await }
        });

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        drop(client);
        let (up, down) = flow.await.unwrap().unwrap();
        assert_eq!((up, down), (4, 4));
    }

    #[tokio::test]
    async fn flow_limit_rejects_excess_flows() {
        let proxy = Arc::new(proxy(1));
        let origin = echo_server().await;

        let (_client, server_side) = tokio::io::duplex(64);
        let held = tokio::spawn({
            let proxy = Arc::clone(&proxy);
            async move { proxy.proxy_tcp(server_side, &origin.to_string()).await }
        });

        for _ in 0..50 {
            if proxy.active_flows() == Some(1) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(proxy.active_flows(), Some(1));

        let (_other, other_side) = tokio::io::duplex(64);
        let err = proxy.proxy_tcp(other_side, &origin.to_string()).await.unwrap_err();
        assert!(matches!(err, ProxyError::FlowLimitReached { limit: 1 }));

        held.abort();
    }

    #[tokio::test]
    async fn dial_failure_is_reported() {
        let proxy = proxy(0);
        // Bind then drop to get a port nothing listens on.
        let addr = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap()
        };
        let (_client, server_side) = tokio::io::duplex(64);
        let err = proxy.proxy_tcp(server_side, &addr.to_string()).await.unwrap_err();
        assert!(matches!(err, ProxyError::Dial { .. } | ProxyError::DialTimeout { .. }));
    }
}
