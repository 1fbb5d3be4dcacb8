//! Proxy builder: materializes a [`Proxy`] from a [`RuntimeConfig`].

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::http::uri::{Authority, Scheme};
use axum::http::{HeaderName, HeaderValue};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::{TokioExecutor, TokioTimer};
use thiserror::Error;
use tokio::sync::Semaphore;
use url::Url;

use crate::ingress::{OriginRequestConfig, Service};
use crate::orchestration::RuntimeConfig;
use crate::proxy::responder::HelloWorldResponder;
use crate::proxy::{OriginClient, Proxy, ReleaseHandle, Tag, Target};

const TAG_HEADER_PREFIX: &str = "x-tunnel-tag-";

/// Error type for proxy construction.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("building a routing engine requires a Tokio runtime")]
    NoRuntime,

    #[error("tag {name:?} cannot be sent as a header")]
    InvalidTag { name: String },

    #[error("rule #{rule}: origin {url} has no usable authority")]
    InvalidOrigin { rule: usize, url: String },

    #[error("rule #{rule}: failed to read caPool {path:?}: {source}")]
    CaPool {
        rule: usize,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("rule #{rule}: caPool {path:?} contains no certificates")]
    EmptyCaPool { rule: usize, path: PathBuf },

    #[error("failed to start hello world responder: {0}")]
    Responder(#[source] std::io::Error),
}

/// Builds routing engines. Holds only construction-time, immutable inputs.
#[derive(Debug, Clone)]
pub struct ProxyBuilder {
    tag_headers: Arc<[(HeaderName, HeaderValue)]>,
}

impl ProxyBuilder {
    /// Validate `tags` once; every engine built afterwards reuses them.
    pub fn new(tags: &[Tag]) -> Result<Self, BuildError> {
        let tag_headers = tags
            .iter()
            .map(|tag| {
                let name = format!("{TAG_HEADER_PREFIX}{}", tag.name.to_ascii_lowercase());
                let name = HeaderName::from_bytes(name.as_bytes());
                let value = HeaderValue::from_str(&tag.value);
                match (name, value) {
                    (Ok(n), Ok(v)) => Ok((n, v)),
                    _ => Err(BuildError::InvalidTag {
                        name: tag.name.clone(),
                    }),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            tag_headers: tag_headers.into(),
        })
    }

    /// Build the engine for `config` and the handle that releases what it owns.
    ///
    /// On error nothing keeps running.
    pub fn build(&self, config: Arc<RuntimeConfig>) -> Result<(Proxy, ReleaseHandle), BuildError> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(BuildError::NoRuntime);
        }

        let release = ReleaseHandle::new();
        match self.build_targets(&config, &release) {
            Ok((targets, responder)) => {
                let flows = match config.warp_routing.max_active_flows {
                    0 => None,
                    limit => Some(Arc::new(Semaphore::new(
                        usize::try_from(limit).unwrap_or(Semaphore::MAX_PERMITS).min(Semaphore::MAX_PERMITS),
                    ))),
                };

                let proxy = Proxy {
                    config,
                    targets,
                    tag_headers: Arc::clone(&self.tag_headers),
                    flows,
                    responder: responder.map(|r| r.addr()),
                };
                Ok((proxy, release))
            }
            Err(e) => {
                release.release();
                Err(e)
            }
        }
    }

    fn build_targets(
        &self,
        config: &RuntimeConfig,
        release: &ReleaseHandle,
    ) -> Result<(Vec<Target>, Option<HelloWorldResponder>), BuildError> {
        let mut responder: Option<HelloWorldResponder> = None;
        let mut targets = Vec::with_capacity(config.ingress.rules().len());

        for (i, rule) in config.ingress.rules().iter().enumerate() {
            let number = i + 1;
            let target = match &rule.service {
                Service::HttpStatus(code) => Target::Status(*code),
                Service::Origin(url) => {
                    if let Some(path) = &rule.config.ca_pool {
                        check_ca_pool(number, path)?;
                    }
                    let (scheme, authority) = origin_authority(number, url)?;
                    Target::Origin {
                        scheme,
                        authority,
                        client: origin_client(&rule.config),
                    }
                }
                Service::HelloWorld => {
                    let running = match responder {
                        Some(r) => r,
                        None => {
                            let r = HelloWorldResponder::spawn(release.subscribe()).map_err(BuildError::Responder)?;
                            responder = Some(r);
                            r
                        }
                    };
                    let authority = running.addr().to_string().parse::<Authority>().map_err(|_| {
                        BuildError::InvalidOrigin {
                            rule: number,
                            url: running.addr().to_string(),
                        }
                    })?;
                    Target::Responder {
                        authority,
                        client: responder_client(),
                    }
                }
            };
            targets.push(target);
        }

        Ok((targets, responder))
    }
}

/// Client tuned from a rule's resolved origin settings.
fn origin_client(config: &OriginRequestConfig) -> OriginClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(config.connect_timeout));
    connector.set_keepalive((!config.tcp_keep_alive.is_zero()).then_some(config.tcp_keep_alive));
    connector.set_nodelay(true);
    if config.no_happy_eyeballs {
        connector.set_happy_eyeballs_timeout(None);
    }

    Client::builder(TokioExecutor::new())
        .pool_timer(TokioTimer::new())
        .pool_idle_timeout(config.keep_alive_timeout)
        .pool_max_idle_per_host(config.keep_alive_connections)
        .http2_only(config.http2_origin)
        .build(connector)
}

/// Responder connections are never pooled, so a released responder is not
/// reachable through a lingering idle connection.
fn responder_client() -> OriginClient {
    let mut connector = HttpConnector::new();
    connector.set_nodelay(true);
    Client::builder(TokioExecutor::new())
        .pool_max_idle_per_host(0)
        .build(connector)
}

fn origin_authority(rule: usize, url: &Url) -> Result<(Scheme, Authority), BuildError> {
    let invalid = || BuildError::InvalidOrigin {
        rule,
        url: url.to_string(),
    };

    let scheme = match url.scheme() {
        "https" | "wss" => Scheme::HTTPS,
        _ => Scheme::HTTP,
    };
    let host = url.host_str().ok_or_else(invalid)?;
    let port = url.port_or_known_default().ok_or_else(invalid)?;
    let authority = format!("{host}:{port}").parse::<Authority>().map_err(|_| invalid())?;
    Ok((scheme, authority))
}

fn check_ca_pool(rule: usize, path: &Path) -> Result<(), BuildError> {
    let file = File::open(path).map_err(|source| BuildError::CaPool {
        rule,
        path: path.to_path_buf(),
        source,
    })?;

    let mut reader = BufReader::new(file);
    let mut count = 0usize;
    for cert in rustls_pemfile::certs(&mut reader) {
        cert.map_err(|source| BuildError::CaPool {
            rule,
            path: path.to_path_buf(),
            source,
        })?;
        count += 1;
    }

    if count == 0 {
        return Err(BuildError::EmptyCaPool {
            rule,
            path: path.to_path_buf(),
        });
    }
    Ok(())
}
