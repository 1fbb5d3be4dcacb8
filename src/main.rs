//! Tunnel orchestrator daemon.
//!
//! ```text
//!   local config file ──watch──┐        PUT /admin/config/{v}
//!                              ▼                 │
//!                     ┌─────────────────┐        │
//!                     │  Orchestrator   │◀───────┘
//!                     │ (generations)   │
//!                     └────────┬────────┘
//!                              │ current_routing_engine()
//!        ┌─────────────────────┼──────────────────────┐
//!        ▼                     ▼                      ▼
//!   HTTP listener        flow listeners          metrics / admin
//!   (proxy_http)          (proxy_tcp)
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::http::StatusCode;
use clap::Parser;
use tokio::net::TcpListener;

use tunnel_orchestrator::admin::{setup_admin_router, AdminState};
use tunnel_orchestrator::config::loader::load_local_config;
use tunnel_orchestrator::config::watcher::ConfigWatcher;
use tunnel_orchestrator::ingress::OriginRequestConfig;
use tunnel_orchestrator::lifecycle::signals::trigger_on_signal;
use tunnel_orchestrator::net::FlowListener;
use tunnel_orchestrator::observability::logging::{self, LogFormat};
use tunnel_orchestrator::observability::metrics;
use tunnel_orchestrator::{HttpServer, InitialConfig, Orchestrator, Rule, Service, Shutdown, Tag};

/// Hostname answered by the daemon itself, ahead of every user rule.
const READY_HOSTNAME: &str = "ready.orchestrator.internal";

#[derive(Parser)]
#[command(name = "tunnel-orchestrator", version)]
#[command(about = "Routes traffic by a hot-swappable, versioned ingress configuration")]
struct Args {
    /// Local configuration file (JSON); watched for changes.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address of the HTTP listener.
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: SocketAddr,

    /// Local override, `key=value`; repeatable, wins over the config file.
    #[arg(long = "flag", value_parser = parse_key_value)]
    flags: Vec<(String, String)>,

    /// Tag added to proxied requests, `name=value`; repeatable.
    #[arg(long = "tag", value_parser = parse_key_value)]
    tags: Vec<(String, String)>,

    /// Forward raw TCP, `listen_addr=dest_host:port`; repeatable.
    #[arg(long = "tcp-forward", value_parser = parse_key_value)]
    tcp_forwards: Vec<(String, String)>,

    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    metrics: Option<SocketAddr>,

    /// Serve the admin API on this address (requires --admin-key).
    #[arg(long)]
    admin_listen: Option<SocketAddr>,

    /// Bearer key for the admin API.
    #[arg(long)]
    admin_key: Option<String>,

    /// Emit logs as JSON.
    #[arg(long)]
    log_json: bool,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))
}

fn internal_rules() -> Vec<Rule> {
    vec![Rule {
        hostname: READY_HOSTNAME.to_string(),
        path: None,
        service: Service::HttpStatus(StatusCode::OK),
        config: OriginRequestConfig::default(),
    }]
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let format = if args.log_json { LogFormat::Json } else { LogFormat::Pretty };
    logging::init("tunnel_orchestrator=info,tower_http=info", format)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "tunnel-orchestrator starting");

    let mut initial = match &args.config {
        Some(path) => InitialConfig::from_local(&load_local_config(path)?)?,
        None => InitialConfig::default(),
    };
    initial.local_overrides.extend(args.flags.iter().cloned());

    if let Some(addr) = args.metrics {
        metrics::init_metrics(addr)?;
    }

    let shutdown = Shutdown::new();
    tokio::spawn(trigger_on_signal(shutdown.clone()));

    let tags = args.tags.iter().map(|(k, v)| Tag::new(k, v)).collect();
    let orchestrator = Arc::new(Orchestrator::new(initial, tags, internal_rules(), shutdown.subscribe())?);

    // Kept alive for the lifetime of the process.
    let _watcher = match &args.config {
        Some(path) => Some(watch_config(path.clone(), Arc::clone(&orchestrator))?),
        None => None,
    };

    match (args.admin_listen, &args.admin_key) {
        (Some(addr), Some(key)) => {
            let router = setup_admin_router(AdminState {
                orchestrator: Arc::clone(&orchestrator),
                api_key: key.as_str().into(),
            });
            let listener = TcpListener::bind(addr).await?;
            tracing::info!(address = %addr, "Admin API listening");
            let mut signal = shutdown.subscribe();
            tokio::spawn(async move {
                let served = axum::serve(listener, router)
                    .with_graceful_shutdown(async move { signal.recv().await })
                    .await;
                if let Err(e) = served {
                    tracing::error!(error = %e, "Admin API failed");
                }
            });
        }
        (Some(_), None) => tracing::warn!("--admin-listen given without --admin-key; admin API disabled"),
        _ => {}
    }

    for (listen, dest) in &args.tcp_forwards {
        let addr: SocketAddr = listen.parse()?;
        let listener = FlowListener::bind(addr, dest, Arc::clone(&orchestrator)).await?;
        tokio::spawn(listener.run(shutdown.subscribe()));
    }

    let listener = TcpListener::bind(args.listen).await?;
    HttpServer::new(Arc::clone(&orchestrator))
        .run(listener, shutdown.subscribe())
        .await?;

    orchestrator.shutdown();
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Submit every readable change of `path` as the next version.
fn watch_config(path: PathBuf, orchestrator: Arc<Orchestrator>) -> Result<notify::RecommendedWatcher, notify::Error> {
    let (watcher, mut updates) = ConfigWatcher::new(&path);
    let watcher = watcher.run()?;

    tokio::spawn(async move {
        let mut next_version = orchestrator.current_version().saturating_add(1);
        while let Some(remote) = updates.recv().await {
            let payload = match serde_json::to_vec(&remote) {
                Ok(p) => p,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode reloaded configuration");
                    continue;
                }
            };

            let outcome = orchestrator.update_config(next_version, &payload);
            match outcome.result {
                Ok(()) => next_version = outcome.last_applied_version.saturating_add(1),
                Err(e) => tracing::error!(error = %e, "Reloaded configuration rejected"),
            }
        }
    });

    Ok(watcher)
}
