mod routes;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use parley_core::config::ParleyConfig;
use parley_core::relay::ActiveSessions;
use parley_core::responder::{EchoResponder, Responder};
use parley_core::storage::{self, Store};

pub struct AppState {
    pub store: Store,
    pub responder: Box<dyn Responder>,
    pub active: ActiveSessions,
}

impl AppState {
    pub fn new(store: Store, responder: impl Responder + 'static) -> Self {
        Self {
            store,
            responder: Box::new(responder),
            active: ActiveSessions::new(),
        }
    }
}

/// WebSocket relay that logs every exchanged message per session.
#[derive(Parser, Debug)]
#[command(name = "parley-web", version, about)]
struct Args {
    /// Address to bind (overrides web.host)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides web.port)
    #[arg(long)]
    port: Option<u16>,

    /// Directory containing a .parley/ config folder
    #[arg(long)]
    project_dir: Option<PathBuf>,

    /// Storage backend: postgrest, sqlite, or memory (overrides storage.backend)
    #[arg(long)]
    backend: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("parley_web=info,parley_core=info")),
        )
        .init();

    let args = Args::parse();

    let project_dir = args
        .project_dir
        .clone()
        .or_else(|| std::env::current_dir().ok());
    if let Some(path) = parley_core::config::load_env_file(project_dir.as_deref()) {
        tracing::info!("loaded environment from {}", path.display());
    }

    let mut config = ParleyConfig::load(project_dir.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("failed to load config, using defaults: {e}");
        let mut config = ParleyConfig::default_config();
        config.apply_env_fallbacks(|name| std::env::var(name).ok());
        config
    });

    if let Some(host) = args.host {
        config.web.host = host;
    }
    if let Some(port) = args.port {
        config.web.port = port;
    }
    if let Some(backend) = args.backend {
        config.storage.backend = backend;
        config.validate();
    }

    let store = storage::create_backend(&config)
        .with_context(|| format!("failed to open {} store", config.storage.backend))?;
    tracing::info!(backend = store.kind(), "store ready");

    let state = Arc::new(AppState::new(store, EchoResponder));

    let app = routes::router()
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive());

    let addr = format!("{}:{}", config.web.host, config.web.port);
    tracing::info!("parley-web listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
