use axum::Router;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use couchspawn_server::{ServerState, router};

/// Standalone CouchDB-compatible emulator backed by in-memory databases.
#[derive(Parser)]
#[command(name = "couchspawn-server", version)]
struct Args {
    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = 5984)]
    port: u16,

    /// Mount the API under a path prefix, e.g. `/db`.
    #[arg(long)]
    prefix: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let api = router(ServerState::new());
    let app = match args.prefix.as_deref().map(|p| p.trim_end_matches('/')) {
        Some(prefix) if !prefix.is_empty() => {
            let prefix = if prefix.starts_with('/') {
                prefix.to_string()
            } else {
                format!("/{prefix}")
            };
            Router::new().nest(&prefix, api)
        }
        _ => api,
    };

    let addr = format!("{}:{}", args.host, args.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };

    tracing::info!(
        addr = %addr,
        prefix = args.prefix.as_deref().unwrap_or("/"),
        "couchspawn-server listening"
    );

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await
    {
        tracing::error!(error = %e, "server error");
        std::process::exit(1);
    }
}
