use anyhow::{Context, Result};
use tokio::net::TcpListener;

use record_cluster::api::handlers::AppContext;
use record_cluster::api::routes;
use record_cluster::cluster::dispatcher::StoreClient;
use record_cluster::cluster::{primary, worker};
use record_cluster::config::{Config, Role};
use record_cluster::store::records::RecordStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Stdout is the IPC channel in worker mode; all diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env()?;
    match config.role() {
        Role::Worker(assigned) => worker::run(assigned).await,
        Role::Primary => primary::run(&config).await,
        Role::Single => serve_single(config.public_port).await,
    }
}

/// Single-process mode: the same HTTP app talking to a local dispatcher task
/// instead of a remote primary.
async fn serve_single(port: u16) -> Result<()> {
    let ctx = AppContext {
        client: StoreClient::local(RecordStore::new()),
        worker: None,
    };
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind port {port} (already in use?)"))?;
    tracing::info!(
        "Server is running on port {port} (pid {})",
        std::process::id()
    );
    axum::serve(listener, routes::router(ctx))
        .await
        .context("http server failed")?;
    Ok(())
}
