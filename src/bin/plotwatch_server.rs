use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use plotwatch::auth;
use plotwatch::config::ServerArgs;
use plotwatch::server::{create_router, AppState};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = ServerArgs::parse();

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(args.request_timeout_secs))
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {e}"))?;

    info!("Authenticating with the imagery service");
    let endpoint = auth::bootstrap(&http)
        .await
        .map_err(|e| anyhow::anyhow!("Credential bootstrap failed: {e}"))?;
    info!("Authenticated for project {}", endpoint.project());

    let state = Arc::new(AppState { ee: endpoint });
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", args.bind_address, args.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address: {e}"))?;

    info!("Starting server on http://{}", addr);
    info!("Change detection endpoint: http://{}/detect-change", addr);
    info!("Health check: http://{}/health-check", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {e}"))?;

    Ok(())
}
