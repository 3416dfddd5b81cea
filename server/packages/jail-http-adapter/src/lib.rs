use std::net::SocketAddr;
use std::sync::Arc;

use app::build_router;
use jail::{HttpNode, Jail, JailConfig};

pub mod app;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub rpc_url: String,
    pub base_script: String,
    pub jail: JailConfig,
}

pub async fn run_server(
    config: ServerConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let node = Arc::new(HttpNode::new(config.rpc_url)?);
    let jail = jail::global::init(config.base_script, node, config.jail);
    run_server_with_jail(config.host, config.port, jail).await
}

pub async fn run_server_with_jail(
    host: String,
    port: u16,
    jail: Jail,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = build_router(jail);
    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "jail-http-adapter listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutting down");
}
