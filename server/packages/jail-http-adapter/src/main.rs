use std::time::Duration;

use clap::Parser;
use jail::JailConfig;
use jail_http_adapter::{run_server, ServerConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "jail-http-adapter")]
#[command(about = "Serve script cells bridged to a JSON-RPC node over HTTP", version)]
struct Cli {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 7592)]
    port: u16,

    /// JSON-RPC endpoint of the node.
    #[arg(long, default_value = "http://127.0.0.1:8545")]
    rpc_url: String,

    /// File evaluated first in every cell.
    #[arg(long)]
    base_script: Option<String>,

    /// Web3 client library evaluated after the bridge is bound.
    #[arg(long)]
    web3_library: Option<String>,

    #[arg(long)]
    gate_timeout_ms: Option<u64>,

    #[arg(long)]
    rpc_timeout_ms: Option<u64>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        tracing::error!(error = %err, "jail-http-adapter failed");
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_logfmt::builder()
                .layer()
                .with_writer(std::io::stderr),
        )
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_logging();

    let cli = Cli::parse();
    let base_script = match &cli.base_script {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|err| format!("failed to read base script {path}: {err}"))?,
        None => String::new(),
    };

    let mut jail = JailConfig::default();
    if let Some(path) = &cli.web3_library {
        let library = std::fs::read_to_string(path)
            .map_err(|err| format!("failed to read web3 library {path}: {err}"))?;
        jail = jail.with_web3_library(library);
    }
    if let Some(ms) = cli.gate_timeout_ms {
        jail = jail.with_gate_timeout(Duration::from_millis(ms));
    }
    if let Some(ms) = cli.rpc_timeout_ms {
        jail = jail.with_rpc_timeout(Duration::from_millis(ms));
    }

    run_server(ServerConfig {
        host: cli.host,
        port: cli.port,
        rpc_url: cli.rpc_url,
        base_script,
        jail,
    })
    .await
}
