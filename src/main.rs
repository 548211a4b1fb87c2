use clap::Parser;
use tracing_subscriber::EnvFilter;

use fleetrun::config::{OrchestratorConfig, DEFAULT_POOL_SPEC};
use fleetrun::server::Server;

#[derive(Parser, Debug)]
#[command(name = "fleetrun")]
#[command(about = "A job orchestrator for mobile/web UI test runs")]
struct Args {
    /// Port to listen on for the HTTP API
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Backing store URL ("redis://host:port" or "memory")
    #[arg(long, default_value = "redis://localhost:6379")]
    store_url: String,

    /// Scheduler tick interval in milliseconds
    #[arg(long, default_value = "5000")]
    tick_interval_ms: u64,

    /// Default max retries stamped on new jobs
    #[arg(long, default_value = "3")]
    max_retries: u32,

    /// Agent/device pool spec
    /// Example: "agent-1:emulator-1,device-1;agent-2:browserstack-1"
    #[arg(long)]
    pool: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = OrchestratorConfig {
        listen_addr: format!("0.0.0.0:{}", args.port).parse()?,
        store_url: args.store_url,
        tick_interval_ms: args.tick_interval_ms,
        max_retries: args.max_retries,
        pool_spec: args.pool.unwrap_or_else(|| DEFAULT_POOL_SPEC.to_string()),
        ..OrchestratorConfig::default()
    };

    tracing::info!(
        listen_addr = %config.listen_addr,
        store_url = %config.store_url,
        tick_interval_ms = config.tick_interval_ms,
        "Starting fleetrun orchestrator"
    );

    Server::new(config).run().await?;

    Ok(())
}
