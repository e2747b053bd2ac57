use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::Parser;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use voicebridge::config::{ServerConfig, merge_agents_file};
use voicebridge::routes;
use voicebridge::state::AppState;

/// Voicebridge - Real-time phone-call voice agent
#[derive(Parser, Debug)]
#[command(name = "voicebridge")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the agent directory file (YAML)
    #[arg(short = 'a', long = "agents", value_name = "FILE")]
    agents: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Initialize crypto provider for TLS connections
    // This must be done before any TLS connections are attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let mut config = ServerConfig::from_env().map_err(|e| anyhow!(e.to_string()))?;
    if let Some(agents_path) = cli.agents {
        println!("Loading agent directory from {}", agents_path.display());
        merge_agents_file(&mut config, &agents_path).map_err(|e| anyhow!(e.to_string()))?;
    }

    let address = config.address();
    println!("Starting server on {address}");

    let app_state = AppState::new(config);

    let app = routes::create_router()
        .with_state(app_state)
        .layer(TraceLayer::new_for_http());

    let socket_addr: SocketAddr = address
        .parse()
        .map_err(|e| anyhow!("Invalid server address '{}': {}", address, e))?;

    println!("Server listening on http://{}", socket_addr);

    let listener = TcpListener::bind(&socket_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
