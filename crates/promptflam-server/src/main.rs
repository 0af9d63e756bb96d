//! PromptFlam chat relay server.

use std::sync::Arc;

use promptflam_chat::RelayConfig;
use promptflam_core::PromptFlamConfig;
use promptflam_server::{build_router, AppState};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        match args[1].as_str() {
            "--help" | "-h" | "help" => {
                println!("PromptFlam: chat relay for the prompt library");
                println!();
                println!("Usage: promptflam");
                println!();
                println!("Environment:");
                println!("  HOST, PORT             Listen address (default 0.0.0.0:3000)");
                println!("  PROMPTFLAM_DATA_DIR    Data directory (default data)");
                println!("  PERPLEXITY_API_KEY     Upstream API key");
                println!("  PERPLEXITY_API_URL     Upstream endpoint override");
                println!("  PERPLEXITY_MODEL       Upstream model override");
                return Ok(());
            }
            _ => {
                eprintln!("Unknown command: {}. Use 'promptflam help' for usage.", args[1]);
                std::process::exit(1);
            }
        }
    }

    let config = PromptFlamConfig::from_env()?;
    info!("Data directory: {}", config.data_paths.root.display());

    let relay = RelayConfig::load(&config.data_paths.relay_config_file);
    if !relay.is_configured() {
        warn!("PERPLEXITY_API_KEY is not set; /api/chat will answer 500 until it is");
    }

    let state = Arc::new(AppState::new(relay)?);
    let app = build_router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("PromptFlam relay listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
