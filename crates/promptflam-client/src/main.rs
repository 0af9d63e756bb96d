//! promptflam-ask: send a prompt through the relay and stream the answer.

use std::io::Write;

use promptflam_chat::ConversationTurn;
use promptflam_client::ChatClient;
use promptflam_core::store::{get_or, put};
use promptflam_core::{FileStore, KeyValueStore, PromptFlamConfig};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:3000/api/chat";
const CONVERSATION_KEY: &str = "conversation";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() || matches!(args[0].as_str(), "--help" | "-h" | "help") {
        println!("Usage: promptflam-ask [--new] <prompt...>");
        println!();
        println!("Options:");
        println!("  --new      Start a fresh conversation instead of continuing the last one");
        println!();
        println!("Environment:");
        println!("  PROMPTFLAM_URL        Relay endpoint (default {})", DEFAULT_ENDPOINT);
        println!("  PROMPTFLAM_DATA_DIR   Where the conversation is kept (default data)");
        return Ok(());
    }

    let fresh = args[0] == "--new";
    if fresh {
        args.remove(0);
    }
    let prompt = args.join(" ");
    if prompt.trim().is_empty() {
        anyhow::bail!("Prompt must not be empty");
    }

    let config = PromptFlamConfig::from_env()?;
    let store = FileStore::open(&config.data_paths.store_file);
    if fresh {
        store.remove(CONVERSATION_KEY)?;
    }

    let mut turns: Vec<ConversationTurn> = get_or(&store, CONVERSATION_KEY, Vec::new());
    turns.push(ConversationTurn::user(prompt));

    let endpoint = std::env::var("PROMPTFLAM_URL").unwrap_or_else(|_| DEFAULT_ENDPOINT.into());
    let client = ChatClient::new(endpoint)?;
    info!("Sending {} turns to {}", turns.len(), client.endpoint());

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let mut stdout = std::io::stdout();
    let response = client
        .send(
            &turns,
            |delta, _| {
                let _ = write!(stdout, "{}", delta);
                let _ = stdout.flush();
            },
            Some(&cancel),
        )
        .await?;
    println!();

    if response.aborted {
        eprintln!("(aborted)");
    }
    if !response.sources.is_empty() {
        println!();
        println!("Sources:");
        for (i, source) in response.sources.iter().enumerate() {
            let label = source.title.as_deref().unwrap_or(&source.domain);
            println!("  [{}] {} - {}", i + 1, label, source.url);
        }
    }

    turns.push(ConversationTurn::assistant(response.content));
    put(&store, CONVERSATION_KEY, &turns)?;

    Ok(())
}
