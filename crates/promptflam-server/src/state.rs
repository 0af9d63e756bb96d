//! Shared application state.

use std::time::Duration;

use promptflam_chat::RelayConfig;
use reqwest::Client;

/// Read-only state shared by all handlers. Each relay request owns its own
/// upstream stream and buffers; nothing here is mutated per request.
pub struct AppState {
    pub relay: RelayConfig,
    pub client: Client,
}

impl AppState {
    pub fn new(relay: RelayConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { relay, client })
    }
}
