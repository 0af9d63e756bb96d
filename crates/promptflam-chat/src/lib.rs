//! Streaming chat relay for PromptFlam.
//!
//! The relay forwards a conversation to the Perplexity completions API and
//! re-encodes its SSE stream as `{content}` deltas, a trailing `{citations}`
//! event and a `[DONE]` sentinel. The same framing code decodes that stream
//! on the client side.

pub mod citations;
pub mod config;
pub mod framing;
pub mod relay;
pub mod types;

pub use config::RelayConfig;
pub use types::*;
