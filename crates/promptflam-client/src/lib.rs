//! Client side of the PromptFlam chat relay.
//!
//! `ChatClient` posts a conversation to `/api/chat`, renders deltas through a
//! callback while the stream is open, and returns the assembled text with its
//! normalized sources.

pub mod consumer;

pub use consumer::{consume_stream, ChatClient, StreamAccumulator};
