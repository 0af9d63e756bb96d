//! Chat types shared by the relay and its clients.

use promptflam_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One role-tagged message in a chat exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Relay request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ConversationTurn>,
}

impl ChatRequest {
    /// Validate a raw request body into the ordered conversation.
    pub fn parse(body: &[u8]) -> Result<Vec<ConversationTurn>> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|_| Error::InvalidInput("Messages array required".into()))?;

        let messages = match value.get("messages") {
            Some(Value::Array(items)) => items,
            _ => return Err(Error::InvalidInput("Messages array required".into())),
        };
        if messages.is_empty() {
            return Err(Error::InvalidInput("Messages array must not be empty".into()));
        }

        messages
            .iter()
            .enumerate()
            .map(|(i, turn)| {
                ConversationTurn::deserialize(turn).map_err(|e| {
                    Error::InvalidInput(format!("Invalid message at index {}: {}", i, e))
                })
            })
            .collect()
    }
}

/// Event on the relay → client hop.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    ContentDelta(String),
    CitationList(Vec<Value>),
    Done,
}

impl StreamEvent {
    /// The `data:` payload for this event.
    pub fn payload(&self) -> String {
        match self {
            StreamEvent::ContentDelta(text) => json!({ "content": text }).to_string(),
            StreamEvent::CitationList(entries) => json!({ "citations": entries }).to_string(),
            StreamEvent::Done => crate::framing::DONE_TOKEN.to_string(),
        }
    }

    /// Full SSE frame including the trailing blank line.
    pub fn to_frame(&self) -> String {
        format!("{}{}\n\n", crate::framing::DATA_PREFIX, self.payload())
    }
}

/// A citation normalized for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub title: Option<String>,
    pub url: String,
    pub excerpt: String,
    pub domain: String,
}

/// Accumulated result of one streamed exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub sources: Vec<Source>,
    pub aborted: bool,
}

/// `{error}` body used for every non-stream failure response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
