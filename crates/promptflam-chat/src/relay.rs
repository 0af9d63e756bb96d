//! Upstream streaming: open the Perplexity request and re-encode its SSE.
//!
//! Upstream frames look like OpenAI chat-completion chunks with an extra
//! top-level `citations` array. Only `choices[0].delta.content` is forwarded
//! live; the citation list is held back and sent once the upstream ends.

use std::pin::Pin;

use futures::Stream;
use promptflam_core::{Error, Result};
use reqwest::Client;
use serde_json::{json, Value};
use tokio_stream::StreamExt;
use tracing::{debug, error, warn};

use crate::config::{RelayConfig, SYSTEM_PROMPT};
use crate::framing::{classify_line, Frame, LineBuffer};
use crate::types::{ConversationTurn, StreamEvent};

/// Boxed stream of relay events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Upstream request body: fixed system turn followed by the caller's turns.
pub fn upstream_body(config: &RelayConfig, turns: &[ConversationTurn]) -> Value {
    let mut messages = Vec::with_capacity(turns.len() + 1);
    messages.push(json!({"role": "system", "content": SYSTEM_PROMPT}));
    messages.extend(
        turns
            .iter()
            .map(|t| json!({"role": t.role, "content": t.content})),
    );

    json!({
        "model": config.model,
        "messages": messages,
        "temperature": config.temperature,
        "max_tokens": config.max_tokens,
        "stream": true,
        "search_recency_filter": config.search_recency_filter,
    })
}

/// Send the streaming request and return the accepted upstream response.
///
/// Fails with `Config` when no key is set, `Transport` when the upstream is
/// unreachable and `UpstreamRejected` on a non-success status.
pub async fn open_upstream(
    client: &Client,
    config: &RelayConfig,
    turns: &[ConversationTurn],
) -> Result<reqwest::Response> {
    let api_key = config.api_key().ok_or_else(|| {
        Error::Config("API key not configured. Set PERPLEXITY_API_KEY".into())
    })?;

    debug!(
        "Streaming from {} with model {} ({} turns)",
        config.endpoint,
        config.model,
        turns.len()
    );

    let response = client
        .post(&config.endpoint)
        .header("Authorization", format!("Bearer {}", api_key))
        .header("Content-Type", "application/json")
        .json(&upstream_body(config, turns))
        .send()
        .await
        .map_err(|e| Error::Transport(format!("Request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        let message = read_error_message(response, config).await;
        warn!("Upstream rejected request: {} {}", status, message);
        return Err(Error::UpstreamRejected {
            status: status.as_u16(),
            message,
        });
    }

    Ok(response)
}

/// Best-effort error message from a rejected upstream response.
async fn read_error_message(response: reqwest::Response, config: &RelayConfig) -> String {
    let status = response.status();
    let body = tokio::time::timeout(config.error_body_timeout(), response.bytes()).await;

    let parsed = match body {
        Ok(Ok(bytes)) => serde_json::from_slice::<Value>(&bytes).ok(),
        Ok(Err(e)) => {
            debug!("Could not read upstream error body: {}", e);
            None
        }
        Err(_) => {
            debug!("Timed out reading upstream error body");
            None
        }
    };

    parsed
        .as_ref()
        .and_then(error_message_from)
        .unwrap_or_else(|| format!("API error: {}", status.as_u16()))
}

fn error_message_from(body: &Value) -> Option<String> {
    let error = body.get("error")?;
    error
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| error.as_str())
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

/// What one upstream payload contributes to the relay.
#[derive(Debug, Default, PartialEq)]
struct UpstreamFrame {
    delta: Option<String>,
    citations: Option<Vec<Value>>,
}

fn read_upstream_payload(payload: &Value) -> UpstreamFrame {
    let delta = payload["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let citations = payload["citations"].as_array().cloned();
    UpstreamFrame { delta, citations }
}

/// Re-encode an upstream SSE byte stream as relay events.
///
/// Emits one `ContentDelta` per upstream delta, then `CitationList` with the
/// last citation list seen (possibly empty) and `Done` once the upstream body
/// ends. A read error ends the stream with that error and nothing after it.
pub fn relay_events<S, B, E>(upstream: S) -> EventStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    Box::pin(async_stream::stream! {
        tokio::pin!(upstream);
        let mut buffer = LineBuffer::new();
        let mut citations: Vec<Value> = Vec::new();

        while let Some(chunk) = upstream.next().await {
            let bytes = match chunk {
                Ok(b) => b,
                Err(e) => {
                    error!("Upstream stream read error: {}", e);
                    yield Err(Error::Transport(format!("Stream read error: {}", e)));
                    return;
                }
            };

            for line in buffer.push(bytes.as_ref()) {
                if let Some(event) = relay_line(&line, &mut citations) {
                    yield Ok(event);
                }
            }
        }

        if let Some(line) = buffer.finish() {
            if let Some(event) = relay_line(&line, &mut citations) {
                yield Ok(event);
            }
        }

        yield Ok(StreamEvent::CitationList(citations));
        yield Ok(StreamEvent::Done);
    })
}

/// Handle one complete upstream line, returning the delta to forward if any.
fn relay_line(line: &str, citations: &mut Vec<Value>) -> Option<StreamEvent> {
    match classify_line(line) {
        Frame::Payload(payload) => {
            let frame = read_upstream_payload(&payload);
            if let Some(list) = frame.citations {
                *citations = list;
            }
            frame.delta.map(StreamEvent::ContentDelta)
        }
        // Upstream's own sentinel; ours goes out after the citation list.
        Frame::Done => None,
        Frame::Malformed(_) | Frame::Ignored => None,
    }
}
