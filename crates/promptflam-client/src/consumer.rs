//! Incremental consumer for the relay's event stream.
//!
//! Per request: `Idle → Requesting → Streaming → {Completed | Aborted | Failed}`.
//! Completed and Aborted both produce a `ChatResponse`; Failed is an `Err`.

use std::time::Duration;

use futures::Stream;
use promptflam_chat::citations::{format_citations, normalize_citation_placement};
use promptflam_chat::framing::{classify_line, Frame, LineBuffer};
use promptflam_chat::{ChatRequest, ChatResponse, ConversationTurn};
use promptflam_core::{Error, Result};
use reqwest::Client;
use serde_json::Value;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Running state of one streamed response.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    buffer: LineBuffer,
    content: String,
    citations: Value,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text accumulated so far.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Feed one transport chunk; `on_chunk(delta, full)` fires per content delta.
    pub fn push(&mut self, chunk: &[u8], on_chunk: &mut impl FnMut(&str, &str)) {
        for line in self.buffer.push(chunk) {
            self.handle_line(&line, on_chunk);
        }
    }

    fn handle_line(&mut self, line: &str, on_chunk: &mut impl FnMut(&str, &str)) {
        let payload = match classify_line(line) {
            Frame::Payload(payload) => payload,
            Frame::Done | Frame::Malformed(_) | Frame::Ignored => return,
        };

        if let Some(delta) = payload
            .get("content")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
        {
            self.content.push_str(delta);
            on_chunk(delta, &self.content);
        }

        // Sent once at the end; a repeat replaces the earlier list.
        if let Some(citations) = payload.get("citations").filter(|c| !c.is_null()) {
            self.citations = citations.clone();
        }
    }

    /// Close the stream and post-process.
    ///
    /// On completion the unterminated tail is processed as a last line; on
    /// abort it is dropped, since it is incomplete by definition.
    pub fn finish(mut self, aborted: bool, on_chunk: &mut impl FnMut(&str, &str)) -> ChatResponse {
        if !aborted {
            if let Some(line) = self.buffer.finish() {
                self.handle_line(&line, on_chunk);
            }
        }

        ChatResponse {
            content: normalize_citation_placement(&self.content),
            sources: format_citations(&self.citations),
            aborted,
        }
    }
}

/// Drive a relay byte stream to completion, cancellation or failure.
pub async fn consume_stream<S, B, E, F>(
    stream: S,
    mut on_chunk: F,
    cancel: Option<&CancellationToken>,
) -> Result<ChatResponse>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
    F: FnMut(&str, &str),
{
    tokio::pin!(stream);
    let mut acc = StreamAccumulator::new();

    loop {
        let next = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!("Stream aborted after {} bytes of content", acc.content().len());
                    return Ok(acc.finish(true, &mut on_chunk));
                }
                next = stream.next() => next,
            },
            None => stream.next().await,
        };

        match next {
            Some(Ok(bytes)) => acc.push(bytes.as_ref(), &mut on_chunk),
            Some(Err(e)) => {
                warn!("Stream reading error: {}", e);
                return Err(Error::Transport(e.to_string()));
            }
            None => break,
        }
    }

    Ok(acc.finish(false, &mut on_chunk))
}

/// HTTP client for the relay endpoint.
#[derive(Debug, Clone)]
pub struct ChatClient {
    endpoint: String,
    client: Client,
}

impl ChatClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send `turns` and stream the reply.
    ///
    /// Cancelling while streaming yields `aborted: true` with the partial
    /// text; cancelling before the response arrives fails with `UserAborted`.
    pub async fn send<F>(
        &self,
        turns: &[ConversationTurn],
        on_chunk: F,
        cancel: Option<&CancellationToken>,
    ) -> Result<ChatResponse>
    where
        F: FnMut(&str, &str),
    {
        let request = self
            .client
            .post(&self.endpoint)
            .json(&ChatRequest {
                messages: turns.to_vec(),
            })
            .send();

        let response = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => return Err(Error::UserAborted),
                response = request => response,
            },
            None => request.await,
        }
        .map_err(|e| Error::Transport(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<Value>().await {
                Ok(body) => body
                    .get("error")
                    .and_then(Value::as_str)
                    .filter(|m| !m.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("API error: {}", status.as_u16())),
                Err(_) => "Request failed".to_string(),
            };
            return Err(Error::UpstreamRejected {
                status: status.as_u16(),
                message,
            });
        }

        consume_stream(response.bytes_stream(), on_chunk, cancel).await
    }

    /// `send` without live rendering or cancellation.
    pub async fn complete(&self, turns: &[ConversationTurn]) -> Result<ChatResponse> {
        self.send(turns, |_, _| {}, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptflam_chat::{Source, StreamEvent};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    type Chunk = std::result::Result<Vec<u8>, String>;

    fn relay_body(events: &[StreamEvent]) -> String {
        events.iter().map(StreamEvent::to_frame).collect()
    }

    fn hello_world_body() -> String {
        relay_body(&[
            StreamEvent::ContentDelta("Hello".into()),
            StreamEvent::ContentDelta(" world".into()),
            StreamEvent::CitationList(vec![json!("https://a.com")]),
            StreamEvent::Done,
        ])
    }

    async fn consume_chunks(chunks: Vec<Chunk>) -> Result<ChatResponse> {
        consume_stream(futures::stream::iter(chunks), |_, _| {}, None).await
    }

    fn split_every(body: &str, size: usize) -> Vec<Chunk> {
        body.as_bytes()
            .chunks(size)
            .map(|c| Ok(c.to_vec()))
            .collect()
    }

    #[tokio::test]
    async fn test_end_to_end_result() {
        let result = consume_chunks(vec![Ok(hello_world_body().into_bytes())])
            .await
            .unwrap();
        assert_eq!(
            result,
            ChatResponse {
                content: "Hello world".into(),
                sources: vec![Source {
                    title: None,
                    url: "https://a.com".into(),
                    excerpt: String::new(),
                    domain: "a.com".into(),
                }],
                aborted: false,
            }
        );
    }

    #[tokio::test]
    async fn test_chunk_boundaries_do_not_change_content() {
        let body = relay_body(&[
            StreamEvent::ContentDelta("Zürich ".into()),
            StreamEvent::ContentDelta("is in Switzerland[1].".into()),
            StreamEvent::ContentDelta(" Café \"au lait\"".into()),
            StreamEvent::CitationList(vec![json!({"url": "https://www.zh.ch", "title": "ZH"})]),
            StreamEvent::Done,
        ]);
        let whole = consume_chunks(vec![Ok(body.clone().into_bytes())])
            .await
            .unwrap();

        for size in 1..=body.len() {
            let split = consume_chunks(split_every(&body, size)).await.unwrap();
            assert_eq!(split, whole, "chunk size {size}");
        }

        // Split exactly at line breaks.
        let by_line: Vec<Chunk> = body
            .split_inclusive('\n')
            .map(|l| Ok(l.as_bytes().to_vec()))
            .collect();
        assert_eq!(consume_chunks(by_line).await.unwrap(), whole);

        assert_eq!(whole.content, "Zürich is in Switzerland.[1] Café \"au lait\"");
        assert_eq!(whole.sources[0].domain, "zh.ch");
    }

    #[tokio::test]
    async fn test_callback_receives_delta_and_total() {
        let mut seen = Vec::new();
        let result = consume_stream(
            futures::stream::iter(split_every(&hello_world_body(), 7)),
            |delta: &str, full: &str| seen.push((delta.to_string(), full.to_string())),
            None,
        )
        .await
        .unwrap();

        assert_eq!(
            seen,
            vec![
                ("Hello".to_string(), "Hello".to_string()),
                (" world".to_string(), "Hello world".to_string()),
            ]
        );
        assert!(!result.aborted);
    }

    #[tokio::test]
    async fn test_malformed_frame_is_skipped() {
        let body = [
            StreamEvent::ContentDelta("one ".into()).to_frame(),
            "data: {\"content\": \"bro\n\n".to_string(),
            StreamEvent::ContentDelta("two".into()).to_frame(),
            StreamEvent::Done.to_frame(),
        ]
        .concat();
        let result = consume_chunks(vec![Ok(body.into_bytes())]).await.unwrap();
        assert_eq!(result.content, "one two");
        assert!(result.sources.is_empty());
    }

    #[tokio::test]
    async fn test_abort_returns_partial_result() {
        let token = CancellationToken::new();
        let chunks: Vec<Chunk> = vec![
            Ok(StreamEvent::ContentDelta("Partial ".into()).to_frame().into_bytes()),
            Ok(StreamEvent::ContentDelta("answer[1].".into()).to_frame().into_bytes()),
            Ok(StreamEvent::CitationList(vec![json!("https://a.com")])
                .to_frame()
                .into_bytes()),
            Ok(StreamEvent::Done.to_frame().into_bytes()),
        ];

        let mut deltas = 0;
        let result = consume_stream(
            futures::stream::iter(chunks),
            |_: &str, _: &str| {
                deltas += 1;
                if deltas == 2 {
                    token.cancel();
                }
            },
            Some(&token),
        )
        .await
        .unwrap();

        assert_eq!(
            result,
            ChatResponse {
                content: "Partial answer.[1]".into(),
                sources: Vec::new(),
                aborted: true,
            }
        );
    }

    #[tokio::test]
    async fn test_abort_while_waiting_for_next_chunk() {
        let token = CancellationToken::new();
        let first: Vec<Chunk> = vec![Ok(StreamEvent::ContentDelta("Hi".into())
            .to_frame()
            .into_bytes())];
        let stream = futures::stream::iter(first).chain(futures::stream::pending());

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = consume_stream(stream, |_, _| {}, Some(&token)).await.unwrap();
        assert!(result.aborted);
        assert_eq!(result.content, "Hi");
    }

    #[tokio::test]
    async fn test_read_error_is_fatal() {
        let err = consume_chunks(vec![
            Ok(StreamEvent::ContentDelta("Hi".into()).to_frame().into_bytes()),
            Err("connection reset".into()),
        ])
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(!err.is_abort());
    }

    #[tokio::test]
    async fn test_unterminated_tail_is_processed_at_end() {
        let body = "data: {\"content\":\"tail\"}";
        let result = consume_chunks(vec![Ok(body.as_bytes().to_vec())]).await.unwrap();
        assert_eq!(result.content, "tail");
    }

    #[tokio::test]
    async fn test_client_posts_messages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_json(json!({"messages": [{"role": "user", "content": "Hi"}]})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(hello_world_body()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = ChatClient::new(format!("{}/api/chat", server.uri())).unwrap();
        let result = client.complete(&[ConversationTurn::user("Hi")]).await.unwrap();
        assert_eq!(result.content, "Hello world");
        assert_eq!(result.sources.len(), 1);
    }

    #[tokio::test]
    async fn test_client_surfaces_server_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(json!({
                    "error": "API key not configured. Set PERPLEXITY_API_KEY"
                })),
            )
            .mount(&server)
            .await;

        let client = ChatClient::new(server.uri()).unwrap();
        let err = client
            .complete(&[ConversationTurn::user("Hi")])
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.to_string(), "API key not configured. Set PERPLEXITY_API_KEY");
    }

    #[tokio::test]
    async fn test_client_non_json_error_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&server)
            .await;

        let client = ChatClient::new(server.uri()).unwrap();
        let err = client
            .complete(&[ConversationTurn::user("Hi")])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Request failed");
        assert_eq!(err.status_code(), 502);
    }

    #[tokio::test]
    async fn test_cancel_before_response_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(hello_world_body())
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let token = CancellationToken::new();
        token.cancel();
        let client = ChatClient::new(server.uri()).unwrap();
        let err = client
            .send(&[ConversationTurn::user("Hi")], |_, _| {}, Some(&token))
            .await
            .unwrap_err();
        assert!(err.is_abort());
    }
}
