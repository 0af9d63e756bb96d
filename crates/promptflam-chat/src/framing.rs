//! SSE line framing shared by the relay and the client consumer.
//!
//! Transport chunks carry no line alignment: a single `data:` line can arrive
//! split across reads, even inside a multi-byte character. `LineBuffer`
//! carries the unterminated tail between reads and only yields whole lines.

use serde_json::Value;
use tracing::debug;

/// Prefix marking a line as an event payload.
pub const DATA_PREFIX: &str = "data: ";

/// Terminal sentinel payload.
pub const DONE_TOKEN: &str = "[DONE]";

/// Carry-over buffer that turns arbitrary byte chunks into complete lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every line it completed.
    ///
    /// Lines are split on `\n` with a trailing `\r` removed. The bytes after
    /// the last newline stay buffered for the next call.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);

        complete[..complete.len() - 1]
            .split(|&b| b == b'\n')
            .map(decode_line)
            .collect()
    }

    /// Flush the unterminated remainder at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(decode_line(&rest))
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Classification of one complete line.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A `data:` line whose payload parsed as JSON.
    Payload(Value),
    /// The terminal sentinel.
    Done,
    /// A `data:` line whose payload is not valid JSON. Skipped by callers;
    /// this is the only leniency in the protocol, and it never covers
    /// transport errors.
    Malformed(String),
    /// Blank separators, comments, `event:`/`id:` fields.
    Ignored,
}

/// Classify a complete line.
pub fn classify_line(line: &str) -> Frame {
    let Some(data) = line.strip_prefix(DATA_PREFIX) else {
        return Frame::Ignored;
    };

    if data.trim() == DONE_TOKEN {
        return Frame::Done;
    }

    match serde_json::from_str::<Value>(data) {
        Ok(value) => Frame::Payload(value),
        Err(e) => {
            debug!("Skipping malformed frame ({}): {:.80}", e, data);
            Frame::Malformed(data.to_string())
        }
    }
}
