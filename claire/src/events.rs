//! Wire format of the live execution feed.
//!
//! Each delivered frame carries a JSON object tagged by its `event` field.
//! Frames the console does not recognize are forwarded as log lines instead of
//! failing the subscription: one bad frame must not abort a multi-minute
//! execution.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::story::BatchResult;

/// A single event from the live execution feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// The story's execution started.
    StoryBegin {
        #[serde(default)]
        story_id: String,
    },
    /// A tool invocation began for a task.
    OnToolStart {
        task_id: String,
        #[serde(alias = "name")]
        tool_name: String,
    },
    /// A tool invocation finished.
    OnToolEnd {
        task_id: String,
        #[serde(alias = "name")]
        tool_name: String,
    },
    /// A task reached a terminal state.
    TaskComplete { task_id: String, ok: bool },
    /// The whole story finished. Carries the same snapshot a batch call
    /// would have returned.
    StoryEnd { result: BatchResult },
    /// Any other tag. Forwarded as an opaque log line, ignored by the ledger.
    #[serde(other)]
    Other,
}

/// Outcome of decoding one feed frame.
#[derive(Debug, Clone)]
pub enum DecodedFrame {
    Event(ExecutionEvent),
    /// Unrecognized or malformed payload, surfaced verbatim.
    Log(String),
}

/// Decode a single frame payload.
///
/// Malformed JSON and unknown event tags both degrade to a log line; neither
/// terminates the subscription.
pub fn decode_frame(payload: &str) -> DecodedFrame {
    match serde_json::from_str::<ExecutionEvent>(payload) {
        Ok(ExecutionEvent::Other) => DecodedFrame::Log(payload.to_string()),
        Ok(event) => DecodedFrame::Event(event),
        Err(err) => {
            warn!("Undecodable feed frame ({err}): {payload}");
            DecodedFrame::Log(payload.to_string())
        }
    }
}

/// Incremental parser for the server-sent-events framing of the feed.
///
/// Feed chunks arrive at arbitrary byte boundaries; this accumulates them and
/// yields complete `data:` payloads. Comment lines (`:`) and non-`data` fields
/// are ignored; multiple `data:` lines in one frame are joined with `\n`.
#[derive(Debug, Default)]
pub struct SseFrames {
    line_buf: String,
    data: Vec<String>,
}

impl SseFrames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of the response body; returns any frame payloads that
    /// became complete.
    pub fn push_chunk(&mut self, chunk: &str) -> Vec<String> {
        let mut payloads = Vec::new();
        for ch in chunk.chars() {
            if ch == '\n' {
                let line = std::mem::take(&mut self.line_buf);
                if let Some(payload) = self.push_line(line.trim_end_matches('\r')) {
                    payloads.push(payload);
                }
            } else {
                self.line_buf.push(ch);
            }
        }
        payloads
    }

    fn push_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            // Blank line terminates the frame
            if self.data.is_empty() {
                return None;
            }
            return Some(std::mem::take(&mut self.data).join("\n"));
        }
        if line.starts_with(':') {
            return None;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            self.data.push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
        }
        // Other fields (event:, id:, retry:) carry nothing we use
        None
    }
}
