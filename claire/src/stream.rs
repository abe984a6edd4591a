//! Live execution feed subscription.
//!
//! Task execution can take minutes; the console needs to show tool activity
//! incrementally, so events are pushed over a long-lived HTTP response rather
//! than polled. A background task reads the body, decodes frames, and forwards
//! them through a channel. The transport failing mid-flight is signalled at
//! most once; a single malformed frame never terminates the subscription.

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::events::{decode_frame, DecodedFrame, ExecutionEvent, SseFrames};

/// Channel capacity for decoded feed messages.
const MESSAGE_BUFFER: usize = 64;

/// The live feed could not be established at all.
#[derive(Debug, thiserror::Error)]
pub enum StreamOpenError {
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("Subscription rejected (HTTP {status})")]
    Rejected { status: u16 },
}

/// The live feed closed before `story_end` arrived.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Event stream dropped before story_end: {reason}")]
pub struct SubscriptionDropped {
    pub reason: String,
}

/// One message from the feed, in server emission order.
#[derive(Debug)]
pub enum StreamMessage {
    Event(ExecutionEvent),
    /// An unrecognized or undecodable frame, surfaced for display only.
    Log(String),
    /// Abnormal close. Emitted at most once, always last.
    Error(SubscriptionDropped),
}

/// Handle to an open feed subscription.
///
/// Dropping the handle (or calling [`EventStream::close`]) aborts the reader
/// task, so a cancelled attempt can never receive further mutations.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<StreamMessage>,
    reader: Option<JoinHandle<()>>,
}

impl EventStream {
    /// Open a subscription at `url`.
    ///
    /// Fails only if the transport refuses or the service rejects the
    /// subscription; once `Ok`, all further outcomes arrive as messages.
    pub async fn open(http: &reqwest::Client, url: &str) -> Result<Self, StreamOpenError> {
        let resp = http
            .get(url)
            .header("Accept", "text/event-stream")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(StreamOpenError::Rejected {
                status: status.as_u16(),
            });
        }
        debug!("Event stream open: {url}");

        let (tx, rx) = mpsc::channel(MESSAGE_BUFFER);
        let reader = tokio::spawn(read_loop(resp, tx));
        Ok(Self {
            rx,
            reader: Some(reader),
        })
    }

    /// Receive the next message. `None` means the reader task is gone and no
    /// further messages will arrive.
    pub async fn next(&mut self) -> Option<StreamMessage> {
        self.rx.recv().await
    }

    /// Close the subscription. Safe to call multiple times; double-close is a
    /// no-op.
    pub fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.close();
    }
}

/// Read the response body until `story_end`, transport failure, or EOF.
async fn read_loop(resp: reqwest::Response, tx: mpsc::Sender<StreamMessage>) {
    let mut frames = SseFrames::new();
    let mut body = resp.bytes_stream();
    let mut saw_story_end = false;

    'read: while let Some(chunk) = body.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("Event stream transport error: {err}");
                let _ = tx
                    .send(StreamMessage::Error(SubscriptionDropped {
                        reason: err.to_string(),
                    }))
                    .await;
                return;
            }
        };

        for payload in frames.push_chunk(&String::from_utf8_lossy(&bytes)) {
            match decode_frame(&payload) {
                DecodedFrame::Event(event) => {
                    let is_end = matches!(event, ExecutionEvent::StoryEnd { .. });
                    if tx.send(StreamMessage::Event(event)).await.is_err() {
                        return; // receiver gone, attempt cancelled
                    }
                    if is_end {
                        saw_story_end = true;
                        break 'read;
                    }
                }
                DecodedFrame::Log(line) => {
                    if tx.send(StreamMessage::Log(line)).await.is_err() {
                        return;
                    }
                }
            }
        }
    }

    if !saw_story_end {
        let _ = tx
            .send(StreamMessage::Error(SubscriptionDropped {
                reason: "connection closed before story_end".to_string(),
            }))
            .await;
    }
}
