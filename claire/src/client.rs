//! HTTP client for the CLAIRE data service's execution endpoints.
//!
//! The service exposes run/plan/story CRUD plus two execution endpoints; only
//! the execution surface is consumed here. Base URL comes from the
//! constructor or the `CLAIRE_API_URL` environment variable.

use serde::Deserialize;
use tracing::warn;

use crate::stream::{EventStream, StreamOpenError};
use crate::types::story::{BatchResult, RunBatchResult, ToolInventory};

/// Default base URL of a locally running data service.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from synchronous data-service calls.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Network-level failure or non-success HTTP status.
    #[error("HTTP error ({status}): {message}")]
    Http { status: u16, message: String },
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    /// The response body could not be parsed into the expected shape.
    #[error("Failed to decode response: {0}")]
    Decode(String),
}

/// Error envelope the service returns on unhandled failures.
#[derive(Debug, Deserialize)]
struct ServiceErrorBody {
    error: String,
    #[serde(default)]
    #[allow(dead_code)]
    trace: Option<String>,
}

/// Extract a readable message from an error response body.
///
/// The service wraps unhandled exceptions as `{"error": ..., "trace": ...}`;
/// anything else is passed through verbatim.
fn error_message_from_body(body: &str) -> String {
    match serde_json::from_str::<ServiceErrorBody>(body) {
        Ok(envelope) => envelope.error,
        Err(_) => body.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Client for the data service consumed by the execution console.
#[derive(Debug, Clone)]
pub struct ConsoleClient {
    base_url: String,
    client: reqwest::Client,
}

impl ConsoleClient {
    /// Create a client against the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    /// Create a client from `CLAIRE_API_URL`, falling back to the local
    /// development default.
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("CLAIRE_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // -----------------------------------------------------------------------
    // URL helpers
    // -----------------------------------------------------------------------

    fn implement_url(&self, run_id: &str, story_id: &str) -> String {
        format!(
            "{}/code/runs/{}/story/{}/implement",
            self.base_url, run_id, story_id
        )
    }

    fn implement_stream_url(&self, run_id: &str, story_id: &str) -> String {
        format!("{}/stream", self.implement_url(run_id, story_id))
    }

    fn implement_all_url(&self, run_id: &str) -> String {
        format!("{}/code/runs/{}/implement-all", self.base_url, run_id)
    }

    fn tools_url(&self, run_id: &str) -> String {
        format!("{}/code/runs/{}/tools", self.base_url, run_id)
    }

    // -----------------------------------------------------------------------
    // Generic request helper
    // -----------------------------------------------------------------------

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ClientError> {
        let resp = request.send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            let message = error_message_from_body(&body);
            warn!("Data service error: HTTP {} : {}", status.as_u16(), message);
            return Err(ClientError::Http {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    // -----------------------------------------------------------------------
    // Execution endpoints
    // -----------------------------------------------------------------------

    /// Synchronously implement a single story. Blocks until the remote agent
    /// has finished every task; returns the full batch snapshot.
    pub async fn implement_story(
        &self,
        run_id: &str,
        story_id: &str,
    ) -> Result<BatchResult, ClientError> {
        let url = self.implement_url(run_id, story_id);
        self.send_json(self.client.post(&url)).await
    }

    /// Open the live execution feed for a story.
    pub async fn open_implement_stream(
        &self,
        run_id: &str,
        story_id: &str,
    ) -> Result<EventStream, StreamOpenError> {
        let url = self.implement_stream_url(run_id, story_id);
        EventStream::open(&self.client, &url).await
    }

    /// Synchronously implement every story of a run, in priority order.
    pub async fn implement_all(&self, run_id: &str) -> Result<RunBatchResult, ClientError> {
        let url = self.implement_all_url(run_id);
        self.send_json(self.client.post(&url)).await
    }

    /// List the tool names available to the run's workspace. Informational;
    /// has no effect on execution tracking.
    pub async fn list_tools(&self, run_id: &str) -> Result<ToolInventory, ClientError> {
        let url = self.tools_url(run_id);
        self.send_json(self.client.get(&url)).await
    }
}
