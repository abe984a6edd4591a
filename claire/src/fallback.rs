//! Synchronous fallback path for story implementation.
//!
//! When the live feed cannot be established or drops mid-flight, the console
//! falls back to the blocking implement call and maps its response into the
//! same ledger/aggregator shape the stream would have produced. The live path
//! adopts its final `story_end` result through [`apply_batch`] too, so both
//! paths converge to identical observable state.

use tracing::debug;

use crate::client::{ClientError, ConsoleClient};
use crate::diagnostics::{diagnostic_from_events, DiagnosticsAggregator};
use crate::ledger::ProgressLedger;
use crate::types::story::BatchResult;

/// Terminal failure of the fallback call. Unlike live-feed hiccups, these are
/// surfaced to the user as the attempt's error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FallbackError {
    #[error("Implement request failed: {0}")]
    Transport(String),
    #[error("Implement response malformed: {0}")]
    Decode(String),
}

impl From<ClientError> for FallbackError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Decode(msg) => FallbackError::Decode(msg),
            other => FallbackError::Transport(other.to_string()),
        }
    }
}

/// Issue the synchronous implement call for one story.
pub async fn run_sync(
    client: &ConsoleClient,
    run_id: &str,
    story_id: &str,
) -> Result<BatchResult, FallbackError> {
    debug!("Running synchronous implement for story {story_id}");
    let batch = client.implement_story(run_id, story_id).await?;
    Ok(batch)
}

/// Reconcile a batch snapshot into the attempt's ledger and diagnostics.
///
/// The ledger is replaced outright (the batch's task list is authoritative for
/// totals); diagnostics are merged per task so counters the live feed already
/// raised never regress.
pub fn apply_batch(
    ledger: &mut ProgressLedger,
    diagnostics: &mut DiagnosticsAggregator,
    batch: &BatchResult,
) {
    ledger.replace_from_batch(batch);
    for result in &batch.results {
        let batch_diag = diagnostic_from_events(result.events.as_deref().unwrap_or(&[]));
        diagnostics.merge_batch(&result.task_id, &batch_diag);
    }
}
