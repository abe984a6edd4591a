//! Story execution orchestration.
//!
//! One attempt at a time: the orchestrator decides whether to try the live
//! feed, guards against double-starts, reconciles live and batch views of the
//! same execution, and always terminates in exactly one of ok/error with the
//! ledger fully settled.
//!
//! The state machine itself performs no I/O. It consumes events and transport
//! signals and answers with the follow-up action the caller must take, which
//! keeps every transition testable without a server. The async driver at the
//! bottom of this module wires the event stream and the fallback call around
//! it.

use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::client::ConsoleClient;
use crate::diagnostics::DiagnosticsAggregator;
use crate::events::ExecutionEvent;
use crate::fallback::{self, FallbackError};
use crate::ledger::{ProgressLedger, ProgressRecord};
use crate::stream::{EventStream, StreamMessage};
use crate::types::story::{BatchResult, Story};

/// Terminal result of an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Error(String),
}

/// Where the current attempt stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Starting,
    Streaming,
    FallingBack,
    Finishing,
    Done(Outcome),
}

/// A second attempt was requested while one is in flight.
#[derive(Debug, Clone, thiserror::Error)]
#[error("An implementation attempt is already in flight for story {story_id}")]
pub struct Busy {
    pub story_id: String,
}

/// Follow-up the caller must perform after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    /// The attempt is settled; release the subscription.
    CloseStream,
    /// Invoke the synchronous fallback call.
    RunFallback,
}

/// Everything scoped to a single execution attempt. Discarded and recreated
/// whenever a new attempt begins; there is no cross-attempt accumulation.
#[derive(Debug)]
struct Attempt {
    run_id: String,
    story_id: String,
    ledger: ProgressLedger,
    diagnostics: DiagnosticsAggregator,
    known_tasks: HashSet<String>,
    completed_tasks: HashSet<String>,
    fallback_used: bool,
}

impl Attempt {
    fn new(run_id: &str, story: &Story) -> Self {
        let mut ledger = ProgressLedger::new();
        ledger.init_story(&story.id, story.tasks.len() as u64);
        Self {
            run_id: run_id.to_string(),
            story_id: story.id.clone(),
            ledger,
            diagnostics: DiagnosticsAggregator::new(),
            known_tasks: story.tasks.iter().map(|t| t.id.clone()).collect(),
            completed_tasks: HashSet::new(),
            fallback_used: false,
        }
    }
}

/// State machine driving one story-implementation attempt.
///
/// Owns the attempt's ledger and diagnostics exclusively; the stream client
/// and fallback executor only reach them through this type's methods,
/// single-writer discipline with no locks.
#[derive(Debug)]
pub struct StoryOrchestrator {
    phase: Phase,
    attempt: Option<Attempt>,
}

impl Default for StoryOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl StoryOrchestrator {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            attempt: None,
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    /// Whether a new attempt may be requested right now.
    pub fn is_available(&self) -> bool {
        matches!(self.phase, Phase::Idle | Phase::Done(_))
    }

    pub fn story_id(&self) -> Option<&str> {
        self.attempt.as_ref().map(|a| a.story_id.as_str())
    }

    pub fn run_id(&self) -> Option<&str> {
        self.attempt.as_ref().map(|a| a.run_id.as_str())
    }

    pub fn ledger(&self) -> Option<&ProgressLedger> {
        self.attempt.as_ref().map(|a| &a.ledger)
    }

    pub fn diagnostics(&self) -> Option<&DiagnosticsAggregator> {
        self.attempt.as_ref().map(|a| &a.diagnostics)
    }

    /// Progress counters for the attempt's story.
    pub fn progress(&self) -> Option<&ProgressRecord> {
        let attempt = self.attempt.as_ref()?;
        attempt.ledger.get(&attempt.story_id)
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Begin a new attempt for `story`, resetting ledger and diagnostics.
    ///
    /// Rejected with [`Busy`] while an attempt is in flight; the rejection
    /// leaves the in-flight attempt's state untouched.
    pub fn request(&mut self, run_id: &str, story: &Story) -> Result<(), Busy> {
        if !self.is_available() {
            let story_id = self
                .story_id()
                .unwrap_or("<unknown>")
                .to_string();
            return Err(Busy { story_id });
        }
        debug!("Starting implementation attempt for story {}", story.id);
        self.attempt = Some(Attempt::new(run_id, story));
        self.phase = Phase::Starting;
        Ok(())
    }

    /// The subscription was accepted.
    pub fn stream_opened(&mut self) {
        if self.phase == Phase::Starting {
            self.phase = Phase::Streaming;
        } else {
            warn!("stream_opened in phase {:?}, ignored", self.phase);
        }
    }

    /// The subscription could not be established at all.
    pub fn stream_open_failed(&mut self) -> Action {
        match self.phase {
            Phase::Starting => self.begin_fallback(),
            _ => {
                warn!("stream_open_failed in phase {:?}, ignored", self.phase);
                Action::None
            }
        }
    }

    /// The subscription dropped (or stalled) before `story_end`.
    ///
    /// Live partial state is retained for later reconciliation, never wiped.
    pub fn stream_error(&mut self) -> Action {
        match self.phase {
            Phase::Starting | Phase::Streaming => self.begin_fallback(),
            _ => Action::None,
        }
    }

    fn begin_fallback(&mut self) -> Action {
        self.phase = Phase::FallingBack;
        let attempt = match self.attempt.as_mut() {
            Some(a) => a,
            None => return Action::None,
        };
        if attempt.fallback_used {
            // At most one fallback per attempt, however many stream errors
            return Action::None;
        }
        attempt.fallback_used = true;
        Action::RunFallback
    }

    /// Apply one live feed event.
    pub fn apply_event(&mut self, event: ExecutionEvent) -> Action {
        if self.phase != Phase::Streaming {
            warn!("Feed event in phase {:?}, ignored", self.phase);
            return Action::None;
        }
        let attempt = match self.attempt.as_mut() {
            Some(a) => a,
            None => return Action::None,
        };

        match event {
            ExecutionEvent::StoryBegin { .. } => Action::None,
            ExecutionEvent::OnToolStart { task_id, tool_name } => {
                attempt.diagnostics.record_tool_start(&task_id, &tool_name);
                Action::None
            }
            ExecutionEvent::OnToolEnd { task_id, tool_name } => {
                attempt.diagnostics.record_tool_end(&task_id, &tool_name);
                Action::None
            }
            ExecutionEvent::TaskComplete { task_id, ok } => {
                if !attempt.known_tasks.contains(&task_id) {
                    warn!("task_complete for unknown task {task_id}, ignored");
                    return Action::None;
                }
                // Dedup key is the task id, first completion wins
                if !attempt.completed_tasks.insert(task_id.clone()) {
                    warn!("Duplicate task_complete for {task_id}, ignored");
                    return Action::None;
                }
                attempt.ledger.record_task_complete(&attempt.story_id, ok);
                Action::None
            }
            ExecutionEvent::StoryEnd { result } => {
                self.phase = Phase::Finishing;
                self.adopt_result(&result);
                self.phase = Phase::Done(Outcome::Ok);
                Action::CloseStream
            }
            ExecutionEvent::Other => Action::None,
        }
    }

    /// The fallback call returned a batch snapshot.
    pub fn fallback_succeeded(&mut self, batch: &BatchResult) {
        if self.phase != Phase::FallingBack {
            warn!("fallback_succeeded in phase {:?}, ignored", self.phase);
            return;
        }
        self.phase = Phase::Finishing;
        self.adopt_result(batch);
        self.phase = Phase::Done(Outcome::Ok);
    }

    /// The fallback call failed; the attempt terminates in error. Ledger and
    /// diagnostics keep whatever partial state they had, useful for
    /// diagnosis but not guaranteed complete.
    pub fn fallback_failed(&mut self, error: &FallbackError) {
        if self.phase != Phase::FallingBack {
            warn!("fallback_failed in phase {:?}, ignored", self.phase);
            return;
        }
        self.phase = Phase::Done(Outcome::Error(error.to_string()));
    }

    /// Explicit user cancellation, e.g. switching the selected story mid-run.
    /// Discards the in-progress attempt entirely.
    pub fn cancel(&mut self) {
        self.phase = Phase::Idle;
        self.attempt = None;
    }

    fn adopt_result(&mut self, batch: &BatchResult) {
        if let Some(attempt) = self.attempt.as_mut() {
            fallback::apply_batch(&mut attempt.ledger, &mut attempt.diagnostics, batch);
        }
    }
}

// ---------------------------------------------------------------------------
// Async driver
// ---------------------------------------------------------------------------

/// Tunables for the attempt driver.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// A live feed silent for this long is treated like a dropped
    /// subscription and forces the fallback path.
    pub idle_timeout: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(120),
        }
    }
}

/// User-facing progress notifications emitted while an attempt runs.
///
/// Consumers see a single rolling indicator plus a final message; the
/// stream-vs-fallback mechanics are never surfaced as separate errors.
#[derive(Debug, Clone)]
pub enum ProgressUpdate {
    Started { story_id: String },
    ToolActivity { task_id: String, tool_name: String },
    TaskFinished { task_id: String, ok: bool },
    LogLine(String),
    Finished { outcome: Outcome },
}

async fn notify(updates: Option<&mpsc::Sender<ProgressUpdate>>, update: ProgressUpdate) {
    if let Some(tx) = updates {
        let _ = tx.send(update).await;
    }
}

/// Run one full implementation attempt for `story`.
///
/// Prefers the live feed and hands off to the synchronous call when the feed
/// cannot be established or fails mid-flight. Returns the terminal outcome;
/// incremental progress arrives on `updates`. Returns [`Busy`] without
/// touching the in-flight attempt if one is already running.
pub async fn implement_story(
    orchestrator: &mut StoryOrchestrator,
    client: &ConsoleClient,
    run_id: &str,
    story: &Story,
    config: &DriverConfig,
    updates: Option<&mpsc::Sender<ProgressUpdate>>,
) -> Result<Outcome, Busy> {
    orchestrator.request(run_id, story)?;
    notify(
        updates,
        ProgressUpdate::Started {
            story_id: story.id.clone(),
        },
    )
    .await;

    let action = match client.open_implement_stream(run_id, &story.id).await {
        Ok(stream) => {
            orchestrator.stream_opened();
            consume_stream(orchestrator, stream, config, updates).await
        }
        Err(err) => {
            warn!("Could not open event stream for story {}: {err}", story.id);
            orchestrator.stream_open_failed()
        }
    };

    if action == Action::RunFallback {
        match fallback::run_sync(client, run_id, &story.id).await {
            Ok(batch) => orchestrator.fallback_succeeded(&batch),
            Err(err) => orchestrator.fallback_failed(&err),
        }
    }

    let outcome = match orchestrator.phase() {
        Phase::Done(outcome) => outcome.clone(),
        phase => {
            // Cancelled mid-drive, or a transition was ignored; report rather
            // than leave the caller guessing
            warn!("Attempt for story {} ended in phase {phase:?}", story.id);
            Outcome::Error(format!("attempt did not terminate (phase {phase:?})"))
        }
    };
    notify(
        updates,
        ProgressUpdate::Finished {
            outcome: outcome.clone(),
        },
    )
    .await;
    Ok(outcome)
}

/// Consume the live feed until the story ends, the feed fails, or it stalls
/// past the idle timeout.
async fn consume_stream(
    orchestrator: &mut StoryOrchestrator,
    mut stream: EventStream,
    config: &DriverConfig,
    updates: Option<&mpsc::Sender<ProgressUpdate>>,
) -> Action {
    loop {
        let message = match timeout(config.idle_timeout, stream.next()).await {
            Err(_) => {
                warn!("Event stream idle for {:?}, abandoning it", config.idle_timeout);
                stream.close();
                return orchestrator.stream_error();
            }
            Ok(None) => {
                // Reader gone without a terminal message
                return orchestrator.stream_error();
            }
            Ok(Some(message)) => message,
        };

        match message {
            StreamMessage::Event(event) => {
                match &event {
                    ExecutionEvent::OnToolStart { task_id, tool_name }
                    | ExecutionEvent::OnToolEnd { task_id, tool_name } => {
                        notify(
                            updates,
                            ProgressUpdate::ToolActivity {
                                task_id: task_id.clone(),
                                tool_name: tool_name.clone(),
                            },
                        )
                        .await;
                    }
                    ExecutionEvent::TaskComplete { task_id, ok } => {
                        notify(
                            updates,
                            ProgressUpdate::TaskFinished {
                                task_id: task_id.clone(),
                                ok: *ok,
                            },
                        )
                        .await;
                    }
                    _ => {}
                }
                if orchestrator.apply_event(event) == Action::CloseStream {
                    stream.close();
                    return Action::None;
                }
            }
            StreamMessage::Log(line) => {
                notify(updates, ProgressUpdate::LogLine(line)).await;
            }
            StreamMessage::Error(err) => {
                warn!("Event stream dropped: {err}");
                stream.close();
                return orchestrator.stream_error();
            }
        }
    }
}
