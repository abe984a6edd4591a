//! Execution progress tracking for the CLAIRE planning console.
//!
//! A run's plan is a hierarchy of epics, stories, and tasks; a remote agent
//! service executes one story at a time and reports progress either over a
//! live event feed or as a single batch result. This crate owns the console's
//! view of that execution: it subscribes to the feed, keeps per-story progress
//! counters and per-task tool diagnostics, and falls back to the synchronous
//! implement call when the feed is unavailable, converging both paths to the
//! same final state.
//!
//! [`orchestrator::StoryOrchestrator`] is the entry point; it is a pure state
//! machine, with [`orchestrator::implement_story`] as the async driver that
//! wires the HTTP client and the event stream around it.

pub mod client;
pub mod diagnostics;
pub mod events;
pub mod fallback;
pub mod ledger;
pub mod orchestrator;
pub mod stream;
pub mod types;

pub use client::{ClientError, ConsoleClient};
pub use diagnostics::{DiagnosticsAggregator, ToolDiagnostic};
pub use events::ExecutionEvent;
pub use fallback::FallbackError;
pub use ledger::{ProgressLedger, ProgressRecord};
pub use orchestrator::{
    implement_story, Action, Busy, DriverConfig, Outcome, Phase, ProgressUpdate, StoryOrchestrator,
};
pub use stream::{EventStream, StreamMessage, StreamOpenError, SubscriptionDropped};
pub use types::{BatchResult, RunBatchResult, Story, StoryOutcome, Task, TaskResult, TaskStatus};
