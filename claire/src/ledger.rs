//! Per-story progress counters for the current execution attempt.

use std::collections::HashMap;

use crate::types::story::BatchResult;

/// Progress counters for one story. Invariant: `ok + errors <= total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressRecord {
    pub total: u64,
    pub ok: u64,
    pub errors: u64,
}

impl ProgressRecord {
    /// Tasks that have reached a terminal state so far.
    pub fn completed(&self) -> u64 {
        self.ok + self.errors
    }

    /// Whether every known task has completed.
    pub fn is_complete(&self) -> bool {
        self.completed() >= self.total && self.total > 0
    }
}

/// Tracks `{total, ok, errors}` per story.
///
/// Updated incrementally by stream events, or atomically replaced when a batch
/// result arrives. The orchestrator is the single writer and is responsible
/// for delivering `task_complete` at most once per task per attempt; this
/// component does not deduplicate.
#[derive(Debug, Default)]
pub struct ProgressLedger {
    by_story: HashMap<String, ProgressRecord>,
}

impl ProgressLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a story with its known task count before execution starts.
    pub fn init_story(&mut self, story_id: &str, total: u64) {
        self.by_story.insert(
            story_id.to_string(),
            ProgressRecord {
                total,
                ok: 0,
                errors: 0,
            },
        );
    }

    /// A task reached a terminal state: bump the matching counter.
    pub fn record_task_complete(&mut self, story_id: &str, ok: bool) {
        let record = self.by_story.entry(story_id.to_string()).or_default();
        if ok {
            record.ok += 1;
        } else {
            record.errors += 1;
        }
        debug_assert!(
            record.completed() <= record.total,
            "progress overcount for story {story_id}: {record:?}"
        );
    }

    /// Full overwrite from a batch result. Used when the live feed never
    /// started or was abandoned, so partial live increments are superseded
    /// rather than added to. The batch's task list is authoritative for
    /// `total`.
    pub fn replace_from_batch(&mut self, batch: &BatchResult) {
        self.by_story.insert(
            batch.story_id.clone(),
            ProgressRecord {
                total: batch.results.len() as u64,
                ok: batch.ok_count() as u64,
                errors: batch.error_count() as u64,
            },
        );
    }

    pub fn get(&self, story_id: &str) -> Option<&ProgressRecord> {
        self.by_story.get(story_id)
    }

    pub fn is_empty(&self) -> bool {
        self.by_story.is_empty()
    }
}
