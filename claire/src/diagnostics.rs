//! Per-task tool diagnostics, accumulated incrementally.
//!
//! The live feed and the batch result are two independently-sourced views of
//! the same per-task activity. The aggregator records whichever arrives and
//! merges the two without double counting, so a slower batch response landing
//! after faster live updates never regresses a user-visible counter.

use std::collections::HashMap;

use crate::events::ExecutionEvent;

/// Per-task bookkeeping of tool invocation counts and the most recent tool.
///
/// `call_count` is monotonic within one execution attempt; it resets only when
/// a new attempt begins for the story.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolDiagnostic {
    pub call_count: u64,
    pub latest_tool_name: String,
}

impl ToolDiagnostic {
    /// Whether this diagnostic has recorded any activity yet.
    pub fn has_data(&self) -> bool {
        self.call_count > 0 || !self.latest_tool_name.is_empty()
    }
}

/// Accumulates tool diagnostics for every task of the current attempt.
#[derive(Debug, Default)]
pub struct DiagnosticsAggregator {
    by_task: HashMap<String, ToolDiagnostic>,
}

impl DiagnosticsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A tool invocation began: counts the call and records the tool name.
    pub fn record_tool_start(&mut self, task_id: &str, tool_name: &str) {
        let diag = self.by_task.entry(task_id.to_string()).or_default();
        diag.call_count += 1;
        diag.latest_tool_name = tool_name.to_string();
    }

    /// A tool invocation finished: records the tool name only. Start is the
    /// counting event.
    pub fn record_tool_end(&mut self, task_id: &str, tool_name: &str) {
        let diag = self.by_task.entry(task_id.to_string()).or_default();
        diag.latest_tool_name = tool_name.to_string();
    }

    /// Merge a batch-sourced diagnostic into whatever the live feed already
    /// recorded for this task.
    ///
    /// The merged count is the max of both sides, and the live tool name wins
    /// whenever the live side has any data.
    pub fn merge_batch(&mut self, task_id: &str, batch: &ToolDiagnostic) {
        let diag = self.by_task.entry(task_id.to_string()).or_default();
        diag.call_count = diag.call_count.max(batch.call_count);
        if !diag.has_data() || diag.latest_tool_name.is_empty() {
            diag.latest_tool_name = batch.latest_tool_name.clone();
        }
    }

    /// Diagnostic for one task, if any activity was recorded.
    pub fn get(&self, task_id: &str) -> Option<&ToolDiagnostic> {
        self.by_task.get(task_id)
    }

    /// Diagnostic for one task, defaulting to an empty record.
    pub fn get_or_empty(&self, task_id: &str) -> ToolDiagnostic {
        self.by_task.get(task_id).cloned().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.by_task.is_empty()
    }

    pub fn task_count(&self) -> usize {
        self.by_task.len()
    }
}

/// Derive the batch-side diagnostic for a task from its captured event list.
///
/// Counts `on_tool_start` events; the latest tool name is the last one named by
/// either a start or an end event.
pub fn diagnostic_from_events(events: &[ExecutionEvent]) -> ToolDiagnostic {
    let mut diag = ToolDiagnostic::default();
    for event in events {
        match event {
            ExecutionEvent::OnToolStart { tool_name, .. } => {
                diag.call_count += 1;
                diag.latest_tool_name = tool_name.clone();
            }
            ExecutionEvent::OnToolEnd { tool_name, .. } => {
                diag.latest_tool_name = tool_name.clone();
            }
            _ => {}
        }
    }
    diag
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_count_equals_starts() {
        let mut agg = DiagnosticsAggregator::new();
        agg.record_tool_start("t1", "grep");
        agg.record_tool_end("t1", "grep");
        agg.record_tool_start("t1", "edit");
        agg.record_tool_end("t1", "edit");
        agg.record_tool_start("t1", "test");

        let diag = agg.get("t1").unwrap();
        assert_eq!(diag.call_count, 3);
        assert_eq!(diag.latest_tool_name, "test");
    }

    #[test]
    fn test_tool_end_does_not_count() {
        let mut agg = DiagnosticsAggregator::new();
        agg.record_tool_end("t1", "grep");

        let diag = agg.get("t1").unwrap();
        assert_eq!(diag.call_count, 0);
        assert_eq!(diag.latest_tool_name, "grep");
        assert!(diag.has_data());
    }

    #[test]
    fn test_tasks_tracked_independently() {
        let mut agg = DiagnosticsAggregator::new();
        agg.record_tool_start("t1", "grep");
        agg.record_tool_start("t2", "edit");
        agg.record_tool_start("t2", "test");

        assert_eq!(agg.get("t1").unwrap().call_count, 1);
        assert_eq!(agg.get("t2").unwrap().call_count, 2);
        assert_eq!(agg.task_count(), 2);
        assert!(agg.get("t3").is_none());
    }

    #[test]
    fn test_merge_batch_takes_max_count() {
        let mut agg = DiagnosticsAggregator::new();
        agg.record_tool_start("t1", "grep");
        agg.record_tool_start("t1", "edit");

        // Batch saw more calls than the live feed delivered before dropping
        agg.merge_batch(
            "t1",
            &ToolDiagnostic {
                call_count: 5,
                latest_tool_name: "test".to_string(),
            },
        );
        let diag = agg.get("t1").unwrap();
        assert_eq!(diag.call_count, 5);
        // Live side had data, so its tool name wins
        assert_eq!(diag.latest_tool_name, "edit");
    }

    #[test]
    fn test_merge_batch_never_decreases_count() {
        let mut agg = DiagnosticsAggregator::new();
        for _ in 0..4 {
            agg.record_tool_start("t1", "grep");
        }
        agg.merge_batch(
            "t1",
            &ToolDiagnostic {
                call_count: 1,
                latest_tool_name: "grep".to_string(),
            },
        );
        assert_eq!(agg.get("t1").unwrap().call_count, 4);
    }

    #[test]
    fn test_merge_batch_into_empty_task_adopts_batch() {
        let mut agg = DiagnosticsAggregator::new();
        agg.merge_batch(
            "t1",
            &ToolDiagnostic {
                call_count: 2,
                latest_tool_name: "read_file".to_string(),
            },
        );
        let diag = agg.get("t1").unwrap();
        assert_eq!(diag.call_count, 2);
        assert_eq!(diag.latest_tool_name, "read_file");
    }

    #[test]
    fn test_diagnostic_from_events() {
        let events = vec![
            ExecutionEvent::OnToolStart {
                task_id: "t1".to_string(),
                tool_name: "grep".to_string(),
            },
            ExecutionEvent::OnToolEnd {
                task_id: "t1".to_string(),
                tool_name: "grep".to_string(),
            },
            ExecutionEvent::OnToolStart {
                task_id: "t1".to_string(),
                tool_name: "edit".to_string(),
            },
            ExecutionEvent::TaskComplete {
                task_id: "t1".to_string(),
                ok: true,
            },
        ];
        let diag = diagnostic_from_events(&events);
        assert_eq!(diag.call_count, 2);
        assert_eq!(diag.latest_tool_name, "edit");
    }

    #[test]
    fn test_diagnostic_from_end_only_events() {
        // Batch capture that only recorded the tail of a tool call
        let events = vec![ExecutionEvent::OnToolEnd {
            task_id: "t1".to_string(),
            tool_name: "x".to_string(),
        }];
        let diag = diagnostic_from_events(&events);
        assert_eq!(diag.call_count, 0);
        assert_eq!(diag.latest_tool_name, "x");
    }

    #[test]
    fn test_diagnostic_from_empty_events() {
        let diag = diagnostic_from_events(&[]);
        assert!(!diag.has_data());
    }
}
