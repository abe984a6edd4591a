use serde::{Deserialize, Serialize};

use crate::events::ExecutionEvent;
use crate::types::enums::TaskStatus;

/// Smallest unit of work within a story, executed by the remote tool-using agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub story_id: String,
    pub title: String,
    /// Display/execution sequence within the story.
    pub order: u32,
    #[serde(default)]
    pub status: TaskStatus,
}

/// A group of ordered tasks; the unit of execution the progress tracker drives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Story {
    pub id: String,
    pub epic_id: String,
    pub title: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// Dependency story ids. Informational only to this subsystem.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl Story {
    /// Task ids in declared order.
    pub fn task_ids(&self) -> Vec<&str> {
        let mut ordered: Vec<&Task> = self.tasks.iter().collect();
        ordered.sort_by_key(|t| t.order);
        ordered.iter().map(|t| t.id.as_str()).collect()
    }
}

/// Per-task entry of a batch result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Events captured server-side for this task, when the service recorded them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<ExecutionEvent>>,
}

/// Snapshot of an entire story execution, as returned by the synchronous
/// implement endpoint and embedded in the live feed's `story_end` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub run_id: String,
    pub story_id: String,
    #[serde(default)]
    pub results: Vec<TaskResult>,
}

impl BatchResult {
    /// Count of tasks that completed successfully.
    pub fn ok_count(&self) -> usize {
        self.results.iter().filter(|r| r.ok).count()
    }

    /// Count of tasks that completed with an error.
    pub fn error_count(&self) -> usize {
        self.results.iter().filter(|r| !r.ok).count()
    }
}

/// Per-story entry of a whole-run batch execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryOutcome {
    pub story_id: String,
    pub title: String,
    #[serde(default)]
    pub results: Vec<TaskResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

impl StoryOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Response of the run-level implement-all endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunBatchResult {
    pub run_id: String,
    #[serde(default)]
    pub results: Vec<StoryOutcome>,
}

/// Available tool names for a run's workspace. Display-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInventory {
    pub count: usize,
    #[serde(default)]
    pub tools: Vec<String>,
}
