use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Last known status of a task within a story execution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Ok,
    Error,
    Unknown,
}

impl TaskStatus {
    /// Returns true if this is a terminal status (the task will not change again
    /// within the current attempt).
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Ok | TaskStatus::Error)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Ok => write!(f, "ok"),
            TaskStatus::Error => write!(f, "error"),
            TaskStatus::Unknown => write!(f, "unknown"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "ok" => Ok(TaskStatus::Ok),
            "error" => Ok(TaskStatus::Error),
            "unknown" => Ok(TaskStatus::Unknown),
            _ => Err(format!(
                "Unknown task status: '{s}'. Expected: pending, ok, error, unknown"
            )),
        }
    }
}
