pub mod enums;
pub mod story;

// Re-export commonly used types for convenience
pub use enums::TaskStatus;
pub use story::{BatchResult, RunBatchResult, Story, StoryOutcome, Task, TaskResult, ToolInventory};
