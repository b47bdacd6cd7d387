pub mod engine;
pub mod history;
pub mod loop_control;
pub mod state;
pub mod tools;

pub use engine::{is_complete, normalize_step, TaskExecutor};
pub use state::{StepRecord, TaskOutcome, TaskState, ToolAction};
pub use tools::{DesktopTools, ToolRunner};
