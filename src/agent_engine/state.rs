/// Lifecycle states of one computer-use task.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskState {
    Planning { turn: u32 },
    Acting { turn: u32, instruction: String },
    Complete { turns: u32 },
    Exhausted { turns: u32 },
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Complete { .. } | TaskState::Exhausted { .. })
    }
}

/// One call the execution oracle can make against the desktop.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolAction {
    ClickElement { element_description: String },
    DoubleClickElement { element_description: String },
    RightClickElement { element_description: String },
    TypeText { text: String },
    PressKeys { keys: Vec<String> },
}

impl ToolAction {
    pub fn name(&self) -> &'static str {
        match self {
            ToolAction::ClickElement { .. } => "click_element",
            ToolAction::DoubleClickElement { .. } => "double_click_element",
            ToolAction::RightClickElement { .. } => "right_click_element",
            ToolAction::TypeText { .. } => "type_text",
            ToolAction::PressKeys { .. } => "press_keys",
        }
    }
}

/// What one acting turn did.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StepRecord {
    pub turn: u32,
    pub instruction: String,
    pub report: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Result of a task that reached `complete`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TaskOutcome {
    pub goal: String,
    /// Planning decisions consumed, including the final `complete`.
    pub planning_calls: u32,
    pub steps: Vec<StepRecord>,
}

impl TaskOutcome {
    pub fn summary(&self) -> String {
        format!("Goal '{}' achieved.", self.goal)
    }
}
