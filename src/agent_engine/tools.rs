use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::agent_engine::state::ToolAction;
use crate::config::ExecutorConfig;
use crate::errors::PilotResult;
use crate::llm::types::ToolCall;
use crate::localize::Localizer;
use crate::session::{MouseButton, SessionManager};

/// Executes desktop tool calls on behalf of the execution oracle.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Returns a short confirmation for the oracle.
    async fn run(&self, action: &ToolAction) -> PilotResult<String>;
}

/// The five desktop tools bound to one live session.
pub struct DesktopTools {
    session: Arc<SessionManager>,
    localizer: Arc<Localizer>,
    double_click_delay: Duration,
}

impl DesktopTools {
    pub fn new(session: Arc<SessionManager>, localizer: Arc<Localizer>, config: &ExecutorConfig) -> Self {
        Self {
            session,
            localizer,
            double_click_delay: config.double_click_delay(),
        }
    }

    /// Localize `element` on a fresh frame. `None` when it is not visible.
    async fn resolve(&self, element: &str) -> PilotResult<Option<(i32, i32)>> {
        let point = self.localizer.query_element_position(&self.session, element).await?;
        match point {
            Some((x, y)) => tracing::debug!(element, x, y, "element resolved"),
            None => tracing::info!(element, "element not visible"),
        }
        Ok(point)
    }

    async fn click_element(&self, element: &str, button: MouseButton, clicks: u32, verb: &str) -> PilotResult<String> {
        tracing::info!(element, ?button, clicks, verb, "clicking element");
        let Some((x, y)) = self.resolve(element).await? else {
            return Ok(format!("could not find {element} on the screen; nothing was {verb}"));
        };
        for i in 0..clicks {
            if i > 0 {
                tokio::time::sleep(self.double_click_delay).await;
            }
            self.session.click(x, y, button).await?;
        }
        Ok(format!("{verb} on {element}"))
    }
}

#[async_trait]
impl ToolRunner for DesktopTools {
    async fn run(&self, action: &ToolAction) -> PilotResult<String> {
        if !self.session.is_connected() {
            return Err(crate::errors::PilotError::not_connected());
        }
        match action {
            ToolAction::ClickElement { element_description } => {
                self.click_element(element_description, MouseButton::Left, 1, "clicked").await
            }
            ToolAction::DoubleClickElement { element_description } => {
                self.click_element(element_description, MouseButton::Left, 2, "double-clicked").await
            }
            ToolAction::RightClickElement { element_description } => {
                self.click_element(element_description, MouseButton::Right, 1, "right-clicked").await
            }
            ToolAction::TypeText { text } => {
                tracing::info!(chars = text.chars().count(), "typing text");
                self.session.type_text(text).await?;
                Ok(format!("typed text {text}"))
            }
            ToolAction::PressKeys { keys } => {
                tracing::info!(keys = %keys.join(", "), "pressing keys");
                self.session.press_keys(keys).await?;
                Ok(format!("pressed keys {}", keys.join(", ")))
            }
        }
    }
}

// ── Tool call parser ──────────────────────────────────────────────────────────

/// Map a model tool call onto a `ToolAction`. Errors are returned to the
/// model as the tool result.
pub fn parse_tool_call(tc: &ToolCall) -> Result<ToolAction, String> {
    let args: serde_json::Value = serde_json::from_str(&tc.function.arguments)
        .map_err(|e| format!("arguments for {} are not valid JSON: {e}", tc.function.name))?;

    let element = || -> Result<String, String> {
        args["element_description"]
            .as_str()
            .or_else(|| args["element"].as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| format!("{} requires a non-empty element_description", tc.function.name))
    };

    match tc.function.name.as_str() {
        "click_element" => Ok(ToolAction::ClickElement { element_description: element()? }),
        "double_click_element" => Ok(ToolAction::DoubleClickElement { element_description: element()? }),
        "right_click_element" => Ok(ToolAction::RightClickElement { element_description: element()? }),
        "type_text" => args["text"]
            .as_str()
            .map(|text| ToolAction::TypeText { text: text.to_string() })
            .ok_or_else(|| "type_text requires a text argument".to_string()),
        "press_keys" => {
            let keys: Vec<String> = match &args["keys"] {
                serde_json::Value::Array(items) => {
                    items.iter().filter_map(|k| k.as_str()).map(str::to_string).collect()
                }
                serde_json::Value::String(s) => s.split('+').map(|k| k.trim().to_string()).collect(),
                _ => Vec::new(),
            };
            let keys: Vec<String> = keys.into_iter().filter(|k| !k.is_empty()).collect();
            if keys.is_empty() {
                Err("press_keys requires at least one key".to_string())
            } else {
                Ok(ToolAction::PressKeys { keys })
            }
        }
        other => Err(format!("unknown tool: {other}")),
    }
}
