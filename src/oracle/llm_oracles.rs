/// Oracle adapters backed by chat-completion models, one registry role each.
use std::sync::Arc;

use async_trait::async_trait;

use crate::agent_engine::tools::{parse_tool_call, ToolRunner};
use crate::config::OracleRole;
use crate::errors::PilotResult;
use crate::llm::registry::ProviderRegistry;
use crate::llm::tools::load_desktop_tools;
use crate::llm::types::{ChatMessage, LlmResponse, ToolDef};
use crate::oracle::{BboxOracle, ExecutionOracle, GridOracle, PlanningOracle};
use crate::session::EncodedImage;

const PLANNER_PROMPT: &str = r#"You are given a screenshot of a computer screen and a goal description.

Determine the next basic step necessary to complete the goal, or whether the goal is already complete. Reply only with one basic action to perform, or with "complete" if the goal is already achieved.

Prefer the keyboard. Use the mouse when it is not obvious how to reach the goal with the keyboard.

Examples:
- Goal: search the web for "UI Grounding". No browser is open and a Google Chrome icon is on the desktop. Reply: "double click Google Chrome icon". Desktop icons are ALWAYS double-clicked; other elements are clicked once.
- Goal: search the web for "cat videos". No browser is open and another window must be minimized. Reply: "press super + d" (use the mac equivalent on a mac desktop).
- Goal: search the web for "dog pictures". No browser and no icon to open one, but an applications/start menu button is visible. Reply: "press the applications button".
- Goal: open Firefox. A start menu popup with an "internet" section is open. Reply: "click the internet section".
- Goal: search the web for "UI Grounding". A browser is open but the search bar is not focused. Reply: "click the search bar".
- Goal: search the web for "UI Grounding". The search bar is focused and empty. Reply: "type "UI Grounding"".
- Goal: search the web for "UI Grounding". The focused search bar contains "UI Grounding". Reply: "press enter".
- Goal: search the web for "UI Grounding". The focused search bar contains other text. Erase it efficiently: click the box's clear button if there is one, otherwise reply "press Backspace N times" where N is the number of characters.
- Goal: search the web for "UI Grounding". The browser shows results for "UI Grounding". Reply: "complete".
- Goal: run "htop" in a terminal. A terminal in the foreground shows htop. Reply: "complete"."#;

const EXECUTOR_PROMPT: &str = r#"You are an AI assistant with computer use abilities.

Use the available tools to carry out the simple action requested by the user.

If the user asks you to press a key N times, call the press_keys tool N times instead of once.

For key combinations a single press_keys call is fine.

When the action is done, reply with a short summary and no further tool calls."#;

const GROUNDING_PROMPT: &str = r#"You will be given:

- A screenshot of a computer desktop session.
- A UI element description.

The screenshot has a grid drawn on top of it, with each cell containing a number.

Identify the grid cell that has the greatest intersection with the UI element.

If the element cannot be seen in the screenshot, reply with -1.

Reply only with a cell number or -1, with no other text."#;

const BBOX_SUFFIX: &str = "\nReturn the response in the form of a bbox";

/// One model call for `role`.
async fn ask(
    registry: &ProviderRegistry,
    role: OracleRole,
    messages: Vec<ChatMessage>,
    tools: Vec<ToolDef>,
) -> PilotResult<LlmResponse> {
    let binding = registry.bind(role)?;
    tracing::debug!(%role, provider = binding.provider.name(), model = %binding.call.model, "oracle call");
    binding.provider.chat(messages, tools, &binding.call).await
}

pub struct LlmPlanningOracle {
    registry: Arc<ProviderRegistry>,
}

impl LlmPlanningOracle {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl PlanningOracle for LlmPlanningOracle {
    async fn next_step(&self, frame: &EncodedImage, goal: &str) -> PilotResult<String> {
        let messages = vec![ChatMessage::system(PLANNER_PROMPT), ChatMessage::user_with_image(goal, frame)];
        let response = ask(&self.registry, OracleRole::Planner, messages, Vec::new()).await?;
        Ok(response.content)
    }
}

/// Tool-calling loop over the desktop tools.
pub struct LlmExecutionOracle {
    registry: Arc<ProviderRegistry>,
    max_rounds: u32,
}

impl LlmExecutionOracle {
    pub fn new(registry: Arc<ProviderRegistry>, max_rounds: u32) -> Self {
        Self {
            registry,
            max_rounds: max_rounds.max(1),
        }
    }
}

#[async_trait]
impl ExecutionOracle for LlmExecutionOracle {
    async fn perform(&self, frame: &EncodedImage, instruction: &str, tools: &dyn ToolRunner) -> PilotResult<String> {
        let tool_defs = load_desktop_tools()?;
        let mut messages = vec![
            ChatMessage::system(EXECUTOR_PROMPT),
            ChatMessage::user_with_image(instruction, frame),
        ];
        let mut confirmations: Vec<String> = Vec::new();

        for round in 0..self.max_rounds {
            let response = ask(&self.registry, OracleRole::Executor, messages.clone(), tool_defs.clone()).await?;
            if response.tool_calls.is_empty() {
                let summary = response.content.trim();
                return Ok(if summary.is_empty() { confirmations.join("; ") } else { summary.to_string() });
            }

            messages.push(ChatMessage::assistant(response.content.clone(), response.tool_calls.clone()));
            for tc in &response.tool_calls {
                let output = match parse_tool_call(tc) {
                    Ok(action) => {
                        tracing::info!(round, tool = action.name(), args = %tc.function.arguments, "tool call");
                        let confirmation = tools.run(&action).await?;
                        confirmations.push(confirmation.clone());
                        confirmation
                    }
                    Err(e) => {
                        tracing::warn!(round, tool = %tc.function.name, error = %e, "rejected tool call");
                        format!("error: {e}")
                    }
                };
                messages.push(ChatMessage::tool_result(tc.id.clone(), output));
            }
        }

        tracing::warn!(rounds = self.max_rounds, instruction, "tool rounds exhausted");
        Ok(confirmations.join("; "))
    }
}

pub struct LlmGridOracle {
    registry: Arc<ProviderRegistry>,
}

impl LlmGridOracle {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl GridOracle for LlmGridOracle {
    async fn choose_cell(&self, annotated: &EncodedImage, description: &str) -> PilotResult<String> {
        let messages = vec![
            ChatMessage::system(GROUNDING_PROMPT),
            ChatMessage::user_with_image(description, annotated),
        ];
        let response = ask(&self.registry, OracleRole::Grounding, messages, Vec::new()).await?;
        Ok(response.content)
    }
}

/// Grounding model that answers with box tokens (OS-Atlas style).
pub struct LlmBboxOracle {
    registry: Arc<ProviderRegistry>,
}

impl LlmBboxOracle {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl BboxOracle for LlmBboxOracle {
    async fn locate_bbox(&self, frame: &EncodedImage, description: &str) -> PilotResult<String> {
        let prompt = format!("{description}{BBOX_SUFFIX}");
        let messages = vec![ChatMessage::user_with_image(prompt, frame)];
        let response = ask(&self.registry, OracleRole::Bbox, messages, Vec::new()).await?;
        Ok(response.content)
    }
}
