use crate::errors::{PilotError, PilotResult};
use crate::llm::types::ToolDef;

/// Desktop tool definitions offered to the execution model.
/// The JSON is embedded at compile time via include_str!.
pub fn load_desktop_tools() -> PilotResult<Vec<ToolDef>> {
    let json = include_str!("../../prompts/tools/desktop.json");
    serde_json::from_str(json).map_err(|e| PilotError::Config(format!("Failed to parse desktop tools: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desktop_tools_parse() {
        let tools = load_desktop_tools().unwrap();
        let names: Vec<_> = tools.iter().map(|t| t.function.name.as_str()).collect();
        assert_eq!(
            names,
            ["click_element", "double_click_element", "right_click_element", "type_text", "press_keys"]
        );
        assert!(tools.iter().all(|t| t.def_type == "function"));
    }
}
