/// Translation from abstract input intents to transport primitives.
use serde::{Deserialize, Serialize};

use crate::errors::{PilotError, PilotResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    #[default]
    Left,
    Middle,
    Right,
}

impl MouseButton {
    /// 1-indexed API numbering (1=left, 2=middle, 3=right); anything else is primary.
    pub fn from_code(code: u8) -> Self {
        match code {
            2 => MouseButton::Middle,
            3 => MouseButton::Right,
            _ => MouseButton::Left,
        }
    }

    /// 0-indexed button used on the wire.
    pub fn transport_index(self) -> u8 {
        match self {
            MouseButton::Left => 0,
            MouseButton::Middle => 1,
            MouseButton::Right => 2,
        }
    }
}

/// One dispatchable intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputAction {
    MoveMouse { x: i32, y: i32 },
    Click { x: i32, y: i32, button: MouseButton },
    PressKeys { keys: Vec<String> },
    TypeText { text: String },
}

/// Transport-level primitive produced by [`translate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputOp {
    Move { x: i32, y: i32 },
    Click { button: u8 },
    /// Chorded press: all keys down in order, released in reverse.
    Press(Vec<String>),
    Write(String),
}

pub const RETURN_KEY: &str = "Return";

/// Map a key name to the name the transport expects.
pub fn normalize_key(name: &str) -> String {
    let trimmed = name.trim();
    let alias = match trimmed.to_ascii_lowercase().as_str() {
        "enter" | "return" => Some("Return"),
        "control" | "ctrl" => Some("Ctrl"),
        "escape" | "esc" => Some("Escape"),
        "super" | "win" | "windows" | "meta" | "cmd" | "command" => Some("Super"),
        "delete" | "del" => Some("Delete"),
        "backspace" => Some("BackSpace"),
        "pageup" | "pgup" => Some("Page_Up"),
        "pagedown" | "pgdn" => Some("Page_Down"),
        _ => None,
    };
    if let Some(a) = alias {
        return a.to_string();
    }
    capitalize(trimmed)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Break an intent into the primitive calls that realise it.
///
/// Multi-line text becomes one write per line with a `Return` press between
/// lines; raw newlines never reach the transport's write primitive.
pub fn translate(action: &InputAction) -> PilotResult<Vec<InputOp>> {
    match action {
        InputAction::MoveMouse { x, y } => Ok(vec![InputOp::Move { x: *x, y: *y }]),
        InputAction::Click { x, y, button } => Ok(vec![
            InputOp::Move { x: *x, y: *y },
            InputOp::Click { button: button.transport_index() },
        ]),
        InputAction::PressKeys { keys } => {
            let keys: Vec<String> = keys
                .iter()
                .filter(|k| !k.trim().is_empty())
                .map(|k| normalize_key(k))
                .collect();
            if keys.is_empty() {
                return Err(PilotError::Input("empty key sequence".into()));
            }
            Ok(vec![InputOp::Press(keys)])
        }
        InputAction::TypeText { text } => Ok(segment_text(text)),
    }
}

fn segment_text(text: &str) -> Vec<InputOp> {
    let mut ops = Vec::new();
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            ops.push(InputOp::Press(vec![RETURN_KEY.to_string()]));
        }
        let line = line.strip_suffix('\r').unwrap_or(line);
        if !line.is_empty() {
            ops.push(InputOp::Write(line.to_string()));
        }
    }
    ops
}
