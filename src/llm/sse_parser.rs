use serde::Deserialize;

use crate::errors::{PilotError, PilotResult};
use crate::llm::types::{StreamChunk, StreamChunkKind};

#[derive(Deserialize)]
struct SseFrame {
    #[serde(default)]
    choices: Vec<SseChoice>,
}

#[derive(Deserialize)]
struct SseChoice {
    #[serde(default)]
    delta: SseDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct SseDelta {
    reasoning_content: Option<String>,
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<serde_json::Value>,
}

fn chunk(kind: StreamChunkKind, content: impl Into<String>) -> StreamChunk {
    StreamChunk { kind, content: content.into() }
}

/// Parses one SSE line of an OpenAI-compatible stream.
/// Keep-alives, comments and non-`data:` lines yield `None`.
///
/// Within a delta, reasoning wins over tool-call fragments, which win over
/// content. Tool-call fragments are forwarded as their raw JSON array.
pub fn parse_sse_line(line: &str) -> PilotResult<Option<StreamChunk>> {
    let Some(data) = line.strip_prefix("data:").map(str::trim) else {
        return Ok(None);
    };
    if data.is_empty() {
        return Ok(None);
    }
    if data == "[DONE]" {
        return Ok(Some(chunk(StreamChunkKind::Done, "")));
    }

    let frame: SseFrame = serde_json::from_str(data).map_err(|e| PilotError::SseParsing(e.to_string()))?;
    let Some(first) = frame.choices.into_iter().next() else {
        return Ok(None);
    };
    let delta = first.delta;

    if let Some(reasoning) = delta.reasoning_content.filter(|r| !r.is_empty()) {
        return Ok(Some(chunk(StreamChunkKind::Reasoning, reasoning)));
    }
    if !delta.tool_calls.is_empty() {
        let raw = serde_json::to_string(&delta.tool_calls).map_err(|e| PilotError::SseParsing(e.to_string()))?;
        return Ok(Some(chunk(StreamChunkKind::ToolCall, raw)));
    }
    if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
        return Ok(Some(chunk(StreamChunkKind::Content, content)));
    }
    if first.finish_reason.is_some() {
        return Ok(Some(chunk(StreamChunkKind::Done, "")));
    }
    Ok(None)
}
