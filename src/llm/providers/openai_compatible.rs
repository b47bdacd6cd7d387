use std::collections::BTreeMap;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;

use crate::errors::{PilotError, PilotResult};
use crate::llm::provider::LlmProvider;
use crate::llm::sse_parser;
use crate::llm::types::{
    CallConfig, ChatMessage, FunctionCall, LlmResponse, StreamChunk, StreamChunkKind, ToolCall, ToolDef,
};

pub struct OpenAiCompatibleProvider {
    id: String,
    api_base: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(id: String, api_base: String, api_key: String) -> Self {
        Self {
            id,
            api_base,
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDef>,
        cfg: &CallConfig,
    ) -> PilotResult<LlmResponse> {
        let body = request_body(&messages, &tools, cfg)?;

        tracing::debug!(
            provider = %self.id,
            model = %cfg.model,
            stream = cfg.stream,
            messages = messages.len(),
            tools = tools.len(),
            "sending LLM request"
        );
        tracing::debug!(body = %sanitized(&body), "request body (sanitized, base64 omitted)");

        let response = self
            .client
            .post(&self.api_base)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(PilotError::LlmProvider(format!("{}: {}", status, err_body)));
        }

        if cfg.stream {
            self.handle_stream(response).await
        } else {
            let json: serde_json::Value = response.json().await?;
            let reply = parse_completion(json)?;
            tracing::info!(
                provider = %self.id,
                content_len = reply.content.len(),
                tool_calls = reply.tool_calls.len(),
                "LLM JSON response received"
            );
            Ok(reply)
        }
    }
}

impl OpenAiCompatibleProvider {
    /// Read an SSE body to the end (or `[DONE]`), accumulating the reply.
    async fn handle_stream(&self, response: reqwest::Response) -> PilotResult<LlmResponse> {
        let mut byte_stream = response.bytes_stream();
        let mut acc = StreamAccumulator::default();

        while let Some(result) = byte_stream.next().await {
            let bytes = result?;
            if acc.feed(&bytes) {
                break;
            }
        }
        if !acc.done {
            // Flush a final line that arrived without a trailing newline.
            acc.feed(b"\n");
        }
        if !acc.done {
            tracing::debug!(provider = %self.id, "stream ended without [DONE] marker");
        }

        let reply = acc.finish();
        tracing::info!(
            provider = %self.id,
            content_len = reply.content.len(),
            reasoning_len = reply.reasoning.len(),
            tool_calls = reply.tool_calls.len(),
            tools = ?reply.tool_calls.iter().map(|tc| tc.function.name.as_str()).collect::<Vec<_>>(),
            "LLM stream complete"
        );
        Ok(reply)
    }
}

fn request_body(messages: &[ChatMessage], tools: &[ToolDef], cfg: &CallConfig) -> PilotResult<serde_json::Value> {
    let mut body = serde_json::json!({
        "model": cfg.model,
        "messages": messages,
        "stream": cfg.stream,
        "temperature": cfg.temperature,
    });
    if !tools.is_empty() {
        body["tools"] = serde_json::to_value(tools)?;
        body["tool_choice"] = serde_json::json!("auto");
    }
    Ok(body)
}

/// Request body with every inline image URL replaced, for logging.
fn sanitized(body: &serde_json::Value) -> String {
    let mut log_body = body.clone();
    let parts = log_body
        .get_mut("messages")
        .and_then(|m| m.as_array_mut())
        .into_iter()
        .flatten()
        .filter_map(|msg| msg.get_mut("content").and_then(|c| c.as_array_mut()))
        .flatten();
    for part in parts {
        if part.get("type").and_then(|t| t.as_str()) == Some("image_url") {
            if let Some(url) = part.pointer_mut("/image_url/url") {
                *url = serde_json::Value::String("<omitted_base64_image>".to_string());
            }
        }
    }
    serde_json::to_string(&log_body).unwrap_or_default()
}

// ── Non-streaming replies ────────────────────────────────────────────────────

#[derive(Deserialize)]
struct Completion {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

fn parse_completion(json: serde_json::Value) -> PilotResult<LlmResponse> {
    let completion: Completion = serde_json::from_value(json)?;
    let Some(choice) = completion.choices.into_iter().next() else {
        return Err(PilotError::LlmProvider("completion has no choices".into()));
    };
    Ok(LlmResponse {
        content: choice.message.content.unwrap_or_default(),
        reasoning: String::new(),
        tool_calls: choice.message.tool_calls,
    })
}

// ── Streaming replies ────────────────────────────────────────────────────────

#[derive(Default)]
struct ToolCallBuilder {
    id: String,
    call_type: String,
    name: String,
    arguments: String,
}

/// Splits an SSE byte stream into lines and folds the chunks into one reply.
/// Bytes are buffered until a full line arrives, so multi-byte characters
/// split across network chunks decode intact.
#[derive(Default)]
struct StreamAccumulator {
    line_buf: Vec<u8>,
    content: String,
    reasoning: String,
    // Keyed by delta index.
    tool_calls: BTreeMap<usize, ToolCallBuilder>,
    done: bool,
}

impl StreamAccumulator {
    /// Consume raw body bytes; returns true once the stream signalled done.
    fn feed(&mut self, bytes: &[u8]) -> bool {
        self.line_buf.extend_from_slice(bytes);
        while let Some(pos) = self.line_buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.line_buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match sse_parser::parse_sse_line(line) {
                Ok(Some(chunk)) => {
                    tracing::trace!(kind = ?chunk.kind, len = chunk.content.len(), "stream chunk");
                    if self.apply(chunk) {
                        self.done = true;
                        return true;
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::debug!("SSE parse skipped: {e}"),
            }
        }
        false
    }

    fn apply(&mut self, chunk: StreamChunk) -> bool {
        match chunk.kind {
            StreamChunkKind::Reasoning => self.reasoning.push_str(&chunk.content),
            StreamChunkKind::Content => self.content.push_str(&chunk.content),
            StreamChunkKind::ToolCall => self.merge_tool_call_deltas(&chunk.content),
            StreamChunkKind::Done => return true,
            StreamChunkKind::Error => tracing::warn!(error = %chunk.content, "stream reported error"),
        }
        false
    }

    /// Merge streamed tool-call fragments; names and arguments arrive in pieces.
    fn merge_tool_call_deltas(&mut self, raw: &str) {
        let Ok(deltas) = serde_json::from_str::<Vec<serde_json::Value>>(raw) else {
            return;
        };
        for delta in deltas {
            let idx = delta["index"].as_u64().unwrap_or(0) as usize;
            let entry = self.tool_calls.entry(idx).or_default();
            if let Some(id) = delta["id"].as_str().filter(|s| !s.is_empty()) {
                entry.id = id.to_string();
            }
            if let Some(t) = delta["type"].as_str().filter(|s| !s.is_empty()) {
                entry.call_type = t.to_string();
            }
            if let Some(name) = delta["function"]["name"].as_str() {
                entry.name.push_str(name);
            }
            if let Some(args) = delta["function"]["arguments"].as_str() {
                entry.arguments.push_str(args);
            }
        }
    }

    fn finish(self) -> LlmResponse {
        let tool_calls = self
            .tool_calls
            .into_values()
            .filter(|b| !b.name.is_empty())
            .map(|b| ToolCall {
                id: b.id,
                call_type: if b.call_type.is_empty() { "function".to_string() } else { b.call_type },
                function: FunctionCall { name: b.name, arguments: b.arguments },
            })
            .collect();
        LlmResponse {
            content: self.content,
            reasoning: self.reasoning,
            tool_calls,
        }
    }
}
