//! 4.G Response Translator: upstream wire shape -> canonical OpenAI shape,
//! for both the unary and streaming paths.

use gproxy_common::Engine;
use gproxy_protocol::{
    ChatCompletionChoice, ChatCompletionResponse, ChatCompletionStreamChoice, ChatCompletionStreamChunk,
    ChatMessage, ImageGenerationResponse,
};
use serde_json::{Map, Value};

use super::TranslateError;

/// Converts one complete upstream JSON body into the canonical
/// `ChatCompletionResponse`/image-response shape. `dalle` and the OpenAI-
/// shaped engines are already canonical and pass through unchanged; the
/// non-OpenAI engines are rebuilt into the typed canonical structs and
/// re-serialized, matching the teacher's typed-response convention
/// (`gproxy-protocol/src/openai/create_chat_completions/types.rs`).
pub fn to_unary_response(
    engine: Engine,
    model_alias: &str,
    raw: &Value,
) -> Result<Value, TranslateError> {
    match engine {
        Engine::Gpt | Engine::Openrouter => Ok(raw.clone()),
        Engine::Dalle => Ok(dalle_unary(raw)),
        Engine::Claude | Engine::VertexClaude => Ok(claude_unary(model_alias, raw)),
        Engine::Gemini | Engine::Vertex | Engine::VertexGemini => Ok(gemini_unary(model_alias, raw)),
    }
}

/// DALL-E's response is round-tripped through [`ImageGenerationResponse`]
/// rather than forwarded as a raw `Value` — `extra` carries any fields the
/// typed core (`created`, `data`) doesn't name, so nothing is lost.
fn dalle_unary(raw: &Value) -> Value {
    match serde_json::from_value::<ImageGenerationResponse>(raw.clone()) {
        Ok(typed) => serde_json::to_value(typed).unwrap_or_else(|_| raw.clone()),
        Err(_) => raw.clone(),
    }
}

fn claude_unary(model_alias: &str, raw: &Value) -> Value {
    let text = raw
        .get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();
    let finish_reason = map_claude_stop_reason(raw.get("stop_reason").and_then(Value::as_str));
    let id = raw
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| "msg".to_string());

    let response = ChatCompletionResponse {
        id,
        object: "chat.completion".to_string(),
        created: 0,
        model: model_alias.to_string(),
        choices: vec![ChatCompletionChoice {
            index: 0,
            message: ChatMessage {
                role: "assistant".to_string(),
                content: Value::String(text),
                extra: Map::new(),
            },
            finish_reason: Some(finish_reason.to_string()),
        }],
        usage: Some(claude_usage(raw.get("usage"))),
    };
    serde_json::to_value(response).unwrap_or(Value::Null)
}

fn gemini_unary(model_alias: &str, raw: &Value) -> Value {
    let candidate = raw.get("candidates").and_then(Value::as_array).and_then(|c| c.first());
    let text = candidate
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();
    let finish_reason = map_gemini_finish_reason(
        candidate.and_then(|c| c.get("finishReason")).and_then(Value::as_str),
    );

    let response = ChatCompletionResponse {
        id: "gemini".to_string(),
        object: "chat.completion".to_string(),
        created: 0,
        model: model_alias.to_string(),
        choices: vec![ChatCompletionChoice {
            index: 0,
            message: ChatMessage {
                role: "assistant".to_string(),
                content: Value::String(text),
                extra: Map::new(),
            },
            finish_reason: Some(finish_reason.to_string()),
        }],
        usage: Some(gemini_usage(raw.get("usageMetadata"))),
    };
    serde_json::to_value(response).unwrap_or(Value::Null)
}

fn claude_usage(usage: Option<&Value>) -> Value {
    let usage = match usage {
        Some(u) => u,
        None => return Value::Null,
    };
    let prompt = usage.get("input_tokens").and_then(Value::as_i64).unwrap_or(0);
    let completion = usage.get("output_tokens").and_then(Value::as_i64).unwrap_or(0);
    serde_json::json!({
        "prompt_tokens": prompt,
        "completion_tokens": completion,
        "total_tokens": prompt + completion,
    })
}

fn gemini_usage(usage: Option<&Value>) -> Value {
    let usage = match usage {
        Some(u) => u,
        None => return Value::Null,
    };
    serde_json::json!({
        "prompt_tokens": usage.get("promptTokenCount").cloned().unwrap_or(Value::from(0)),
        "completion_tokens": usage.get("candidatesTokenCount").cloned().unwrap_or(Value::from(0)),
        "total_tokens": usage.get("totalTokenCount").cloned().unwrap_or(Value::from(0)),
    })
}

fn map_claude_stop_reason(reason: Option<&str>) -> &'static str {
    match reason {
        Some("end_turn") | Some("stop_sequence") => "stop",
        Some("max_tokens") => "length",
        Some("tool_use") => "tool_calls",
        _ => "stop",
    }
}

fn map_gemini_finish_reason(reason: Option<&str>) -> &'static str {
    match reason {
        Some("MAX_TOKENS") => "length",
        Some("SAFETY") | Some("RECITATION") => "content_filter",
        _ => "stop",
    }
}

/// Per-candidate streaming state. Constructed once per dispatch attempt and
/// fed every upstream SSE event in order; emits canonical
/// `data: {...}\n\n` lines or `None` for upstream framing with nothing to
/// forward (pings, empty deltas).
///
/// Grounded on the teacher's `ClaudeToOpenAIChatCompletionStreamState`
/// pattern (`gproxy-transform/.../claude2openai_chat_completions/stream.rs`):
/// a small struct carrying the chunk identity fields plus whatever the
/// upstream's own event stream doesn't repeat on every event.
pub struct ResponseStream {
    engine: Engine,
    model_alias: String,
    id: String,
    created: i64,
    role_emitted: bool,
    finish_emitted: bool,
}

impl ResponseStream {
    pub fn new(engine: Engine, model_alias: impl Into<String>) -> Self {
        Self {
            engine,
            model_alias: model_alias.into(),
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4()),
            created: 0,
            role_emitted: false,
            finish_emitted: false,
        }
    }

    /// Consumes one upstream SSE event, returning a fully framed `data: ...`
    /// line if it produced a visible chunk.
    pub fn transform_event(&mut self, event: &SseEvent) -> Option<String> {
        if self.finish_emitted {
            return None;
        }
        match self.engine {
            Engine::Gpt | Engine::Openrouter => self.passthrough(event),
            Engine::Claude | Engine::VertexClaude => self.claude_event(event),
            Engine::Gemini | Engine::Vertex | Engine::VertexGemini => self.gemini_event(event),
            Engine::Dalle => None,
        }
    }

    /// The terminal `data: [DONE]\n\n` line every stream ends with
    /// (spec.md §4.G), emitted once the upstream's own stream is exhausted.
    pub fn done_line() -> String {
        "data: [DONE]\n\n".to_string()
    }

    fn passthrough(&mut self, event: &SseEvent) -> Option<String> {
        if event.data == "[DONE]" {
            self.finish_emitted = true;
            return None;
        }
        Some(format!("data: {}\n\n", event.data))
    }

    fn claude_event(&mut self, event: &SseEvent) -> Option<String> {
        let parsed: Value = serde_json::from_str(&event.data).ok()?;
        let event_type = parsed.get("type").and_then(Value::as_str)?;
        match event_type {
            "content_block_delta" => {
                let text = parsed
                    .get("delta")
                    .and_then(|d| d.get("text"))
                    .and_then(Value::as_str)?;
                Some(self.emit_delta(Value::String(text.to_string()), None))
            }
            "message_delta" => {
                let stop_reason = parsed
                    .get("delta")
                    .and_then(|d| d.get("stop_reason"))
                    .and_then(Value::as_str);
                stop_reason.map(|reason| {
                    self.finish_emitted = true;
                    self.emit_delta(Value::Object(Map::new()), Some(map_claude_stop_reason(Some(reason))))
                })
            }
            _ => None,
        }
    }

    fn gemini_event(&mut self, event: &SseEvent) -> Option<String> {
        let parsed: Value = serde_json::from_str(&event.data).ok()?;
        let candidate = parsed.get("candidates").and_then(Value::as_array).and_then(|c| c.first())?;
        let text = candidate
            .get("content")
            .and_then(|c| c.get("parts"))
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        let finish_reason = candidate.get("finishReason").and_then(Value::as_str);

        let delta = if text.is_empty() {
            Value::Object(Map::new())
        } else {
            Value::String(text)
        };
        let mapped_finish = finish_reason.map(|_| map_gemini_finish_reason(finish_reason));
        if mapped_finish.is_some() {
            self.finish_emitted = true;
        }
        Some(self.emit_delta(delta, mapped_finish))
    }

    fn emit_delta(&mut self, text_or_empty: Value, finish_reason: Option<&'static str>) -> String {
        let mut delta = Map::new();
        if !self.role_emitted {
            delta.insert("role".to_string(), Value::String("assistant".to_string()));
            self.role_emitted = true;
        }
        if let Value::String(text) = &text_or_empty {
            delta.insert("content".to_string(), Value::String(text.clone()));
        }
        let chunk = ChatCompletionStreamChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model_alias.clone(),
            choices: vec![ChatCompletionStreamChoice {
                index: 0,
                delta: Value::Object(delta),
                finish_reason: finish_reason.map(str::to_string),
            }],
        };
        let chunk = serde_json::to_value(chunk).unwrap_or(Value::Null);
        format!("data: {}\n\n", chunk)
    }
}
