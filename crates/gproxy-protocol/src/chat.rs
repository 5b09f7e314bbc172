use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single chat message. `content` is left as a [`Value`] rather than a
/// typed enum of text/parts — the gateway never inspects message content
/// itself, only forwards it, so a closed content model would only add
/// translation work for engines that need to repack it (claude, gemini).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Value,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

/// Canonical request body for `/v1/chat/completions`. Fields the gateway
/// actually interprets (model, messages, stream) are typed; everything else
/// OpenAI defines (temperature, tools, tool_choice, ...) is carried in
/// `extra` and forwarded to the upstream verbatim, since the Request
/// Translator's contract (spec.md §4.F) only requires rewriting the model id
/// and URL/headers, not re-validating the whole OpenAI schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// Logical alias as sent by the client; rewritten to the upstream model
    /// id by the Request Translator before the call is issued.
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

impl ChatCompletionRequest {
    /// Returns the first message with role "system", if any. Used by engines
    /// (claude, gemini) whose wire format pulls the system prompt out of the
    /// message list into its own field.
    pub fn system_text(&self) -> Option<String> {
        self.messages
            .iter()
            .find(|m| m.role == "system")
            .and_then(|m| m.content.as_str().map(str::to_string))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChoice {
    pub index: u32,
    pub message: ChatMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Canonical non-streaming response shape. Response Translator implementations
/// for each engine build this struct from the upstream's own response before
/// serializing it back to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatCompletionChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionStreamChoice {
    pub index: u32,
    pub delta: Value,
    pub finish_reason: Option<String>,
}

/// Canonical SSE chunk shape (`data: {...}` lines), emitted by the Response
/// Translator for every engine regardless of the upstream's own event
/// framing (spec.md §4.G).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionStreamChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatCompletionStreamChoice>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_text_reads_first_system_message() {
        let req: ChatCompletionRequest = serde_json::from_value(serde_json::json!({
            "model": "gpt-4",
            "messages": [
                {"role": "system", "content": "be nice"},
                {"role": "user", "content": "hi"},
            ]
        }))
        .unwrap();
        assert_eq!(req.system_text().as_deref(), Some("be nice"));
    }

    #[test]
    fn extra_fields_round_trip() {
        let req: ChatCompletionRequest = serde_json::from_value(serde_json::json!({
            "model": "gpt-4",
            "messages": [],
            "temperature": 0.2,
            "tools": [{"type": "function"}],
        }))
        .unwrap();
        assert_eq!(req.extra.get("temperature"), Some(&Value::from(0.2)));
        assert!(req.extra.contains_key("tools"));
    }
}
