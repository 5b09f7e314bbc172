use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Canonical request body for `/v1/images/generations`. The Protocol
/// Selector always forces `dalle` for this endpoint and the Request
/// Translator always forces non-streaming (spec.md §4.E rule 1, §4.F),
/// so there is no `stream` field here at all — unlike chat completions,
/// streaming was never a legal option for this request shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageGenerationRequest {
    #[serde(default)]
    pub model: Option<String>,
    pub prompt: String,
    #[serde(default)]
    pub n: Option<u32>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

/// DALL-E's own response shape is already what OpenAI-style clients expect;
/// the gateway forwards it essentially verbatim, so this type only names the
/// two fields every client reads and carries the rest in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageGenerationResponse {
    pub created: i64,
    pub data: Vec<Value>,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}
