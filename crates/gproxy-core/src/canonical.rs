//! The canonical request shape the Dispatch Loop and Request Translator
//! operate on, independent of whether the client hit `/v1/chat/completions`
//! or `/v1/images/generations`.

use serde_json::Value;

#[derive(Debug, Clone)]
pub struct CanonicalRequest {
    /// Logical alias as sent by the client.
    pub model: String,
    pub stream: bool,
    /// The path the client actually hit, used by the Protocol Selector's
    /// rule 1 (images forces `dalle`) and carried through for logging.
    pub endpoint: String,
    /// Full canonical JSON body (chat-completions or image-generation
    /// shape), forwarded to the Request Translator to repack per engine.
    pub body: Value,
}

impl CanonicalRequest {
    pub fn chat(
        request: &gproxy_protocol::ChatCompletionRequest,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            model: request.model.clone(),
            stream: request.stream,
            endpoint: endpoint.into(),
            body: serde_json::to_value(request).unwrap_or(Value::Null),
        }
    }

    pub fn image(
        request: &gproxy_protocol::ImageGenerationRequest,
        model: String,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            model,
            // Images never stream (spec.md §4.F); the Protocol Selector
            // forces this again defensively at selection time.
            stream: false,
            endpoint: endpoint.into(),
            body: serde_json::to_value(request).unwrap_or(Value::Null),
        }
    }
}
