//! 4.F Request Translator: canonical request -> (url, headers, body).

use gproxy_common::{Engine, Provider};
use serde_json::{Map, Value};

use crate::canonical::CanonicalRequest;
use crate::vertex_oauth::{ServiceAccount, VertexOAuthError, VertexTokenCache};

#[derive(Debug, Clone)]
pub struct BuiltRequest {
    pub url: String,
    /// Ordered list rather than a map — engines care about case and the
    /// credential rotation picks one value per attempt, so there's no
    /// benefit to deduping by key here.
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("provider {provider:?} does not offer model {model:?}")]
    UnknownModel { provider: String, model: String },
    #[error("vertex config missing required field {0:?}")]
    MissingVertexConfig(&'static str),
    #[error("vertex service account credential is not valid JSON: {0}")]
    InvalidServiceAccount(String),
    #[error(transparent)]
    VertexOAuth(#[from] VertexOAuthError),
}

/// Builds the upstream call for one candidate. `attempt` is the dispatch
/// loop's 0-based attempt counter, used to rotate a multi-value `api_key`.
pub async fn build(
    canonical: &CanonicalRequest,
    engine: Engine,
    provider: &Provider,
    attempt: usize,
    oauth_client: &wreq::Client,
    vertex_tokens: &VertexTokenCache,
) -> Result<BuiltRequest, TranslateError> {
    let upstream_model = provider
        .upstream_model_id(&canonical.model)
        .ok_or_else(|| TranslateError::UnknownModel {
            provider: provider.provider.clone(),
            model: canonical.model.clone(),
        })?
        .to_string();

    match engine {
        Engine::Gpt | Engine::Openrouter => {
            let api_key = provider.api_key.pick(attempt).to_string();
            Ok(openai_style(canonical, provider, &upstream_model, &api_key))
        }
        Engine::Dalle => {
            let api_key = provider.api_key.pick(attempt).to_string();
            Ok(dalle(provider, &upstream_model, &api_key, &canonical.body))
        }
        Engine::Claude => {
            let api_key = provider.api_key.pick(attempt).to_string();
            Ok(claude(canonical, provider, &upstream_model, &api_key, None))
        }
        Engine::Gemini => {
            let api_key = provider.api_key.pick(attempt).to_string();
            Ok(gemini(canonical, provider, &upstream_model, &api_key, None))
        }
        Engine::Vertex | Engine::VertexClaude | Engine::VertexGemini => {
            let sa = parse_service_account(provider, attempt)?;
            let token = vertex_tokens.access_token(oauth_client, &sa).await?;
            let project = extra_str(provider, "project_id").ok_or(
                TranslateError::MissingVertexConfig("project_id"),
            )?;
            let region = extra_str(provider, "region").unwrap_or("us-central1");
            match engine {
                Engine::VertexClaude => Ok(claude(
                    canonical,
                    provider,
                    &upstream_model,
                    &token,
                    Some((project, region)),
                )),
                Engine::VertexGemini => Ok(gemini(
                    canonical,
                    provider,
                    &upstream_model,
                    &token,
                    Some((project, region)),
                )),
                _ => Ok(vertex_generic(&token, project, region, &upstream_model)),
            }
        }
    }
}

fn extra_str<'a>(provider: &'a Provider, key: &str) -> Option<&'a str> {
    provider.extra.get(key).and_then(Value::as_str)
}

fn parse_service_account(
    provider: &Provider,
    attempt: usize,
) -> Result<ServiceAccount, TranslateError> {
    let raw = provider.api_key.pick(attempt);
    serde_json::from_str(raw).map_err(|err| TranslateError::InvalidServiceAccount(err.to_string()))
}

fn openai_style(
    canonical: &CanonicalRequest,
    provider: &Provider,
    upstream_model: &str,
    api_key: &str,
) -> BuiltRequest {
    let mut body = canonical.body.clone();
    set_field(&mut body, "model", Value::String(upstream_model.to_string()));
    BuiltRequest {
        url: join(&provider.base_url, "/chat/completions"),
        headers: vec![
            ("authorization".to_string(), format!("Bearer {api_key}")),
            ("content-type".to_string(), "application/json".to_string()),
        ],
        body,
    }
}

fn dalle(provider: &Provider, upstream_model: &str, api_key: &str, body: &Value) -> BuiltRequest {
    let mut body = body.clone();
    set_field(&mut body, "model", Value::String(upstream_model.to_string()));
    // Streaming was never a legal option for this request shape (spec.md
    // §4.F); the selector already forced `canonical.stream = false` upstream
    // of us, so there is nothing to clear here.
    BuiltRequest {
        url: join(&provider.base_url, "/images/generations"),
        headers: vec![
            ("authorization".to_string(), format!("Bearer {api_key}")),
            ("content-type".to_string(), "application/json".to_string()),
        ],
        body,
    }
}

fn claude(
    canonical: &CanonicalRequest,
    provider: &Provider,
    upstream_model: &str,
    credential: &str,
    vertex: Option<(&str, &str)>,
) -> BuiltRequest {
    let messages = chat_messages(&canonical.body);
    let system = system_text(&canonical.body);
    let max_tokens = canonical
        .body
        .get("max_tokens")
        .cloned()
        .unwrap_or(Value::from(4096));

    let mut body = Map::new();
    body.insert("messages".to_string(), Value::Array(non_system_claude_messages(&messages)));
    body.insert("max_tokens".to_string(), max_tokens);
    body.insert("stream".to_string(), Value::Bool(canonical.stream));
    if let Some(system) = system {
        body.insert("system".to_string(), Value::String(system));
    }
    for key in ["temperature", "top_p", "top_k", "stop_sequences", "tools"] {
        if let Some(value) = canonical.body.get(key) {
            body.insert(key.to_string(), value.clone());
        }
    }

    let (url, headers) = match vertex {
        Some((project, region)) => {
            body.insert(
                "anthropic_version".to_string(),
                Value::String("vertex-2023-10-16".to_string()),
            );
            let action = if canonical.stream { "streamRawPredict" } else { "rawPredict" };
            let url = format!(
                "https://{region}-aiplatform.googleapis.com/v1/projects/{project}/locations/{region}/publishers/anthropic/models/{upstream_model}:{action}"
            );
            (
                url,
                vec![
                    ("authorization".to_string(), format!("Bearer {credential}")),
                    ("content-type".to_string(), "application/json".to_string()),
                ],
            )
        }
        None => {
            body.insert("model".to_string(), Value::String(upstream_model.to_string()));
            (
                if provider.base_url.ends_with("/v1/messages") {
                    provider.base_url.clone()
                } else {
                    join(&provider.base_url, "/v1/messages")
                },
                vec![
                    ("x-api-key".to_string(), credential.to_string()),
                    ("anthropic-version".to_string(), "2023-06-01".to_string()),
                    ("content-type".to_string(), "application/json".to_string()),
                ],
            )
        }
    };

    BuiltRequest { url, headers, body: Value::Object(body) }
}

fn gemini(
    canonical: &CanonicalRequest,
    provider: &Provider,
    upstream_model: &str,
    credential: &str,
    vertex: Option<(&str, &str)>,
) -> BuiltRequest {
    let messages = chat_messages(&canonical.body);
    let system = system_text(&canonical.body);

    let contents: Vec<Value> = messages
        .iter()
        .filter(|m| m.get("role").and_then(Value::as_str) != Some("system"))
        .map(|m| {
            let role = match m.get("role").and_then(Value::as_str) {
                Some("assistant") => "model",
                _ => "user",
            };
            serde_json::json!({
                "role": role,
                "parts": [{ "text": content_as_text(m.get("content")) }],
            })
        })
        .collect();

    let mut body = Map::new();
    body.insert("contents".to_string(), Value::Array(contents));
    if let Some(system) = system {
        body.insert(
            "systemInstruction".to_string(),
            serde_json::json!({ "parts": [{ "text": system }] }),
        );
    }
    let mut generation_config = Map::new();
    for key in ["temperature", "topP", "topK", "maxOutputTokens"] {
        if let Some(value) = canonical.body.get(key) {
            generation_config.insert(key.to_string(), value.clone());
        }
    }
    if !generation_config.is_empty() {
        body.insert("generationConfig".to_string(), Value::Object(generation_config));
    }

    let action = if canonical.stream { "streamGenerateContent" } else { "generateContent" };
    let (url, headers) = match vertex {
        Some((project, region)) => {
            let url = format!(
                "https://{region}-aiplatform.googleapis.com/v1/projects/{project}/locations/{region}/publishers/google/models/{upstream_model}:{action}"
            );
            (
                url,
                vec![
                    ("authorization".to_string(), format!("Bearer {credential}")),
                    ("content-type".to_string(), "application/json".to_string()),
                ],
            )
        }
        None => {
            let url = format!(
                "{}/v1beta/models/{upstream_model}:{action}{}",
                provider.base_url.trim_end_matches('/'),
                if canonical.stream { "?alt=sse" } else { "" },
            );
            (
                url,
                vec![
                    ("x-goog-api-key".to_string(), credential.to_string()),
                    ("content-type".to_string(), "application/json".to_string()),
                ],
            )
        }
    };

    BuiltRequest { url, headers, body: Value::Object(body) }
}

/// `vertex` without an inferred family (neither "claude" nor "gemini" appear
/// in the upstream model id) falls back to a bare `:predict` call.
fn vertex_generic(
    credential: &str,
    project: &str,
    region: &str,
    upstream_model: &str,
) -> BuiltRequest {
    let url = format!(
        "https://{region}-aiplatform.googleapis.com/v1/projects/{project}/locations/{region}/publishers/google/models/{upstream_model}:predict"
    );
    BuiltRequest {
        url,
        headers: vec![
            ("authorization".to_string(), format!("Bearer {credential}")),
            ("content-type".to_string(), "application/json".to_string()),
        ],
        body: serde_json::json!({ "instances": [] }),
    }
}

fn join(base: &str, suffix: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), suffix)
}

fn set_field(body: &mut Value, key: &str, value: Value) {
    if let Value::Object(map) = body {
        map.insert(key.to_string(), value);
    }
}

fn chat_messages(body: &Value) -> Vec<Value> {
    body.get("messages")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn system_text(body: &Value) -> Option<String> {
    chat_messages(body).iter().find_map(|m| {
        if m.get("role").and_then(Value::as_str) == Some("system") {
            content_as_text(m.get("content")).into()
        } else {
            None
        }
    })
}

fn non_system_claude_messages(messages: &[Value]) -> Vec<Value> {
    messages
        .iter()
        .filter(|m| m.get("role").and_then(Value::as_str) != Some("system"))
        .cloned()
        .collect()
}

fn content_as_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gproxy_common::ApiKeyCredential;
    use std::collections::BTreeMap;

    fn provider(base_url: &str) -> Provider {
        Provider {
            provider: "p".to_string(),
            base_url: base_url.to_string(),
            api_key: ApiKeyCredential::Single("sk-upstream".to_string()),
            model: BTreeMap::from([("gpt-4".to_string(), "gpt-4-0613".to_string())]),
            engine: None,
            extra: Default::default(),
        }
    }

    fn canonical(stream: bool) -> CanonicalRequest {
        CanonicalRequest {
            model: "gpt-4".to_string(),
            stream,
            endpoint: "/v1/chat/completions".to_string(),
            body: serde_json::json!({
                "model": "gpt-4",
                "messages": [
                    {"role": "system", "content": "be nice"},
                    {"role": "user", "content": "hi"},
                ],
                "stream": stream,
            }),
        }
    }

    #[tokio::test]
    async fn gpt_engine_rewrites_model_and_keeps_messages() {
        let provider = provider("https://api.openai.com/v1");
        let client = wreq::Client::new();
        let tokens = VertexTokenCache::new();
        let built = build(&canonical(false), Engine::Gpt, &provider, 0, &client, &tokens)
            .await
            .unwrap();
        assert_eq!(built.url, "https://api.openai.com/v1/chat/completions");
        assert_eq!(built.body["model"], "gpt-4-0613");
        assert_eq!(built.body["messages"].as_array().unwrap().len(), 2);
        assert!(
            built
                .headers
                .iter()
                .any(|(k, v)| k == "authorization" && v == "Bearer sk-upstream")
        );
    }

    #[tokio::test]
    async fn claude_engine_pulls_system_out_of_messages() {
        let provider = provider("https://api.anthropic.com");
        let client = wreq::Client::new();
        let tokens = VertexTokenCache::new();
        let built = build(&canonical(false), Engine::Claude, &provider, 0, &client, &tokens)
            .await
            .unwrap();
        assert_eq!(built.body["system"], "be nice");
        assert_eq!(built.body["messages"].as_array().unwrap().len(), 1);
        assert!(built.headers.iter().any(|(k, _)| k == "x-api-key"));
    }

    #[tokio::test]
    async fn gemini_engine_maps_assistant_role_to_model() {
        let provider = provider("https://generativelanguage.googleapis.com");
        let client = wreq::Client::new();
        let tokens = VertexTokenCache::new();
        let mut req = canonical(false);
        req.body["messages"]
            .as_array_mut()
            .unwrap()
            .push(serde_json::json!({"role": "assistant", "content": "ok"}));
        let built = build(&req, Engine::Gemini, &provider, 0, &client, &tokens)
            .await
            .unwrap();
        let contents = built.body["contents"].as_array().unwrap();
        assert!(contents.iter().any(|c| c["role"] == "model"));
        assert_eq!(built.body["systemInstruction"]["parts"][0]["text"], "be nice");
    }

    #[tokio::test]
    async fn dalle_forces_non_streaming_body_shape() {
        let provider = Provider {
            model: BTreeMap::from([("dall-e-3".to_string(), "dall-e-3".to_string())]),
            ..provider("https://api.openai.com/v1")
        };
        let mut req = canonical(true);
        req.model = "dall-e-3".to_string();
        req.stream = false;
        req.body = serde_json::json!({"prompt": "a cat", "n": 1});
        let client = wreq::Client::new();
        let tokens = VertexTokenCache::new();
        let built = build(&req, Engine::Dalle, &provider, 0, &client, &tokens)
            .await
            .unwrap();
        assert_eq!(built.url, "https://api.openai.com/v1/images/generations");
        assert_eq!(built.body["prompt"], "a cat");
        assert_eq!(built.body["model"], "dall-e-3");
    }

    #[tokio::test]
    async fn unknown_model_alias_is_rejected() {
        let provider = provider("https://api.openai.com/v1");
        let mut req = canonical(false);
        req.model = "not-configured".to_string();
        let client = wreq::Client::new();
        let tokens = VertexTokenCache::new();
        assert!(build(&req, Engine::Gpt, &provider, 0, &client, &tokens)
            .await
            .is_err());
    }
}
