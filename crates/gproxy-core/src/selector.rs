//! 4.E Protocol Selector.

use gproxy_common::{Engine, Provider};

const IMAGES_PATH: &str = "/v1/images/generations";
const IMAGES_PATH_LEGACY: &str = "/uni/v1/images/generations";

/// Selects the wire-protocol engine for one candidate, applying spec.md
/// §4.E's rules in order (first match wins, override dominates inference).
/// Also reports whether streaming must be forced off (rule 1, dalle).
pub fn select_engine(provider: &Provider, upstream_model_id: &str, endpoint: Option<&str>) -> (Engine, bool) {
    if matches!(endpoint, Some(IMAGES_PATH) | Some(IMAGES_PATH_LEGACY)) {
        return (Engine::Dalle, true);
    }

    if let Some(engine) = provider.engine {
        return (engine, false);
    }

    let host = url_host(&provider.base_url);
    let path = url_path(&provider.base_url);

    if host.as_deref() == Some("generativelanguage.googleapis.com") {
        return (Engine::Gemini, false);
    }

    if host.as_deref() == Some("aiplatform.googleapis.com") {
        let engine = if upstream_model_id.contains("claude") {
            Engine::VertexClaude
        } else if upstream_model_id.contains("gemini") {
            Engine::VertexGemini
        } else {
            Engine::Vertex
        };
        return (engine, false);
    }

    if host.as_deref() == Some("api.anthropic.com") || path.ends_with("/v1/messages") {
        return (Engine::Claude, false);
    }

    if host.as_deref() == Some("openrouter.ai") {
        return (Engine::Openrouter, false);
    }

    let has_known_family = ["claude", "gpt", "gemini"]
        .iter()
        .any(|family| upstream_model_id.contains(family));
    if !has_known_family {
        return (Engine::Openrouter, false);
    }

    (Engine::Gpt, false)
}

fn url_host(url: &str) -> Option<String> {
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let host_and_port = without_scheme.split('/').next().unwrap_or("");
    host_and_port
        .split_once(':')
        .map(|(host, _)| host)
        .or(Some(host_and_port))
        .filter(|h| !h.is_empty())
        .map(str::to_string)
}

fn url_path(url: &str) -> String {
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    match without_scheme.find('/') {
        Some(idx) => without_scheme[idx..].to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gproxy_common::ApiKeyCredential;
    use std::collections::BTreeMap;

    fn provider(base_url: &str, engine: Option<Engine>) -> Provider {
        Provider {
            provider: "p".to_string(),
            base_url: base_url.to_string(),
            api_key: ApiKeyCredential::Single("k".to_string()),
            model: BTreeMap::new(),
            engine,
            extra: Default::default(),
        }
    }

    #[test]
    fn images_endpoint_always_forces_dalle_and_nonstream() {
        let p = provider("https://api.openai.com/v1", None);
        assert_eq!(
            select_engine(&p, "dall-e-3", Some(IMAGES_PATH)),
            (Engine::Dalle, true)
        );
        assert_eq!(
            select_engine(&p, "dall-e-3", Some(IMAGES_PATH_LEGACY)),
            (Engine::Dalle, true)
        );
    }

    #[test]
    fn explicit_engine_override_dominates_inference() {
        let p = provider("https://api.anthropic.com", Some(Engine::Openrouter));
        assert_eq!(
            select_engine(&p, "claude-3", None),
            (Engine::Openrouter, false)
        );
    }

    #[test]
    fn gemini_host_infers_gemini_engine() {
        let p = provider("https://generativelanguage.googleapis.com/v1beta", None);
        assert_eq!(select_engine(&p, "gemini-pro", None), (Engine::Gemini, false));
    }

    #[test]
    fn vertex_host_splits_by_model_family() {
        let p = provider("https://aiplatform.googleapis.com", None);
        assert_eq!(
            select_engine(&p, "claude-3-sonnet", None),
            (Engine::VertexClaude, false)
        );
        assert_eq!(
            select_engine(&p, "gemini-1.5-pro", None),
            (Engine::VertexGemini, false)
        );
        assert_eq!(select_engine(&p, "some-other", None), (Engine::Vertex, false));
    }

    #[test]
    fn anthropic_host_or_messages_path_infers_claude() {
        let p = provider("https://api.anthropic.com", None);
        assert_eq!(select_engine(&p, "claude-3", None), (Engine::Claude, false));
        let p2 = provider("https://my-proxy.example.com/v1/messages", None);
        assert_eq!(select_engine(&p2, "claude-3", None), (Engine::Claude, false));
    }

    #[test]
    fn unknown_model_family_falls_back_to_openrouter() {
        let p = provider("https://api.example.com/v1", None);
        assert_eq!(
            select_engine(&p, "mistral-large", None),
            (Engine::Openrouter, false)
        );
    }

    #[test]
    fn default_is_gpt() {
        let p = provider("https://api.openai.com/v1", None);
        assert_eq!(select_engine(&p, "gpt-4-0613", None), (Engine::Gpt, false));
    }
}
