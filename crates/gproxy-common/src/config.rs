use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Wire-protocol dialect used to talk to a provider.
///
/// See spec.md glossary: "Engine". `Custom` variants are not modeled — an
/// unrecognized `engine` override is a config error, not a silent fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Engine {
    Gpt,
    Claude,
    Gemini,
    Vertex,
    VertexClaude,
    VertexGemini,
    Openrouter,
    Dalle,
}

impl Engine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Gpt => "gpt",
            Engine::Claude => "claude",
            Engine::Gemini => "gemini",
            Engine::Vertex => "vertex",
            Engine::VertexClaude => "vertex-claude",
            Engine::VertexGemini => "vertex-gemini",
            Engine::Openrouter => "openrouter",
            Engine::Dalle => "dalle",
        }
    }
}

/// `provider.api_key` may be a single credential or a list, the latter
/// rotated across calls. Modeled untagged, same idiom as `StopConfiguration`
/// in the teacher's OpenAI request type (single value or array, same field).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ApiKeyCredential {
    Single(String),
    Rotating(Vec<String>),
}

impl ApiKeyCredential {
    /// Picks a credential deterministically from a monotonically increasing
    /// counter (the dispatch attempt index), so repeated rotation is stable
    /// without needing its own mutable cursor.
    pub fn pick(&self, counter: usize) -> &str {
        match self {
            ApiKeyCredential::Single(key) => key,
            ApiKeyCredential::Rotating(keys) => {
                if keys.is_empty() {
                    ""
                } else {
                    &keys[counter % keys.len()]
                }
            }
        }
    }
}

/// A configured upstream provider. See spec.md §3 "Provider".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub provider: String,
    pub base_url: String,
    pub api_key: ApiKeyCredential,
    /// logical alias -> upstream model id
    #[serde(default)]
    pub model: BTreeMap<String, String>,
    #[serde(default)]
    pub engine: Option<Engine>,
    /// Escape hatch for provider-specific fields (vertex project/region,
    /// etc.) that don't warrant their own typed field. Per the REDESIGN
    /// FLAG in spec.md §9 ("Dynamic provider config").
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Provider {
    pub fn offers(&self, alias: &str) -> bool {
        self.model.contains_key(alias)
    }

    pub fn upstream_model_id(&self, alias: &str) -> Option<&str> {
        self.model.get(alias).map(|s| s.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

fn default_true() -> bool {
    true
}

/// Per-key behavioral preferences. See spec.md §3 "ApiKeyRecord.preferences".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(rename = "USE_ROUND_ROBIN", default = "default_true")]
    pub use_round_robin: bool,
    #[serde(rename = "AUTO_RETRY", default = "default_true")]
    pub auto_retry: bool,
    #[serde(rename = "RATE_LIMIT", default)]
    pub rate_limit: Option<String>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            use_round_robin: true,
            auto_retry: true,
            rate_limit: None,
        }
    }
}

/// A caller credential record. See spec.md §3 "ApiKeyRecord".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub api: String,
    pub role: Role,
    /// Bare alias `M`, scoped `P/M`, or wildcard `P/*`.
    #[serde(default)]
    pub model: Vec<String>,
    #[serde(default)]
    pub weights: Option<BTreeMap<String, u32>>,
    #[serde(default)]
    pub preferences: Preferences,
}

/// Configuration loaded once at startup and treated as immutable at runtime
/// (spec.md §3 "Configuration").
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GatewayConfig {
    #[serde(default)]
    pub providers: Vec<Provider>,
    #[serde(default)]
    pub api_keys: Vec<ApiKeyRecord>,
}

impl GatewayConfig {
    /// `index(token)`: the derived `api_list` cursor from spec.md §3.
    pub fn index_of_token(&self, token: &str) -> Option<usize> {
        self.api_keys.iter().position(|rec| rec.api == token)
    }

    pub fn record_for_token(&self, token: &str) -> Option<&ApiKeyRecord> {
        self.api_keys.iter().find(|rec| rec.api == token)
    }

    pub fn provider_by_name(&self, name: &str) -> Option<&Provider> {
        self.providers.iter().find(|p| p.provider == name)
    }

    pub fn token_in_list(&self, token: &str) -> bool {
        self.api_keys.iter().any(|rec| rec.api == token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_rotation_wraps() {
        let cred = ApiKeyCredential::Rotating(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(cred.pick(0), "a");
        assert_eq!(cred.pick(1), "b");
        assert_eq!(cred.pick(3), "a");
    }

    #[test]
    fn preferences_default_to_true() {
        let json = r#"{}"#;
        let prefs: Preferences = serde_json::from_str(json).unwrap();
        assert!(prefs.use_round_robin);
        assert!(prefs.auto_retry);
        assert!(prefs.rate_limit.is_none());
    }

    #[test]
    fn index_of_token_matches_declared_order() {
        let cfg = GatewayConfig {
            providers: vec![],
            api_keys: vec![
                ApiKeyRecord {
                    api: "sk-a".into(),
                    role: Role::User,
                    model: vec![],
                    weights: None,
                    preferences: Preferences::default(),
                },
                ApiKeyRecord {
                    api: "sk-b".into(),
                    role: Role::Admin,
                    model: vec![],
                    weights: None,
                    preferences: Preferences::default(),
                },
            ],
        };
        assert_eq!(cfg.index_of_token("sk-b"), Some(1));
        assert_eq!(cfg.index_of_token("sk-z"), None);
    }
}
