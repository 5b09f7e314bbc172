//! Cross-module scenario tests (spec.md §8). Each per-module unit test
//! suite already checks its own component in isolation; these drive two or
//! more components together the way a real request would, matching the
//! teacher's `tests/` placement convention for tests that span modules
//! (`gproxy-provider-core/tests/credential_pool.rs`).

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use gproxy_common::{ApiKeyCredential, ApiKeyRecord, GatewayConfig, Preferences, Provider, Role};
use gproxy_core::translate::BuiltRequest;
use gproxy_core::{
    CanonicalRequest, Dispatcher, GatewayError, RateLimiter, StatsRecorder, Upstream, UpstreamBody,
    UpstreamError, UpstreamResponse,
};

/// A scripted [`Upstream`] double built only from the crate's public seam
/// (no `#[cfg(test)]` reach-in), replaying one fixed-status response per
/// call in order.
struct ScriptedUpstream {
    statuses: Mutex<VecDeque<u16>>,
}

impl ScriptedUpstream {
    fn new(statuses: Vec<u16>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into_iter().collect()),
        }
    }
}

#[async_trait]
impl Upstream for ScriptedUpstream {
    async fn call(&self, _built: &BuiltRequest, _stream: bool) -> Result<UpstreamResponse, UpstreamError> {
        let status = self
            .statuses
            .lock()
            .expect("scripted upstream mutex poisoned")
            .pop_front()
            .expect("scripted upstream ran out of scripted responses");
        Ok(UpstreamResponse {
            status,
            body: UpstreamBody::Buffered(Bytes::from_static(b"{}")),
        })
    }
}

fn provider(name: &str, aliases: &[&str]) -> Provider {
    Provider {
        provider: name.to_string(),
        base_url: "https://api.openai.com/v1".to_string(),
        api_key: ApiKeyCredential::Single("sk-upstream".to_string()),
        model: aliases
            .iter()
            .map(|a| (a.to_string(), format!("{a}-upstream")))
            .collect(),
        engine: None,
        extra: Default::default(),
    }
}

fn record(api: &str, model: Vec<&str>, weights: Option<BTreeMap<String, u32>>) -> ApiKeyRecord {
    ApiKeyRecord {
        api: api.to_string(),
        role: Role::User,
        model: model.into_iter().map(String::from).collect(),
        weights,
        preferences: Preferences::default(),
    }
}

fn chat_request(model: &str) -> CanonicalRequest {
    CanonicalRequest {
        model: model.to_string(),
        stream: false,
        endpoint: "/v1/chat/completions".to_string(),
        body: serde_json::json!({"model": model, "messages": []}),
    }
}

fn ok_upstream(n: usize) -> ScriptedUpstream {
    ScriptedUpstream::new(vec![200; n])
}

/// S2 end-to-end: weights `{A:3, B:1}` reorder resolution so the dispatch
/// loop's first attempt lands on the heavier-weighted provider, then
/// round-robins normally over the (now 2-long, reordered) candidate list on
/// subsequent calls — the weighted reorder and the round-robin cursor are
/// two distinct mechanisms composed together, not one that replicates
/// candidates by weight (see DESIGN.md's Open Question on §4.C vs. the
/// scenario's prose).
#[tokio::test]
async fn s2_weighted_resolution_orders_dispatch_by_weight_then_round_robins() {
    let config = GatewayConfig {
        providers: vec![provider("A", &["gpt-4"]), provider("B", &["gpt-4"])],
        api_keys: vec![record(
            "sk-a",
            vec!["gpt-4"],
            Some(BTreeMap::from([("A".to_string(), 3), ("B".to_string(), 1)])),
        )],
    };
    let dispatcher = Dispatcher::new(wreq::Client::new());
    let stats = StatsRecorder::new("stats.json", std::time::Duration::from_secs(3600));

    let mut served = Vec::new();
    for _ in 0..4 {
        let upstream = ok_upstream(1);
        let outcome = dispatcher
            .request_model(&chat_request("gpt-4"), "sk-a", &config, &upstream, &stats)
            .await
            .unwrap();
        served.push(outcome.provider);
    }

    // Weighted reorder places A first; the round-robin cursor then
    // alternates evenly across the two-candidate list every request after.
    assert_eq!(served, vec!["A", "B", "A", "B"]);
}

/// S5/S6 reached through the full dispatch path rather than the resolver
/// directly: a scoped rule 404s before any upstream call, a wildcard rule
/// dispatches successfully.
#[tokio::test]
async fn s5_s6_scoped_and_wildcard_rules_gate_dispatch() {
    let config = GatewayConfig {
        providers: vec![provider("openai", &["gpt-4", "gpt-3.5"]), provider("anthropic", &["claude-3"])],
        api_keys: vec![
            record("sk-scoped", vec!["openai/gpt-4"], None),
            record("sk-wild", vec!["anthropic/*"], None),
        ],
    };
    let dispatcher = Dispatcher::new(wreq::Client::new());
    let stats = StatsRecorder::new("stats.json", std::time::Duration::from_secs(3600));

    let no_calls = ScriptedUpstream::new(vec![]);
    let err = dispatcher
        .request_model(&chat_request("gpt-3.5"), "sk-scoped", &config, &no_calls, &stats)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::NoMatchingModel));

    let upstream = ok_upstream(1);
    let outcome = dispatcher
        .request_model(&chat_request("claude-3"), "sk-wild", &config, &upstream, &stats)
        .await
        .unwrap();
    assert_eq!(outcome.provider, "anthropic");
}

/// S7 reached through the rate limiter + auth together: two requests for a
/// `2/m`-limited key are admitted, a third in the same window is rejected,
/// independent of which token or IP is asking.
#[tokio::test]
async fn s7_rate_limit_blocks_third_request_in_window() {
    let limiter = RateLimiter::new();
    let key = gproxy_core::rate_limit_key("1.2.3.4", Some("sk-a"));

    assert!(!limiter.is_rate_limited(&key, 2, 60));
    assert!(!limiter.is_rate_limited(&key, 2, 60));
    assert!(limiter.is_rate_limited(&key, 2, 60));

    // A different token from the same IP has its own independent window.
    let other_key = gproxy_core::rate_limit_key("1.2.3.4", Some("sk-b"));
    assert!(!limiter.is_rate_limited(&other_key, 2, 60));
}

/// S8 end-to-end: an images request dispatched through the full loop is
/// forced non-streaming regardless of what the client asked for, and the
/// outcome reports the `dalle` engine.
#[tokio::test]
async fn s8_images_dispatch_forces_dalle_and_non_streaming() {
    let mut dalle_provider = provider("openai", &[]);
    dalle_provider
        .model
        .insert("dall-e-3".to_string(), "dall-e-3".to_string());
    let config = GatewayConfig {
        providers: vec![dalle_provider],
        api_keys: vec![record("sk-a", vec!["dall-e-3"], None)],
    };
    let dispatcher = Dispatcher::new(wreq::Client::new());
    let stats = StatsRecorder::new("stats.json", std::time::Duration::from_secs(3600));

    let mut request = chat_request("dall-e-3");
    request.endpoint = "/v1/images/generations".to_string();
    request.stream = true; // client asked for streaming; must be forced off
    request.body = serde_json::json!({"model": "dall-e-3", "prompt": "a cat"});

    let upstream = ok_upstream(1);
    let outcome = dispatcher
        .request_model(&request, "sk-a", &config, &upstream, &stats)
        .await
        .unwrap();

    assert_eq!(outcome.engine, gproxy_common::Engine::Dalle);
    assert!(!outcome.stream);
}
