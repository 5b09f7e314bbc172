//! 4.H Dispatch Loop: resolves candidates, selects engine, translates, calls
//! upstream, records outcome, retries.

use std::sync::atomic::{AtomicUsize, Ordering};

use gproxy_common::{GatewayConfig, Preferences};

use crate::canonical::CanonicalRequest;
use crate::error::GatewayError;
use crate::resolver::resolve_candidates;
use crate::selector::select_engine;
use crate::stats::StatsRecorder;
use crate::translate::{self, BuiltRequest, ResponseStream};
use crate::upstream::{Upstream, UpstreamBody};
use crate::vertex_oauth::VertexTokenCache;

/// Result of one successful dispatch: the provider that served it, the
/// engine used to talk to it, and the upstream body (buffered or a pull
/// stream the caller pipes through the Response Translator).
pub struct DispatchOutcome {
    pub provider: String,
    pub engine: gproxy_common::Engine,
    pub status: u16,
    pub stream: bool,
    pub body: UpstreamBody,
}

/// Holds the process-wide round-robin cursor plus everything a dispatch
/// needs to talk to upstreams. One instance lives for the process lifetime,
/// shared across all concurrent requests (spec.md §5, §9 "Global mutable
/// cursor").
pub struct Dispatcher {
    last_provider_index: AtomicUsize,
    oauth_client: wreq::Client,
    vertex_tokens: VertexTokenCache,
}

impl Dispatcher {
    /// `oauth_client` is the Vertex token-mint transport; callers should pass
    /// the same shared client `WreqUpstream` builds, not a fresh
    /// `wreq::Client::new()`, so every outbound call (dispatch and OAuth
    /// alike) pools through one client per spec.md §5.
    pub fn new(oauth_client: wreq::Client) -> Self {
        Self {
            // Wraps to `usize::MAX` so the first request's `(idx + 1) % n`
            // lands on 0, matching "one past the last attempted index" with
            // no attempts yet made.
            last_provider_index: AtomicUsize::new(usize::MAX),
            oauth_client,
            vertex_tokens: VertexTokenCache::new(),
        }
    }

    /// Operation `request_model` (spec.md §4.H). `upstream` is the transport
    /// seam (real `WreqUpstream` or a test double); `stats` records success
    /// and failure per attempted channel.
    pub async fn request_model(
        &self,
        canonical: &CanonicalRequest,
        token: &str,
        config: &GatewayConfig,
        upstream: &dyn Upstream,
        stats: &StatsRecorder,
    ) -> Result<DispatchOutcome, GatewayError> {
        let candidates = resolve_candidates(config, &canonical.model, token)?;
        let n = candidates.len();

        let preferences = config
            .record_for_token(token)
            .map(|rec| rec.preferences.clone())
            .unwrap_or_default();
        let Preferences {
            use_round_robin,
            auto_retry,
            ..
        } = preferences;

        let start = if use_round_robin {
            self.last_provider_index
                .load(Ordering::SeqCst)
                .wrapping_add(1)
                % n
        } else {
            0
        };

        // Inclusive upper bound over `0..=n` is an intentional quirk carried
        // from spec.md §4.H / §9: one extra pass gives the loop's first
        // candidate a second, final attempt after cycling through the rest.
        for i in 0..=n {
            let idx = (start + i) % n;
            self.last_provider_index.store(idx, Ordering::SeqCst);
            let provider = candidates[idx];

            match self.attempt(canonical, provider, i, upstream).await {
                Ok(outcome) => {
                    stats.record_channel_success(&provider.provider);
                    return Ok(outcome);
                }
                Err(err) => {
                    stats.record_channel_failure(&provider.provider);
                    tracing::warn!(
                        event = "upstream_attempt_failed",
                        provider = %provider.provider,
                        error = %err,
                        "upstream attempt failed"
                    );
                    if !auto_retry {
                        return Err(GatewayError::ProviderFailed);
                    }
                }
            }
        }

        Err(GatewayError::AllProvidersFailed {
            model: canonical.model.clone(),
        })
    }

    async fn attempt(
        &self,
        canonical: &CanonicalRequest,
        provider: &gproxy_common::Provider,
        attempt_index: usize,
        upstream: &dyn Upstream,
    ) -> Result<DispatchOutcome, AttemptError> {
        let upstream_model = provider
            .upstream_model_id(&canonical.model)
            .ok_or(AttemptError::NoUpstreamModel)?;
        let (engine, force_non_stream) =
            select_engine(provider, upstream_model, Some(canonical.endpoint.as_str()));

        let mut canonical = canonical.clone();
        if force_non_stream {
            canonical.stream = false;
        }

        let built: BuiltRequest = translate::build(
            &canonical,
            engine,
            provider,
            attempt_index,
            &self.oauth_client,
            &self.vertex_tokens,
        )
        .await
        .map_err(AttemptError::Translate)?;

        let response = upstream
            .call(&built, canonical.stream)
            .await
            .map_err(AttemptError::Upstream)?;

        if !response.is_success() {
            return Err(AttemptError::NonSuccessStatus(response.status));
        }

        Ok(DispatchOutcome {
            provider: provider.provider.clone(),
            engine,
            status: response.status,
            stream: canonical.stream,
            body: response.body,
        })
    }
}

#[derive(Debug, thiserror::Error)]
enum AttemptError {
    #[error("provider does not map the requested model to an upstream id")]
    NoUpstreamModel,
    #[error(transparent)]
    Translate(#[from] translate::TranslateError),
    #[error(transparent)]
    Upstream(#[from] crate::upstream::UpstreamError),
    #[error("upstream responded with status {0}")]
    NonSuccessStatus(u16),
}

impl DispatchOutcome {
    /// A fresh per-response streaming state machine for this outcome's
    /// engine, to feed upstream SSE events into as they arrive.
    pub fn new_sse_state(&self, model_alias: &str) -> ResponseStream {
        ResponseStream::new(self.engine, model_alias.to_string())
    }
}
