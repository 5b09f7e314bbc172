//! Thin seam between the Dispatch Loop and the actual HTTP transport, so the
//! dispatch scenarios in spec.md §8 can be driven without real network I/O.
//!
//! Grounded on the teacher's shared-client pattern
//! (`gproxy-provider-impl/src/client.rs`, `upstream_client/mod.rs`): a single
//! cached `wreq::Client` reused across calls, built once with the connect,
//! read, write and pool timeouts spec.md §5 calls for.

use std::pin::Pin;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::translate::BuiltRequest;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, UpstreamError>> + Send>>;

pub enum UpstreamBody {
    Buffered(Bytes),
    Stream(ByteStream),
}

pub struct UpstreamResponse {
    pub status: u16,
    pub body: UpstreamBody,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Transport(String),
    #[error("upstream response body could not be read: {0}")]
    Body(String),
}

/// Abstracts the actual HTTP call so the dispatch loop can be tested with a
/// scripted double (spec.md §8 scenarios) instead of real network access.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn call(&self, built: &BuiltRequest, stream: bool) -> Result<UpstreamResponse, UpstreamError>;
}

static SHARED_CLIENT: OnceLock<wreq::Client> = OnceLock::new();

/// Connect, read, write and pool timeouts, all per spec.md §5. `read_timeout`
/// is overridable at startup via the `TIMEOUT` environment variable
/// (SPEC_FULL.md §10.C); connect/write/pool are fixed per spec.md §5, which
/// gives them no environment override. `wreq`'s builder has no separate
/// write-phase knob, so the write bound is carried by `read_timeout` on the
/// builder (it bounds stalled progress on the connection in either
/// direction, the same way the teacher's `stream_idle_timeout` does in
/// `upstream_client/mod.rs:117`).
pub struct WreqUpstream {
    client: wreq::Client,
}

impl WreqUpstream {
    pub fn new(read_timeout: Duration) -> Self {
        let client = SHARED_CLIENT
            .get_or_init(|| {
                wreq::Client::builder()
                    .connect_timeout(Duration::from_secs(15))
                    .timeout(read_timeout)
                    .read_timeout(Duration::from_secs(30))
                    .pool_idle_timeout(Duration::from_secs(30))
                    .build()
                    .unwrap_or_else(|_| wreq::Client::new())
            })
            .clone();
        Self { client }
    }

    /// The shared client, so callers outside the dispatch loop (e.g. the
    /// Vertex OAuth token mint) can reuse the same pooled connection instead
    /// of building their own per spec.md §5's single-client invariant.
    pub fn client(&self) -> wreq::Client {
        self.client.clone()
    }
}

#[async_trait]
impl Upstream for WreqUpstream {
    async fn call(&self, built: &BuiltRequest, stream: bool) -> Result<UpstreamResponse, UpstreamError> {
        let mut request = self.client.post(&built.url).json(&built.body);
        for (name, value) in &built.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|err| UpstreamError::Transport(err.to_string()))?;
        let status = response.status().as_u16();

        let body = if stream {
            let byte_stream = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|err| UpstreamError::Transport(err.to_string())));
            UpstreamBody::Stream(Box::pin(byte_stream))
        } else {
            let bytes = response
                .bytes()
                .await
                .map_err(|err| UpstreamError::Body(err.to_string()))?;
            UpstreamBody::Buffered(bytes)
        };

        Ok(UpstreamResponse { status, body })
    }
}

#[cfg(test)]
pub mod scripted {
    use super::*;
    use std::sync::Mutex;

    /// Test-only double that replays a fixed queue of outcomes, one per
    /// call, in order — enough to drive the dispatch loop's S1-S8 scenarios
    /// deterministically.
    pub struct ScriptedUpstream {
        outcomes: Mutex<std::collections::VecDeque<ScriptedOutcome>>,
    }

    pub enum ScriptedOutcome {
        Ok { status: u16, body: Vec<u8> },
        Err(UpstreamError),
    }

    impl ScriptedUpstream {
        pub fn new(outcomes: Vec<ScriptedOutcome>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into_iter().collect()),
            }
        }
    }

    #[async_trait]
    impl Upstream for ScriptedUpstream {
        async fn call(&self, _built: &BuiltRequest, _stream: bool) -> Result<UpstreamResponse, UpstreamError> {
            let outcome = self
                .outcomes
                .lock()
                .expect("scripted upstream mutex poisoned")
                .pop_front()
                .expect("scripted upstream ran out of scripted outcomes");
            match outcome {
                ScriptedOutcome::Ok { status, body } => Ok(UpstreamResponse {
                    status,
                    body: UpstreamBody::Buffered(Bytes::from(body)),
                }),
                ScriptedOutcome::Err(err) => Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::scripted::{ScriptedOutcome, ScriptedUpstream};
    use super::*;

    fn built() -> BuiltRequest {
        BuiltRequest {
            url: "https://example.com".to_string(),
            headers: vec![],
            body: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn scripted_upstream_replays_in_order() {
        let upstream = ScriptedUpstream::new(vec![
            ScriptedOutcome::Ok { status: 500, body: b"err".to_vec() },
            ScriptedOutcome::Ok { status: 200, body: b"{\"ok\":true}".to_vec() },
        ]);
        let first = upstream.call(&built(), false).await.unwrap();
        assert_eq!(first.status, 500);
        assert!(!first.is_success());

        let second = upstream.call(&built(), false).await.unwrap();
        assert_eq!(second.status, 200);
        assert!(second.is_success());
    }
}
