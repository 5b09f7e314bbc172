use std::sync::Arc;

use gproxy_common::GatewayConfig;
use gproxy_core::{Dispatcher, RateLimiter, StatsRecorder, WreqUpstream};

/// Everything a request handler needs, shared across the process per
/// spec.md §5 ("Configuration: immutable after load; freely read-shared").
pub struct AppState {
    pub config: GatewayConfig,
    pub dispatcher: Dispatcher,
    pub rate_limiter: RateLimiter,
    pub stats: StatsRecorder,
    pub upstream: WreqUpstream,
}

pub type SharedState = Arc<AppState>;
