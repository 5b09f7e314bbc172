pub mod auth;
pub mod canonical;
pub mod dispatch;
pub mod error;
pub mod rate_limiter;
pub mod resolver;
pub mod scheduler;
pub mod selector;
pub mod stats;
pub mod translate;
pub mod upstream;
pub mod vertex_oauth;

pub use auth::{extract_bearer, verify_admin_api_key, verify_api_key};
pub use canonical::CanonicalRequest;
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use error::GatewayError;
pub use rate_limiter::{parse_rate_limit, rate_limit_key, RateLimiter};
pub use resolver::{resolve_candidates, visible_models};
pub use scheduler::weighted_round_robin;
pub use selector::select_engine;
pub use stats::{StatsRecorder, StatsSnapshot};
pub use translate::{to_unary_response, ResponseStream};
pub use upstream::{Upstream, UpstreamBody, UpstreamError, UpstreamResponse, WreqUpstream};
