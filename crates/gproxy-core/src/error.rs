use gproxy_protocol::ErrorBody;
use http::StatusCode;

/// HTTP-facing error taxonomy (spec.md §7). Transport-agnostic: carries a
/// status and a JSON body, the same shape the teacher's `ProxyError` used,
/// so `apps/gproxy` only has to turn this into an `axum::response::Response`.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("missing or invalid bearer token")]
    AuthInvalid,
    #[error("permission denied")]
    PermissionDenied,
    #[error("rate limited")]
    RateLimited,
    #[error("no matching model found")]
    NoMatchingModel,
    #[error("current provider response failed")]
    ProviderFailed,
    #[error("all providers failed: {model}")]
    AllProvidersFailed { model: String },
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::AuthInvalid | GatewayError::PermissionDenied => StatusCode::FORBIDDEN,
            GatewayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::NoMatchingModel => StatusCode::NOT_FOUND,
            GatewayError::ProviderFailed | GatewayError::AllProvidersFailed { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn body(&self) -> serde_json::Value {
        match self {
            GatewayError::AuthInvalid => detail("Invalid or missing API Key"),
            GatewayError::PermissionDenied => detail("Permission denied"),
            GatewayError::RateLimited => detail("Too many requests"),
            GatewayError::NoMatchingModel => detail("No matching model found"),
            GatewayError::ProviderFailed => detail("Current provider response failed!"),
            GatewayError::AllProvidersFailed { model } => {
                detail(&format!("All providers failed: {model}"))
            }
        }
    }

    /// The inline error frame a stream terminates with after the first byte
    /// has already gone out (spec.md §4.G, §7) — it cannot be demoted to an
    /// HTTP status at that point, so it's shaped as an OpenAI error object.
    pub fn to_sse_error_line(message: &str) -> String {
        ErrorBody::new("upstream_error", message).to_sse_data_line()
    }
}

fn detail(message: &str) -> serde_json::Value {
    serde_json::json!({ "detail": message })
}
