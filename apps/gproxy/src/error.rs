use axum::response::{IntoResponse, Response};
use axum::Json;
use gproxy_core::GatewayError;

/// Thin `IntoResponse` wrapper. Kept out of `gproxy-core` so that crate
/// stays framework-agnostic (spec.md §1 treats "the HTTP server framing
/// itself" as an external collaborator); this is the seam where the
/// transport-agnostic status+body pair becomes an `axum::Response`, in the
/// spirit of the teacher's `ProxyError` (`gproxy-core/src/error.rs`).
pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0.status(), Json(self.0.body())).into_response()
    }
}
