use std::net::SocketAddr;
use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::StreamExt;
use gproxy_core::{
    extract_bearer, parse_rate_limit, rate_limit_key, to_unary_response, verify_admin_api_key,
    verify_api_key, visible_models, CanonicalRequest, DispatchOutcome, GatewayError, UpstreamBody,
};
use gproxy_protocol::{ChatCompletionRequest, ImageGenerationRequest};
use rand::Rng;
use time::OffsetDateTime;

use crate::error::ApiError;
use crate::state::SharedState;

const API_KEY_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";
const DEFAULT_RATE_LIMIT: (u32, u64) = (60, 60);

pub const CHAT_PATH: &str = "/v1/chat/completions";
pub const CHAT_PATH_LEGACY: &str = "/uni/v1/chat/completions";
pub const IMAGES_PATH: &str = "/v1/images/generations";
pub const IMAGES_PATH_LEGACY: &str = "/uni/v1/images/generations";

fn bearer(headers: &HeaderMap) -> Option<&str> {
    extract_bearer(headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok()))
}

fn client_ip(addr: &SocketAddr) -> String {
    addr.ip().to_string()
}

pub async fn chat_completions(
    state: State<SharedState>,
    connect_info: ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    dispatch_chat(state.0, connect_info.0, &headers, CHAT_PATH, &body).await
}

pub async fn chat_completions_legacy(
    state: State<SharedState>,
    connect_info: ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    dispatch_chat(state.0, connect_info.0, &headers, CHAT_PATH_LEGACY, &body).await
}

/// Shared body for both the canonical and legacy (`/uni/v1/...`) mirrors
/// (SPEC_FULL.md §11 "legacy path mirror").
async fn dispatch_chat(
    state: SharedState,
    addr: SocketAddr,
    headers: &HeaderMap,
    path: &'static str,
    body: &[u8],
) -> Response {
    let start = Instant::now();
    let arrival = OffsetDateTime::now_utc();
    let ip = client_ip(&addr);

    let result = handle_chat(&state, headers, path, &ip, body).await;
    state.stats.record_request("POST", path, &ip, start.elapsed(), arrival);

    match result {
        Ok(response) => response,
        Err(err) => ApiError::from(err).into_response(),
    }
}

async fn handle_chat(
    state: &SharedState,
    headers: &HeaderMap,
    path: &str,
    ip: &str,
    body: &[u8],
) -> Result<Response, GatewayError> {
    let token = bearer(headers).ok_or(GatewayError::AuthInvalid)?;
    let token = verify_api_key(&state.config, token)?.to_string();
    enforce_rate_limit(state, Some(&token), ip)?;

    let request: ChatCompletionRequest =
        serde_json::from_slice(body).map_err(|_| GatewayError::NoMatchingModel)?;
    let model_alias = request.model.clone();
    let canonical = CanonicalRequest::chat(&request, path);

    let outcome = state
        .dispatcher
        .request_model(&canonical, &token, &state.config, &state.upstream, &state.stats)
        .await?;

    Ok(render_outcome(outcome, &model_alias))
}

pub async fn images_generations(
    state: State<SharedState>,
    connect_info: ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    dispatch_images(state.0, connect_info.0, &headers, IMAGES_PATH, &body).await
}

pub async fn images_generations_legacy(
    state: State<SharedState>,
    connect_info: ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    dispatch_images(state.0, connect_info.0, &headers, IMAGES_PATH_LEGACY, &body).await
}

async fn dispatch_images(
    state: SharedState,
    addr: SocketAddr,
    headers: &HeaderMap,
    path: &'static str,
    body: &[u8],
) -> Response {
    let start = Instant::now();
    let arrival = OffsetDateTime::now_utc();
    let ip = client_ip(&addr);

    let result = handle_images(&state, headers, path, &ip, body).await;
    state.stats.record_request("POST", path, &ip, start.elapsed(), arrival);

    match result {
        Ok(response) => response,
        Err(err) => ApiError::from(err).into_response(),
    }
}

async fn handle_images(
    state: &SharedState,
    headers: &HeaderMap,
    path: &str,
    ip: &str,
    body: &[u8],
) -> Result<Response, GatewayError> {
    let token = bearer(headers).ok_or(GatewayError::AuthInvalid)?;
    let token = verify_api_key(&state.config, token)?.to_string();
    enforce_rate_limit(state, Some(&token), ip)?;

    let request: ImageGenerationRequest =
        serde_json::from_slice(body).map_err(|_| GatewayError::NoMatchingModel)?;
    let model_alias = request.model.clone().ok_or(GatewayError::NoMatchingModel)?;
    let canonical = CanonicalRequest::image(&request, model_alias.clone(), path);

    let outcome = state
        .dispatcher
        .request_model(&canonical, &token, &state.config, &state.upstream, &state.stats)
        .await?;

    Ok(render_outcome(outcome, &model_alias))
}

/// Builds the HTTP response from a successful dispatch: an SSE stream piped
/// through the Response Translator's per-engine state machine, or a single
/// JSON body, matching spec.md §4.G's unary/streaming split.
fn render_outcome(outcome: DispatchOutcome, model_alias: &str) -> Response {
    if !outcome.stream {
        let body = match outcome.body {
            UpstreamBody::Buffered(bytes) => bytes,
            // The translator only asked for a stream when canonical.stream
            // was true; a non-stream outcome never carries a pull stream.
            UpstreamBody::Stream(_) => {
                return ApiError::from(GatewayError::ProviderFailed).into_response();
            }
        };
        let raw: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        let canonical_body =
            to_unary_response(outcome.engine, model_alias, &raw).unwrap_or(serde_json::Value::Null);
        return (StatusCode::OK, Json(canonical_body)).into_response();
    }

    let mut sse_state = outcome.new_sse_state(model_alias);
    let byte_stream = match outcome.body {
        UpstreamBody::Stream(stream) => stream,
        UpstreamBody::Buffered(bytes) => {
            Box::pin(futures_util::stream::once(async move {
                Ok::<_, gproxy_core::UpstreamError>(bytes)
            }))
        }
    };

    let mut parser = gproxy_protocol::SseParser::new();
    let lines = byte_stream.flat_map(move |chunk| {
        let events = match chunk {
            Ok(bytes) => parser.push_bytes(&bytes),
            Err(_) => Vec::new(),
        };
        let rendered: Vec<std::io::Result<Bytes>> = events
            .iter()
            .filter_map(|event| sse_state.transform_event(event))
            .map(|line| Ok(Bytes::from(line)))
            .collect();
        futures_util::stream::iter(rendered)
    });
    let terminated = lines.chain(futures_util::stream::once(async {
        Ok(Bytes::from(gproxy_core::ResponseStream::done_line()))
    }));

    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/event-stream")
        .header("cache-control", "no-cache")
        .body(Body::from_stream(terminated))
        .unwrap_or_else(|_| ApiError::from(GatewayError::ProviderFailed).into_response())
}

/// Applies to every route (spec.md §6 states the rule with no per-route
/// exclusion; `examples/original_source/main.py` attaches
/// `rate_limit_dependency` to `/generate-api-key` and `/stats` alongside the
/// dispatch routes). `token` is `None` where no verified token exists yet
/// (`/generate-api-key`), which falls back to the default limit and keys
/// purely on IP.
fn enforce_rate_limit(state: &SharedState, token: Option<&str>, ip: &str) -> Result<(), GatewayError> {
    let (limit, window) = token
        .and_then(|token| state.config.record_for_token(token))
        .and_then(|rec| rec.preferences.rate_limit.as_deref())
        .and_then(|raw| parse_rate_limit(raw).ok())
        .unwrap_or(DEFAULT_RATE_LIMIT);

    let key = rate_limit_key(ip, token);
    if state.rate_limiter.is_rate_limited(&key, limit, window) {
        return Err(GatewayError::RateLimited);
    }
    Ok(())
}

/// `/v1/models`: visibility reuses the resolver's Stage 1 rule expansion
/// (SPEC_FULL.md §11) rather than a separate listing path. Instrumented like
/// any other non-excluded endpoint (spec.md §4.B records every request
/// except `/stats` and `/generate-api-key`).
pub async fn list_models(
    state: State<SharedState>,
    connect_info: ConnectInfo<SocketAddr>,
    path: axum::extract::OriginalUri,
    headers: HeaderMap,
) -> Response {
    let start = Instant::now();
    let arrival = OffsetDateTime::now_utc();
    let ip = client_ip(&connect_info.0);

    let result = handle_list_models(&state.0, &headers).await;
    state
        .0
        .stats
        .record_request("GET", path.0.path(), &ip, start.elapsed(), arrival);

    match result {
        Ok(response) => response,
        Err(err) => ApiError::from(err).into_response(),
    }
}

async fn handle_list_models(state: &SharedState, headers: &HeaderMap) -> Result<Response, GatewayError> {
    let token = bearer(headers).ok_or(GatewayError::AuthInvalid)?;
    let token = verify_api_key(&state.config, token)?;
    let models = visible_models(&state.config, token);
    Ok(Json(serde_json::json!({
        "object": "list",
        "data": models.into_iter().map(|id| serde_json::json!({"id": id, "object": "model"})).collect::<Vec<_>>(),
    }))
    .into_response())
}

pub async fn generate_api_key(
    State(state): State<SharedState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ip = client_ip(&addr);
    enforce_rate_limit(&state, None, &ip)?;

    let mut rng = rand::rng();
    let suffix: String = (0..48)
        .map(|_| API_KEY_CHARSET[rng.random_range(0..API_KEY_CHARSET.len())] as char)
        .collect();
    Ok(Json(serde_json::json!({ "api_key": format!("sk-{suffix}") })))
}

pub async fn admin_stats(
    State(state): State<SharedState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let token = bearer(&headers).ok_or(GatewayError::AuthInvalid)?;
    verify_admin_api_key(&state.config, token)?;
    enforce_rate_limit(&state, Some(token), &client_ip(&addr))?;
    let snapshot = state.stats.snapshot();
    Ok(Json(serde_json::to_value(snapshot).unwrap_or(serde_json::Value::Null)))
}
