mod rate_limit;

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{ConnectInfo, Json, State};
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{body::Body, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;
use waypoint_agents::{session_key, AgentSettings, Collaborators, TravelAgent, DEFAULT_MAX_TURNS};
use waypoint_core::{Coordinates, DispatchOutcome, PromptInput, RouteSide};
use waypoint_observability::AppMetrics;
use waypoint_providers::{HttpProviders, ProviderConfig};

pub use crate::rate_limit::{IpRateLimiter, RateDecision};

const MAX_PROMPT_LEN: usize = 4_000;
const MAX_SESSION_ID_LEN: usize = 128;
const MAX_BODY_BYTES: usize = 64 * 1024;
const RESET_MESSAGE: &str = "Chat context has been reset.";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub rate_limit_window: Duration,
    pub rate_limit_max: usize,
    pub allowed_origins: Vec<String>,
    pub agent: AgentSettings,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let bind = env::var("WAYPOINT_BIND").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
        let rate_limit_window = Duration::from_secs(
            env::var("WAYPOINT_RATE_LIMIT_WINDOW_SECONDS")
                .ok()
                .and_then(|value| value.parse::<u64>().ok())
                .unwrap_or(60),
        );
        let rate_limit_max = env::var("WAYPOINT_RATE_LIMIT_MAX")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .unwrap_or(60);
        let idle_ttl = chrono::Duration::seconds(
            env::var("WAYPOINT_SESSION_IDLE_TTL_SECONDS")
                .ok()
                .and_then(|value| value.parse::<i64>().ok())
                .filter(|value| *value > 0)
                .unwrap_or(60 * 60),
        );
        let max_turns = env::var("WAYPOINT_SESSION_MAX_TURNS")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_TURNS);

        Self {
            bind,
            rate_limit_window,
            rate_limit_max,
            allowed_origins: parse_allowed_origins(),
            agent: AgentSettings {
                max_turns,
                idle_ttl,
            },
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            rate_limit_window: Duration::from_secs(60),
            rate_limit_max: 60,
            allowed_origins: default_origins(),
            agent: AgentSettings::default(),
        }
    }
}

#[derive(Clone)]
pub struct ApiState {
    pub agent: Arc<TravelAgent>,
    pub metrics: Arc<AppMetrics>,
    pub limiter: IpRateLimiter,
    pub allowed_origins: Arc<Vec<String>>,
}

impl ApiState {
    pub fn new(collaborators: Collaborators, config: &ServerConfig) -> Self {
        let metrics = AppMetrics::shared();
        let agent = TravelAgent::new(collaborators, config.agent.clone(), metrics.clone());
        Self {
            agent: Arc::new(agent),
            metrics,
            limiter: IpRateLimiter::new(config.rate_limit_window, config.rate_limit_max),
            allowed_origins: Arc::new(config.allowed_origins.clone()),
        }
    }
}

/// Wires the live HTTP providers from the environment.
pub fn build_state(config: &ServerConfig) -> Result<ApiState> {
    let provider_config =
        ProviderConfig::from_env().context("provider configuration is incomplete")?;
    let providers =
        HttpProviders::from_config(&provider_config).context("failed to build providers")?;
    let collaborators = Collaborators {
        chat_model: providers.chat_model,
        geocoder: providers.geocoder,
        weather: providers.weather,
        current_location: providers.current_location,
    };
    Ok(ApiState::new(collaborators, config))
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/home/", get(home))
        .route("/health", get(health))
        .route("/process_prompt/", post(process_prompt))
        .route("/reset_context/", post(reset_context))
        .layer(build_cors_layer(&state.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp_utc: String,
    metrics: waypoint_observability::MetricsSnapshot,
    active_sessions: usize,
}

async fn home() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "Bot is live and working!" }))
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let payload = HealthResponse {
        status: "ok",
        timestamp_utc: chrono::Utc::now().to_rfc3339(),
        metrics: state.metrics.snapshot(),
        active_sessions: state.agent.active_sessions(),
    };
    (StatusCode::OK, Json(payload))
}

#[derive(Debug, Deserialize)]
struct ProcessPromptRequest {
    prompt: String,
    lat: Option<f64>,
    lon: Option<f64>,
    session_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ProcessPromptResponse {
    result: DispatchOutcome,
    session_id: String,
    unresolved: Vec<RouteSide>,
}

async fn process_prompt(
    State(state): State<ApiState>,
    Json(request): Json<ProcessPromptRequest>,
) -> Response {
    if request.prompt.chars().count() > MAX_PROMPT_LEN {
        return bad_request("prompt_too_long", "prompt exceeds 4000 characters");
    }
    if let Err(response) = validate_session_id(request.session_id.as_deref()) {
        return response;
    }
    let caller = match caller_coordinates(request.lat, request.lon) {
        Ok(caller) => caller,
        Err(response) => return response,
    };

    let session_id = session_key(request.session_id.as_deref());
    let outcome = state
        .agent
        .handle_prompt(PromptInput {
            session_id: request.session_id,
            text: request.prompt,
            caller,
        })
        .await;

    let payload = ProcessPromptResponse {
        unresolved: outcome.payload.unresolved_sides(),
        result: outcome,
        session_id,
    };
    (StatusCode::OK, Json(payload)).into_response()
}

#[derive(Debug, Default, Deserialize)]
struct ResetRequest {
    session_id: Option<String>,
}

async fn reset_context(
    State(state): State<ApiState>,
    request: Option<Json<ResetRequest>>,
) -> Response {
    let request = request.map(|Json(body)| body).unwrap_or_default();
    if let Err(response) = validate_session_id(request.session_id.as_deref()) {
        return response;
    }

    match state
        .agent
        .reset_conversation(request.session_id.as_deref())
        .await
    {
        Ok(acknowledgement) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "message": RESET_MESSAGE,
                "session_id": session_key(request.session_id.as_deref()),
                "acknowledgement": acknowledgement,
            })),
        )
            .into_response(),
        Err(err) => {
            warn!(error = %err, "conversation reset failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({
                    "error": "reset_failed",
                    "message": "the conversational model did not acknowledge the reset"
                })),
            )
                .into_response()
        }
    }
}

/// Both halves or neither; a lone or out-of-range value is rejected.
fn caller_coordinates(lat: Option<f64>, lon: Option<f64>) -> Result<Option<Coordinates>, Response> {
    match (lat, lon) {
        (None, None) => Ok(None),
        (Some(lat), Some(lon)) => {
            let at = Coordinates::new(lat, lon);
            if at.is_valid() {
                Ok(Some(at))
            } else {
                Err(bad_request(
                    "invalid_coordinates",
                    "lat must be within [-90, 90] and lon within [-180, 180]",
                ))
            }
        }
        _ => Err(bad_request(
            "invalid_coordinates",
            "lat and lon must be provided together",
        )),
    }
}

fn validate_session_id(session_id: Option<&str>) -> Result<(), Response> {
    let Some(session_id) = session_id else {
        return Ok(());
    };
    let acceptable = session_id.len() <= MAX_SESSION_ID_LEN
        && session_id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | ':'));
    if acceptable {
        Ok(())
    } else {
        Err(bad_request(
            "invalid_session_id",
            "session_id must be at most 128 characters of [A-Za-z0-9-_.:]",
        ))
    }
}

fn bad_request(error: &str, message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": error, "message": message })),
    )
        .into_response()
}

fn default_origins() -> Vec<String> {
    [
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5500",
        "http://127.0.0.1:5500",
    ]
    .iter()
    .map(|value| value.to_string())
    .collect()
}

fn parse_allowed_origins() -> Vec<String> {
    env::var("WAYPOINT_ALLOWED_ORIGINS")
        .ok()
        .map(|value| {
            value
                .split(',')
                .map(|origin| origin.trim().trim_end_matches('/').to_string())
                .filter(|origin| !origin.is_empty())
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty())
        .unwrap_or_else(default_origins)
}

fn build_cors_layer(allowed_origins: &Arc<Vec<String>>) -> CorsLayer {
    let origins = allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

async fn rate_limit_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS || is_public_endpoint(request.uri().path()) {
        return next.run(request).await;
    }

    let ip = request_ip(&request);
    match state.limiter.check(&ip) {
        RateDecision::Allowed => next.run(request).await,
        RateDecision::Limited { retry_after } => {
            let seconds = retry_after.as_secs().max(1);
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({
                    "error": "rate_limited",
                    "message": "rate limit exceeded for this IP"
                })),
            )
                .into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
            response
        }
    }
}

fn is_public_endpoint(path: &str) -> bool {
    matches!(path, "/home/" | "/health")
}

/// First hop of `x-forwarded-for`, else the peer address when the server
/// was started with connect info.
fn request_ip(request: &Request<Body>) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "local".to_string())
}
