use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tower::ServiceExt;
use waypoint_agents::Collaborators;
use waypoint_api::{build_router, ApiState, ServerConfig};
use waypoint_core::{
    ChatModel, ChatTurn, Coordinates, CurrentLocation, CurrentPosition, Geocoder, WeatherLookup,
    CLASSIFIER_PREAMBLE,
};

const READY: &str = "Ready to classify.";

/// Answers each user text with a canned reply.
#[derive(Default)]
struct PromptBook {
    replies: HashMap<&'static str, &'static str>,
    refuse_preamble: AtomicBool,
}

#[async_trait]
impl ChatModel for PromptBook {
    async fn complete(&self, history: &[ChatTurn]) -> Result<String> {
        let last = history.last().ok_or_else(|| anyhow!("empty history"))?;
        if last.text == CLASSIFIER_PREAMBLE {
            if self.refuse_preamble.load(Ordering::SeqCst) {
                return Err(anyhow!("model offline"));
            }
            return Ok(READY.to_string());
        }
        self.replies
            .get(last.text.as_str())
            .map(|reply| reply.to_string())
            .ok_or_else(|| anyhow!("no reply for {:?}", last.text))
    }
}

struct Gazetteer(HashMap<&'static str, Coordinates>);

#[async_trait]
impl Geocoder for Gazetteer {
    async fn geocode(&self, address: &str) -> Result<Vec<Coordinates>> {
        Ok(self.0.get(address).copied().into_iter().collect())
    }
}

#[derive(Default)]
struct Forecasts {
    requested: Mutex<Vec<Coordinates>>,
}

#[async_trait]
impl WeatherLookup for Forecasts {
    async fn weather_at(&self, at: Coordinates) -> Result<Value> {
        self.requested.lock().push(at);
        Ok(json!({"coord": {"lat": at.lat, "lon": at.lon}, "weather": [{"main": "Clear"}]}))
    }
}

struct Here;

#[async_trait]
impl CurrentLocation for Here {
    async fn current_location(&self) -> Result<CurrentPosition> {
        Ok(CurrentPosition {
            coordinates: Coordinates::new(52.52, 13.405),
            city: Some("Berlin".to_string()),
        })
    }
}

struct Harness {
    state: ApiState,
    model: Arc<PromptBook>,
    forecasts: Arc<Forecasts>,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    fn with_config(config: ServerConfig) -> Self {
        let model = Arc::new(PromptBook {
            replies: HashMap::from([
                (
                    "take me to the eiffel tower",
                    r#"("Type_1", ["null", "Eiffel Tower"])"#,
                ),
                (
                    "from the louvre to atlantis",
                    r#"("Type 1", ["Louvre", "Atlantis"])"#,
                ),
                ("weather here?", r#"("Type_2", "null")"#),
                ("weather in paris", r#"("Type2", "Paris")"#),
                ("tell me a joke", r#"("Type_3", "Why did the map blush?")"#),
                ("what now", r#"("Type_9", "x")"#),
                ("garbled", "Sure! Here you go: Type_1"),
            ]),
            refuse_preamble: AtomicBool::new(false),
        });
        let forecasts = Arc::new(Forecasts::default());
        let gazetteer = Gazetteer(HashMap::from([
            ("EiffelTower", Coordinates::new(48.8584, 2.2945)),
            ("Louvre", Coordinates::new(48.8606, 2.3376)),
            ("Paris", Coordinates::new(48.8566, 2.3522)),
        ]));
        let state = ApiState::new(
            Collaborators {
                chat_model: model.clone(),
                geocoder: Arc::new(gazetteer),
                weather: forecasts.clone(),
                current_location: Arc::new(Here),
            },
            &config,
        );
        Self {
            state,
            model,
            forecasts,
        }
    }

    fn app(&self) -> Router {
        build_router(self.state.clone())
    }
}

fn prompt_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/process_prompt/")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn home_reports_liveness() {
    let app = Harness::new().app();

    let response = app
        .oneshot(Request::builder().uri("/home/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({"message": "Bot is live and working!"})
    );
}

#[tokio::test]
async fn health_exposes_metrics_and_sessions() {
    let harness = Harness::new();
    let app = harness.app();

    app.clone()
        .oneshot(prompt_request(json!({"prompt": "tell me a joke", "session_id": "h1"})))
        .await
        .unwrap();
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let parsed = json_body(response).await;
    assert_eq!(parsed["status"], "ok");
    assert_eq!(parsed["active_sessions"], 1);
    assert_eq!(parsed["metrics"]["requests_total"], 1);
    assert_eq!(parsed["metrics"]["intent_conversation_total"], 1);
}

#[tokio::test]
async fn route_prompt_uses_caller_position_for_missing_start() {
    let app = Harness::new().app();

    let response = app
        .oneshot(prompt_request(json!({
            "prompt": "take me to the eiffel tower",
            "lat": 48.85,
            "lon": 2.35
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let parsed = json_body(response).await;
    assert_eq!(
        parsed["result"],
        json!([
            1,
            r#"("Type_1", ["null", "Eiffel Tower"])"#,
            [48.85, 2.35, 48.8584, 2.2945]
        ])
    );
    assert_eq!(parsed["session_id"], "default");
    assert_eq!(parsed["unresolved"], json!([]));
}

#[tokio::test]
async fn unresolved_route_end_is_zeroed_and_listed() {
    let app = Harness::new().app();

    let response = app
        .oneshot(prompt_request(json!({"prompt": "from the louvre to atlantis"})))
        .await
        .unwrap();

    let parsed = json_body(response).await;
    assert_eq!(parsed["result"][0], 1);
    assert_eq!(parsed["result"][2], json!([48.8606, 2.3376, 0.0, 0.0]));
    assert_eq!(parsed["unresolved"], json!(["end"]));
}

#[tokio::test]
async fn weather_without_place_uses_current_location() {
    let harness = Harness::new();

    let response = harness
        .app()
        .oneshot(prompt_request(json!({"prompt": "weather here?"})))
        .await
        .unwrap();

    let parsed = json_body(response).await;
    assert_eq!(parsed["result"][0], 2);
    assert_eq!(parsed["result"][2]["weather"][0]["main"], "Clear");
    assert_eq!(
        *harness.forecasts.requested.lock(),
        vec![Coordinates::new(52.52, 13.405)]
    );
}

#[tokio::test]
async fn weather_for_named_place_geocodes_it() {
    let harness = Harness::new();

    let response = harness
        .app()
        .oneshot(prompt_request(json!({"prompt": "weather in paris"})))
        .await
        .unwrap();

    let parsed = json_body(response).await;
    assert_eq!(parsed["result"][0], 2);
    assert_eq!(parsed["result"][2]["coord"]["lat"], 48.8566);
    assert_eq!(
        *harness.forecasts.requested.lock(),
        vec![Coordinates::new(48.8566, 2.3522)]
    );
}

#[tokio::test]
async fn conversational_reply_keeps_raw_text() {
    let app = Harness::new().app();

    let response = app
        .oneshot(prompt_request(json!({"prompt": "tell me a joke"})))
        .await
        .unwrap();

    let parsed = json_body(response).await;
    assert_eq!(
        parsed["result"],
        json!([3, r#"("Type_3", "Why did the map blush?")"#, []])
    );
}

#[tokio::test]
async fn unknown_tag_and_garbage_are_not_actionable() {
    let app = Harness::new().app();

    let response = app
        .clone()
        .oneshot(prompt_request(json!({"prompt": "what now"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await["result"],
        json!([null, "Unknown response type", []])
    );

    let response = app
        .oneshot(prompt_request(json!({"prompt": "garbled"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await["result"],
        json!([null, "Error processing user prompt", []])
    );
}

#[tokio::test]
async fn lone_latitude_is_rejected() {
    let app = Harness::new().app();

    let response = app
        .oneshot(prompt_request(json!({"prompt": "tell me a joke", "lat": 10.0})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_coordinates");
}

#[tokio::test]
async fn reset_without_body_resets_default_session() {
    let harness = Harness::new();
    let app = harness.app();

    app.clone()
        .oneshot(prompt_request(json!({"prompt": "tell me a joke"})))
        .await
        .unwrap();
    assert_eq!(harness.state.agent.history(None).await.len(), 4);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/reset_context/")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let parsed = json_body(response).await;
    assert_eq!(parsed["message"], "Chat context has been reset.");
    assert_eq!(parsed["acknowledgement"], READY);
    assert_eq!(harness.state.agent.history(None).await.len(), 2);
}

#[tokio::test]
async fn reset_only_touches_named_session() {
    let harness = Harness::new();
    let app = harness.app();

    for session in ["alpha", "beta"] {
        app.clone()
            .oneshot(prompt_request(
                json!({"prompt": "tell me a joke", "session_id": session}),
            ))
            .await
            .unwrap();
    }

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/reset_context/")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({"session_id": "alpha"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(harness.state.agent.history(Some("alpha")).await.len(), 2);
    assert_eq!(harness.state.agent.history(Some("beta")).await.len(), 4);
}

#[tokio::test]
async fn failed_reset_is_a_bad_gateway() {
    let harness = Harness::new();
    harness.model.refuse_preamble.store(true, Ordering::SeqCst);

    let response = harness
        .app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/reset_context/")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(json_body(response).await["error"], "reset_failed");
}

#[tokio::test]
async fn prompts_are_rate_limited_per_ip() {
    let harness = Harness::with_config(ServerConfig {
        rate_limit_max: 2,
        ..ServerConfig::default()
    });
    let app = harness.app();

    let from = |ip: &str| {
        let mut request = prompt_request(json!({"prompt": "tell me a joke"}));
        request
            .headers_mut()
            .insert("x-forwarded-for", ip.parse().unwrap());
        request
    };

    for _ in 0..2 {
        let response = app.clone().oneshot(from("198.51.100.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = app.clone().oneshot(from("198.51.100.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));

    let response = app.clone().oneshot(from("198.51.100.2")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(Request::builder().uri("/home/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn responses_carry_request_id() {
    let app = Harness::new().app();

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/home/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let generated = response
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    assert!(!generated.is_empty());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/home/")
                .header("x-request-id", "trip-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "trip-123");
}
