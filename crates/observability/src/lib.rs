use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

#[derive(Debug, Default)]
pub struct AppMetrics {
    requests_total: AtomicU64,
    route_total: AtomicU64,
    weather_total: AtomicU64,
    conversation_total: AtomicU64,
    parse_failures_total: AtomicU64,
    unrecognized_total: AtomicU64,
    degraded_lookups_total: AtomicU64,
    resets_total: AtomicU64,
    total_latency_millis: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub intent_route_total: u64,
    pub intent_weather_total: u64,
    pub intent_conversation_total: u64,
    pub parse_failures_total: u64,
    pub unrecognized_total: u64,
    pub degraded_lookups_total: u64,
    pub resets_total: u64,
    pub avg_latency_millis: f64,
}

impl AppMetrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("waypoint_requests_total").increment(1);
    }

    /// `intent` is one of `route`, `weather` or `conversation`.
    pub fn inc_intent(&self, intent: &'static str) {
        let counter = match intent {
            "route" => &self.route_total,
            "weather" => &self.weather_total,
            _ => &self.conversation_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("waypoint_intents_total", "intent" => intent).increment(1);
    }

    pub fn inc_parse_failure(&self) {
        self.parse_failures_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("waypoint_parse_failures_total").increment(1);
    }

    pub fn inc_unrecognized(&self) {
        self.unrecognized_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("waypoint_unrecognized_total").increment(1);
    }

    pub fn inc_degraded_lookup(&self, collaborator: &'static str) {
        self.degraded_lookups_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("waypoint_degraded_lookups_total", "collaborator" => collaborator)
            .increment(1);
    }

    pub fn inc_reset(&self) {
        self.resets_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("waypoint_resets_total").increment(1);
    }

    pub fn observe_latency(&self, duration: Duration) {
        self.total_latency_millis
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let requests = self.requests_total.load(Ordering::Relaxed);
        let latency = self.total_latency_millis.load(Ordering::Relaxed);

        MetricsSnapshot {
            requests_total: requests,
            intent_route_total: self.route_total.load(Ordering::Relaxed),
            intent_weather_total: self.weather_total.load(Ordering::Relaxed),
            intent_conversation_total: self.conversation_total.load(Ordering::Relaxed),
            parse_failures_total: self.parse_failures_total.load(Ordering::Relaxed),
            unrecognized_total: self.unrecognized_total.load(Ordering::Relaxed),
            degraded_lookups_total: self.degraded_lookups_total.load(Ordering::Relaxed),
            resets_total: self.resets_total.load(Ordering::Relaxed),
            avg_latency_millis: if requests == 0 {
                0.0
            } else {
                latency as f64 / requests as f64
            },
        }
    }
}

pub fn init_tracing(service_name: &str) {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}=info,waypoint_api=info,waypoint_agents=info,waypoint_providers=info",
                service_name
            ))
        });

        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .with_span_list(true)
            .init();
    });
}
