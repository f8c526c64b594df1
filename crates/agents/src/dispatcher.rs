use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, error, instrument, warn};
use waypoint_core::{
    parse_reply, ClassificationResult, Coordinates, CurrentLocation, DispatchOutcome,
    DispatchPayload, Geocoder, LocationText, ReplyError, WeatherLookup, DIAGNOSTIC_PROMPT_ERROR,
    DIAGNOSTIC_UNKNOWN_TYPE,
};
use waypoint_observability::AppMetrics;

use crate::resolver::LocationResolver;
use crate::session::ConversationSession;
use crate::weather::WeatherFetcher;

enum DispatchFailure {
    Model(anyhow::Error),
    Reply(ReplyError),
}

/// Turns one user prompt into a [`DispatchOutcome`]. Holds no conversation
/// state of its own; the caller passes the session to use.
pub struct IntentDispatcher {
    resolver: LocationResolver,
    weather: WeatherFetcher,
    current_location: Arc<dyn CurrentLocation>,
    metrics: Arc<AppMetrics>,
}

impl IntentDispatcher {
    pub fn new(
        geocoder: Arc<dyn Geocoder>,
        weather_lookup: Arc<dyn WeatherLookup>,
        current_location: Arc<dyn CurrentLocation>,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        let resolver = LocationResolver::new(geocoder, metrics.clone());
        let weather = WeatherFetcher::new(resolver.clone(), weather_lookup, metrics.clone());
        Self {
            resolver,
            weather,
            current_location,
            metrics,
        }
    }

    /// Never fails: model errors, undecodable replies and panics all come
    /// back as a not-actionable outcome with a diagnostic text.
    #[instrument(skip_all)]
    pub async fn dispatch(
        &self,
        session: &mut ConversationSession,
        text: &str,
        caller: Option<Coordinates>,
    ) -> DispatchOutcome {
        let attempt = AssertUnwindSafe(self.try_dispatch(session, text, caller))
            .catch_unwind()
            .await;

        match attempt {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(DispatchFailure::Model(err))) => {
                warn!(error = %err, "chat model call failed");
                DispatchOutcome::not_actionable(DIAGNOSTIC_PROMPT_ERROR)
            }
            Ok(Err(DispatchFailure::Reply(ReplyError::Parse(err)))) => {
                warn!(error = %err, "model reply could not be decoded");
                self.metrics.inc_parse_failure();
                DispatchOutcome::not_actionable(DIAGNOSTIC_PROMPT_ERROR)
            }
            Ok(Err(DispatchFailure::Reply(ReplyError::Unrecognized { tag, raw }))) => {
                warn!(tag = %tag, raw = %raw, "model reply has unknown tag");
                self.metrics.inc_unrecognized();
                DispatchOutcome::not_actionable(DIAGNOSTIC_UNKNOWN_TYPE)
            }
            Err(panic) => {
                error!(panic = %panic_message(panic.as_ref()), "dispatch panicked");
                DispatchOutcome::not_actionable(DIAGNOSTIC_PROMPT_ERROR)
            }
        }
    }

    async fn try_dispatch(
        &self,
        session: &mut ConversationSession,
        text: &str,
        caller: Option<Coordinates>,
    ) -> Result<DispatchOutcome, DispatchFailure> {
        let raw = session.send(text).await.map_err(DispatchFailure::Model)?;
        let classification = parse_reply(&raw).map_err(DispatchFailure::Reply)?;
        let intent = classification.intent();

        let payload = match classification {
            ClassificationResult::RouteRequest { start, end } => {
                let start = self.resolver.resolve(&start, caller).await;
                let end = self.resolver.resolve(&end, None).await;
                DispatchPayload::Route { start, end }
            }
            ClassificationResult::WeatherRequest { place } => {
                DispatchPayload::Weather(self.weather_for(&place).await)
            }
            // The reply text travels in `raw`.
            ClassificationResult::ConversationalReply { .. } => DispatchPayload::Empty,
        };

        self.metrics.inc_intent(intent.as_str());
        Ok(DispatchOutcome::resolved(intent, raw, payload))
    }

    async fn weather_for(&self, place: &LocationText) -> Option<Value> {
        if !place.is_unspecified() {
            return self.weather.fetch(place, None).await;
        }

        match self.current_location.current_location().await {
            Ok(position) if position.coordinates.is_valid() => {
                debug!(city = ?position.city, "weather for current location");
                self.weather.fetch_at(position.coordinates).await
            }
            Ok(position) => {
                warn!(lat = position.coordinates.lat, lon = position.coordinates.lon, "current location is not a valid coordinate");
                self.metrics.inc_degraded_lookup("current_location");
                None
            }
            Err(err) => {
                warn!(error = %err, "current location lookup failed");
                self.metrics.inc_degraded_lookup("current_location");
                None
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
