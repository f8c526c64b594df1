//! Hand-written collaborators for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use waypoint_core::{
    ChatModel, ChatTurn, Coordinates, CurrentLocation, CurrentPosition, Geocoder, WeatherLookup,
    CLASSIFIER_PREAMBLE,
};

/// Acknowledges the preamble and answers everything else from a queue.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    fail_next: Mutex<bool>,
    calls: Mutex<usize>,
}

impl ScriptedModel {
    pub const ACK: &'static str = "Understood.";

    pub fn replies<I, S>(replies: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            ..Self::default()
        })
    }

    pub fn fail_next(&self) {
        *self.fail_next.lock() = true;
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, history: &[ChatTurn]) -> Result<String> {
        *self.calls.lock() += 1;
        if std::mem::take(&mut *self.fail_next.lock()) {
            return Err(anyhow!("model unavailable"));
        }
        let last = history.last().ok_or_else(|| anyhow!("empty history"))?;
        if last.text == CLASSIFIER_PREAMBLE {
            return Ok(Self::ACK.to_string());
        }
        self.replies
            .lock()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted reply left"))
    }
}

/// Answers `text` with `('Type_3', 'echo: text')` after a short delay.
/// `EchoModel::STALL` never gets an answer and `EchoModel::PANIC` panics.
pub struct EchoModel {
    delay: Duration,
}

impl EchoModel {
    pub const STALL: &'static str = "stall";
    pub const PANIC: &'static str = "panic";

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self { delay })
    }

    pub fn reply_to(text: &str) -> String {
        format!("('Type_3', 'echo: {text}')")
    }
}

#[async_trait]
impl ChatModel for EchoModel {
    async fn complete(&self, history: &[ChatTurn]) -> Result<String> {
        let last = history.last().ok_or_else(|| anyhow!("empty history"))?;
        if last.text == CLASSIFIER_PREAMBLE {
            return Ok(ScriptedModel::ACK.to_string());
        }
        match last.text.as_str() {
            Self::STALL => std::future::pending::<()>().await,
            Self::PANIC => panic!("chat model blew up"),
            _ => tokio::time::sleep(self.delay).await,
        }
        Ok(Self::reply_to(&last.text))
    }
}

#[derive(Default)]
pub struct StubGeocoder {
    places: HashMap<String, Vec<Coordinates>>,
    queries: Mutex<Vec<String>>,
}

impl StubGeocoder {
    pub fn with_places(places: &[(&str, (f64, f64))]) -> Arc<Self> {
        Arc::new(Self {
            places: places
                .iter()
                .map(|(name, (lat, lon))| (name.to_string(), vec![Coordinates::new(*lat, *lon)]))
                .collect(),
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl Geocoder for StubGeocoder {
    async fn geocode(&self, address: &str) -> Result<Vec<Coordinates>> {
        self.queries.lock().push(address.to_string());
        self.places
            .get(address)
            .cloned()
            .ok_or_else(|| anyhow!("geocoding service unreachable"))
    }
}

pub struct EmptyGeocoder;

#[async_trait]
impl Geocoder for EmptyGeocoder {
    async fn geocode(&self, _address: &str) -> Result<Vec<Coordinates>> {
        Ok(Vec::new())
    }
}

pub struct PanickingGeocoder;

#[async_trait]
impl Geocoder for PanickingGeocoder {
    async fn geocode(&self, _address: &str) -> Result<Vec<Coordinates>> {
        panic!("geocoder blew up")
    }
}

pub struct StubWeather {
    payload: Option<Value>,
    requests: Mutex<Vec<Coordinates>>,
}

impl StubWeather {
    pub fn returning(payload: Value) -> Arc<Self> {
        Arc::new(Self {
            payload: Some(payload),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            payload: None,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<Coordinates> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl WeatherLookup for StubWeather {
    async fn weather_at(&self, at: Coordinates) -> Result<Value> {
        self.requests.lock().push(at);
        self.payload
            .clone()
            .ok_or_else(|| anyhow!("weather service unreachable"))
    }
}

pub struct StubLocation {
    position: Option<CurrentPosition>,
    calls: Mutex<usize>,
}

impl StubLocation {
    pub fn at(lat: f64, lon: f64) -> Arc<Self> {
        Arc::new(Self {
            position: Some(CurrentPosition {
                coordinates: Coordinates::new(lat, lon),
                city: Some("Testville".to_string()),
            }),
            calls: Mutex::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            position: None,
            calls: Mutex::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl CurrentLocation for StubLocation {
    async fn current_location(&self) -> Result<CurrentPosition> {
        *self.calls.lock() += 1;
        self.position
            .clone()
            .ok_or_else(|| anyhow!("ip lookup failed"))
    }
}
