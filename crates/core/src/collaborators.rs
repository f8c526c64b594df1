//! Seams to the outside world. Every call here may be slow or fail; callers
//! decide how a failure degrades.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::models::{ChatTurn, Coordinates, CurrentPosition};

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Produces the model's next turn. `history` ends with the new user turn.
    async fn complete(&self, history: &[ChatTurn]) -> Result<String>;
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<Vec<Coordinates>>;
}

#[async_trait]
pub trait WeatherLookup: Send + Sync {
    async fn weather_at(&self, at: Coordinates) -> Result<Value>;
}

#[async_trait]
pub trait CurrentLocation: Send + Sync {
    async fn current_location(&self) -> Result<CurrentPosition>;
}
