use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};
use waypoint_core::{Coordinates, LocationText, WeatherLookup};
use waypoint_observability::AppMetrics;

use crate::resolver::LocationResolver;

#[derive(Clone)]
pub struct WeatherFetcher {
    resolver: LocationResolver,
    lookup: Arc<dyn WeatherLookup>,
    metrics: Arc<AppMetrics>,
}

impl WeatherFetcher {
    pub fn new(
        resolver: LocationResolver,
        lookup: Arc<dyn WeatherLookup>,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        Self {
            resolver,
            lookup,
            metrics,
        }
    }

    /// Weather for `known` coordinates, or for `description` once resolved.
    /// No request is made for a place that cannot be resolved.
    pub async fn fetch(
        &self,
        description: &LocationText,
        known: Option<Coordinates>,
    ) -> Option<Value> {
        let at = match known {
            Some(at) => at,
            None => match self.resolver.resolve(description, None).await {
                Some(at) => at,
                None => {
                    debug!(place = ?description, "weather skipped, place unresolved");
                    return None;
                }
            },
        };
        self.fetch_at(at).await
    }

    pub async fn fetch_at(&self, at: Coordinates) -> Option<Value> {
        match self.lookup.weather_at(at).await {
            Ok(payload) => Some(payload),
            Err(err) => {
                warn!(lat = at.lat, lon = at.lon, error = %err, "weather lookup failed");
                self.metrics.inc_degraded_lookup("weather");
                None
            }
        }
    }
}
