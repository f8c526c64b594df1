use std::sync::Arc;

use tracing::{debug, warn};
use waypoint_core::{Coordinates, Geocoder, LocationText};
use waypoint_observability::AppMetrics;

/// Geocoding keys are sent with every whitespace character removed.
pub fn clean_address(text: &str) -> String {
    text.chars().filter(|ch| !ch.is_whitespace()).collect()
}

#[derive(Clone)]
pub struct LocationResolver {
    geocoder: Arc<dyn Geocoder>,
    metrics: Arc<AppMetrics>,
}

impl LocationResolver {
    pub fn new(geocoder: Arc<dyn Geocoder>, metrics: Arc<AppMetrics>) -> Self {
        Self { geocoder, metrics }
    }

    /// `Unspecified` resolves to `fallback` without a lookup. A described
    /// place resolves to the geocoder's first candidate, or `None` when the
    /// lookup fails in any way.
    pub async fn resolve(
        &self,
        description: &LocationText,
        fallback: Option<Coordinates>,
    ) -> Option<Coordinates> {
        let Some(place) = description.as_place() else {
            return fallback;
        };

        let address = clean_address(place);
        match self.geocoder.geocode(&address).await {
            Ok(candidates) => match candidates.first() {
                Some(found) if found.is_valid() => {
                    debug!(address = %address, lat = found.lat, lon = found.lon, "place resolved");
                    Some(*found)
                }
                Some(found) => {
                    warn!(address = %address, lat = found.lat, lon = found.lon, "geocoder returned invalid coordinates");
                    self.metrics.inc_degraded_lookup("geocoder");
                    None
                }
                None => {
                    warn!(address = %address, "geocoder returned no candidates");
                    self.metrics.inc_degraded_lookup("geocoder");
                    None
                }
            },
            Err(err) => {
                warn!(address = %address, error = %err, "geocoding failed");
                self.metrics.inc_degraded_lookup("geocoder");
                None
            }
        }
    }
}
