use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use waypoint_core::{Coordinates, Geocoder};

use crate::error::{decode, read_body, ProviderError};
use crate::rapidapi::RapidApiAuth;

const SERVICE: &str = "geocoding";

/// Address lookup through the RapidAPI map-geocoding service.
pub struct RapidApiGeocoder {
    client: Client,
    base_url: String,
    auth: RapidApiAuth,
}

impl RapidApiGeocoder {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: &str) -> Result<Self> {
        let base_url = base_url.into();
        let auth = RapidApiAuth::for_base_url(&base_url, api_key)?;
        Ok(Self {
            client,
            base_url,
            auth,
        })
    }

    async fn lookup(&self, address: &str) -> Result<Vec<Coordinates>, ProviderError> {
        let request = self
            .client
            .get(format!("{}/json", self.base_url))
            .query(&[("address", address)]);
        let response = self
            .auth
            .apply(request)
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                service: SERVICE,
                source,
            })?;

        let body = read_body(SERVICE, response).await?;
        let parsed: GeocodeResponse = decode(SERVICE, &body)?;
        if let Some(message) = parsed.error_message {
            return Err(ProviderError::Rejected {
                service: SERVICE,
                message,
            });
        }

        let total = parsed.results.len();
        let hits: Vec<Coordinates> = parsed
            .results
            .into_iter()
            .filter_map(|hit| serde_json::from_value::<GeocodeHit>(hit).ok())
            .map(|hit| Coordinates::new(hit.geometry.location.lat, hit.geometry.location.lng))
            .collect();
        debug!(address, hits = hits.len(), skipped = total - hits.len(), "geocoded address");
        Ok(hits)
    }
}

#[async_trait]
impl Geocoder for RapidApiGeocoder {
    async fn geocode(&self, address: &str) -> Result<Vec<Coordinates>> {
        Ok(self.lookup(address).await?)
    }
}

// Hits are decoded one by one so a malformed candidate is skipped instead of
// failing the whole lookup.
#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Vec<Value>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodeHit {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}
