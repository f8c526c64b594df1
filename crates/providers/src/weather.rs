use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use waypoint_core::{Coordinates, WeatherLookup};

use crate::error::{decode, read_body, ProviderError};
use crate::rapidapi::RapidApiAuth;

const SERVICE: &str = "weather";

/// Current conditions from the RapidAPI open-weather13 service. The
/// document is handed back untouched.
pub struct RapidApiWeather {
    client: Client,
    base_url: String,
    auth: RapidApiAuth,
}

impl RapidApiWeather {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: &str) -> Result<Self> {
        let base_url = base_url.into();
        let auth = RapidApiAuth::for_base_url(&base_url, api_key)?;
        Ok(Self {
            client,
            base_url,
            auth,
        })
    }

    async fn current(&self, at: Coordinates) -> Result<Value, ProviderError> {
        let url = format!("{}/city/latlon/{}/{}", self.base_url, at.lat, at.lon);
        let response = self
            .auth
            .apply(self.client.get(&url))
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                service: SERVICE,
                source,
            })?;

        let body = read_body(SERVICE, response).await?;
        let payload: Value = decode(SERVICE, &body)?;
        debug!(lat = at.lat, lon = at.lon, "weather fetched");
        Ok(payload)
    }
}

#[async_trait]
impl WeatherLookup for RapidApiWeather {
    async fn weather_at(&self, at: Coordinates) -> Result<Value> {
        Ok(self.current(at).await?)
    }
}
