//! HTTP clients for the services the travel agent leans on: Gemini for
//! chat, RapidAPI for geocoding and weather, ip-api.com for the host's
//! own position.

mod config;
mod error;
mod gemini;
mod geocoding;
mod ip_location;
mod rapidapi;
#[cfg(test)]
mod test_server;
mod weather;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

pub use config::{
    ProviderConfig, DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL, DEFAULT_GEOCODING_BASE_URL,
    DEFAULT_IP_LOCATION_BASE_URL, DEFAULT_WEATHER_BASE_URL,
};
pub use error::ProviderError;
pub use gemini::GeminiChatModel;
pub use geocoding::RapidApiGeocoder;
pub use ip_location::IpApiLocation;
pub use weather::RapidApiWeather;

/// The live clients, sharing one connection pool.
pub struct HttpProviders {
    pub chat_model: Arc<GeminiChatModel>,
    pub geocoder: Arc<RapidApiGeocoder>,
    pub weather: Arc<RapidApiWeather>,
    pub current_location: Arc<IpApiLocation>,
}

impl HttpProviders {
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let client = config.http_client()?;
        let providers = Self {
            chat_model: Arc::new(GeminiChatModel::new(
                client.clone(),
                config.gemini_base_url.clone(),
                config.gemini_model.clone(),
                config.google_api_key.clone(),
            )),
            geocoder: Arc::new(RapidApiGeocoder::new(
                client.clone(),
                config.geocoding_base_url.clone(),
                &config.rapidapi_key,
            )?),
            weather: Arc::new(RapidApiWeather::new(
                client.clone(),
                config.weather_base_url.clone(),
                &config.rapidapi_key,
            )?),
            current_location: Arc::new(IpApiLocation::new(
                client,
                config.ip_location_base_url.clone(),
            )),
        };
        info!(
            model = %config.gemini_model,
            geocoding = %config.geocoding_base_url,
            weather = %config.weather_base_url,
            "providers configured"
        );
        Ok(providers)
    }
}
