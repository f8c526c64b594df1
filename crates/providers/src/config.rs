use std::env;
use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-pro";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEOCODING_BASE_URL: &str = "https://map-geocoding.p.rapidapi.com";
pub const DEFAULT_WEATHER_BASE_URL: &str = "https://open-weather13.p.rapidapi.com";
pub const DEFAULT_IP_LOCATION_BASE_URL: &str = "http://ip-api.com";

#[derive(Clone)]
pub struct ProviderConfig {
    pub google_api_key: String,
    pub rapidapi_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub geocoding_base_url: String,
    pub weather_base_url: String,
    pub ip_location_base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl ProviderConfig {
    pub fn new(google_api_key: impl Into<String>, rapidapi_key: impl Into<String>) -> Self {
        Self {
            google_api_key: google_api_key.into(),
            rapidapi_key: rapidapi_key.into(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            geocoding_base_url: DEFAULT_GEOCODING_BASE_URL.to_string(),
            weather_base_url: DEFAULT_WEATHER_BASE_URL.to_string(),
            ip_location_base_url: DEFAULT_IP_LOCATION_BASE_URL.to_string(),
            connect_timeout: Duration::from_secs(6),
            request_timeout: Duration::from_secs(20),
        }
    }

    /// Both API keys are required; everything else has a default.
    pub fn from_env() -> Result<Self> {
        let google_api_key = required_var("GOOGLE_API_KEY")?;
        let rapidapi_key = required_var("RAPIDAPI_KEY")?;

        let mut config = Self::new(google_api_key, rapidapi_key);
        config.gemini_model = var_or("WAYPOINT_GEMINI_MODEL", DEFAULT_GEMINI_MODEL);
        config.gemini_base_url = base_url_or("WAYPOINT_GEMINI_BASE_URL", DEFAULT_GEMINI_BASE_URL);
        config.geocoding_base_url =
            base_url_or("WAYPOINT_GEOCODING_BASE_URL", DEFAULT_GEOCODING_BASE_URL);
        config.weather_base_url = base_url_or("WAYPOINT_WEATHER_BASE_URL", DEFAULT_WEATHER_BASE_URL);
        config.ip_location_base_url =
            base_url_or("WAYPOINT_IP_LOCATION_BASE_URL", DEFAULT_IP_LOCATION_BASE_URL);
        config.connect_timeout = Duration::from_secs(
            env::var("WAYPOINT_HTTP_CONNECT_TIMEOUT_SECONDS")
                .ok()
                .and_then(|value| value.parse::<u64>().ok())
                .unwrap_or(6),
        );
        config.request_timeout = Duration::from_secs(
            env::var("WAYPOINT_HTTP_TIMEOUT_SECONDS")
                .ok()
                .and_then(|value| value.parse::<u64>().ok())
                .unwrap_or(20),
        );
        Ok(config)
    }

    pub fn http_client(&self) -> Result<Client> {
        Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .build()
            .context("failed to build HTTP client")
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("google_api_key", &"<redacted>")
            .field("rapidapi_key", &"<redacted>")
            .field("gemini_model", &self.gemini_model)
            .field("gemini_base_url", &self.gemini_base_url)
            .field("geocoding_base_url", &self.geocoding_base_url)
            .field("weather_base_url", &self.weather_base_url)
            .field("ip_location_base_url", &self.ip_location_base_url)
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

fn required_var(name: &str) -> Result<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .with_context(|| format!("{name} is not set"))
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn base_url_or(name: &str, default: &str) -> String {
    var_or(name, default).trim_end_matches('/').to_string()
}
