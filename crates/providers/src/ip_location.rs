use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use waypoint_core::{Coordinates, CurrentLocation, CurrentPosition};

use crate::error::{decode, read_body, ProviderError};

const SERVICE: &str = "ip-location";

/// Approximate position of this host, from ip-api.com.
pub struct IpApiLocation {
    client: Client,
    base_url: String,
}

impl IpApiLocation {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn lookup(&self) -> Result<CurrentPosition, ProviderError> {
        let response = self
            .client
            .get(format!("{}/json/", self.base_url))
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                service: SERVICE,
                source,
            })?;

        let body = read_body(SERVICE, response).await?;
        let parsed: IpApiResponse = decode(SERVICE, &body)?;
        parsed.into_position()
    }
}

#[async_trait]
impl CurrentLocation for IpApiLocation {
    async fn current_location(&self) -> Result<CurrentPosition> {
        Ok(self.lookup().await?)
    }
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    message: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    city: Option<String>,
}

impl IpApiResponse {
    fn into_position(self) -> Result<CurrentPosition, ProviderError> {
        if self.status != "success" {
            return Err(ProviderError::Rejected {
                service: SERVICE,
                message: self.message.unwrap_or(self.status),
            });
        }
        let (Some(lat), Some(lon)) = (self.lat, self.lon) else {
            return Err(ProviderError::Decode {
                service: SERVICE,
                reason: "success without coordinates".to_string(),
            });
        };
        let city = self.city.filter(|city| !city.trim().is_empty());
        debug!(lat, lon, city = ?city, "located host");
        Ok(CurrentPosition {
            coordinates: Coordinates::new(lat, lon),
            city,
        })
    }
}
