use std::fmt;

use reqwest::{RequestBuilder, Url};

use crate::error::ProviderError;

/// RapidAPI wants the key plus the gateway host on every request.
#[derive(Clone)]
pub(crate) struct RapidApiAuth {
    key: String,
    host: String,
}

impl RapidApiAuth {
    pub(crate) fn for_base_url(base_url: &str, key: &str) -> Result<Self, ProviderError> {
        let host = Url::parse(base_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .ok_or_else(|| ProviderError::InvalidBaseUrl {
                url: base_url.to_string(),
            })?;
        Ok(Self {
            key: key.to_string(),
            host,
        })
    }

    pub(crate) fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("x-rapidapi-key", &self.key)
            .header("x-rapidapi-host", &self.host)
    }
}

impl fmt::Debug for RapidApiAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RapidApiAuth")
            .field("key", &"<redacted>")
            .field("host", &self.host)
            .finish()
    }
}
