use thiserror::Error;

const MAX_ERROR_BODY_LEN: usize = 512;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{service} returned status {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("{service} payload could not be decoded: {reason}")]
    Decode {
        service: &'static str,
        reason: String,
    },
    #[error("{service} reported an error: {message}")]
    Rejected {
        service: &'static str,
        message: String,
    },
    #[error("invalid base url {url:?}")]
    InvalidBaseUrl { url: String },
}

pub(crate) async fn read_body(
    service: &'static str,
    response: reqwest::Response,
) -> Result<String, ProviderError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|source| ProviderError::Transport { service, source })?;

    if !status.is_success() {
        return Err(ProviderError::Status {
            service,
            status: status.as_u16(),
            body: truncate(body),
        });
    }
    Ok(body)
}

pub(crate) fn decode<T: serde::de::DeserializeOwned>(
    service: &'static str,
    body: &str,
) -> Result<T, ProviderError> {
    serde_json::from_str(body).map_err(|err| ProviderError::Decode {
        service,
        reason: err.to_string(),
    })
}

fn truncate(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY_LEN {
        let mut cut = MAX_ERROR_BODY_LEN;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}
