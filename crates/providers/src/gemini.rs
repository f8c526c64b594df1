//! Gemini `generateContent` client. The API is stateless, so every call
//! carries the full conversation.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use waypoint_core::{ChatModel, ChatRole, ChatTurn};

use crate::error::{decode, read_body, ProviderError};

const SERVICE: &str = "gemini";

pub struct GeminiChatModel {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiChatModel {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, history: &[ChatTurn]) -> Result<String, ProviderError> {
        let request = GenerateRequest {
            contents: history.iter().map(Content::from_turn).collect(),
        };
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                service: SERVICE,
                source,
            })?;

        let body = read_body(SERVICE, response).await?;
        let parsed: GenerateResponse = decode(SERVICE, &body)?;
        let text = parsed.reply_text()?;
        debug!(model = %self.model, turns = history.len(), reply_len = text.len(), "gemini replied");
        Ok(text)
    }
}

#[async_trait]
impl ChatModel for GeminiChatModel {
    async fn complete(&self, history: &[ChatTurn]) -> Result<String> {
        Ok(self.generate(history).await?)
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

impl<'a> Content<'a> {
    fn from_turn(turn: &'a ChatTurn) -> Self {
        let role = match turn.role {
            ChatRole::User => "user",
            ChatRole::Model => "model",
        };
        Self {
            role,
            parts: [Part { text: &turn.text }],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateResponse {
    fn reply_text(self) -> Result<String, ProviderError> {
        let Some(candidate) = self.candidates.into_iter().next() else {
            let message = match self.prompt_feedback {
                Some(feedback) => format!("no candidates, prompt feedback: {feedback}"),
                None => "no candidates".to_string(),
            };
            return Err(ProviderError::Rejected {
                service: SERVICE,
                message,
            });
        };

        let text: String = candidate
            .content
            .map(|content| content.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|part| part.text)
            .collect();

        if text.is_empty() {
            return Err(ProviderError::Rejected {
                service: SERVICE,
                message: format!(
                    "candidate has no text (finish reason {})",
                    candidate.finish_reason.as_deref().unwrap_or("unknown")
                ),
            });
        }
        Ok(text)
    }
}
