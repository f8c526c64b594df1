use thiserror::Error;

use crate::literal::{parse_literal, Literal, ParseError};
use crate::models::{ClassificationResult, IntentTag, LocationText};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReplyError {
    #[error("could not decode model reply: {0}")]
    Parse(#[from] ParseError),
    #[error("unrecognized reply tag {tag}")]
    Unrecognized { tag: String, raw: String },
}

impl ReplyError {
    pub fn is_unrecognized(&self) -> bool {
        matches!(self, Self::Unrecognized { .. })
    }
}

/// Decodes a model reply of the form `("Type_N", payload)`.
pub fn parse_reply(raw: &str) -> Result<ClassificationResult, ReplyError> {
    let literal = parse_literal(raw)?;
    let (tag, payload) = split_pair(&literal)?;

    let intent = tag
        .as_str()
        .and_then(IntentTag::from_tag)
        .ok_or_else(|| ReplyError::Unrecognized {
            tag: tag.to_string(),
            raw: raw.to_string(),
        })?;

    Ok(classify_payload(intent, tag, payload)?)
}

fn split_pair(literal: &Literal) -> Result<(&Literal, &Literal), ParseError> {
    match literal.as_seq() {
        Some([tag, payload]) => Ok((tag, payload)),
        Some(items) => Err(ParseError::NotAPair {
            found: format!("{} of {} elements", literal.kind_name(), items.len()),
        }),
        None => Err(ParseError::NotAPair {
            found: literal.kind_name().to_string(),
        }),
    }
}

fn classify_payload(
    intent: IntentTag,
    tag: &Literal,
    payload: &Literal,
) -> Result<ClassificationResult, ParseError> {
    let malformed = |reason| ParseError::MalformedPayload {
        tag: tag.as_str().unwrap_or_default().to_string(),
        reason,
    };

    match intent {
        IntentTag::Route => {
            let places = payload
                .as_seq()
                .ok_or_else(|| malformed("expected a [start, end] sequence"))?;
            let [start, end, ..] = places else {
                return Err(malformed("expected at least two locations"));
            };
            let (Some(start), Some(end)) = (start.as_str(), end.as_str()) else {
                return Err(malformed("locations must be strings"));
            };
            Ok(ClassificationResult::RouteRequest {
                start: LocationText::from_model_value(start),
                end: LocationText::from_model_value(end),
            })
        }
        IntentTag::Weather => {
            let place = payload
                .as_str()
                .ok_or_else(|| malformed("expected a location string"))?;
            Ok(ClassificationResult::WeatherRequest {
                place: LocationText::from_model_value(place),
            })
        }
        IntentTag::Conversation => {
            let text = match payload {
                Literal::Str(text) => text.clone(),
                other => other.to_string(),
            };
            Ok(ClassificationResult::ConversationalReply { text })
        }
    }
}
