use serde::ser::SerializeTuple;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

pub const DIAGNOSTIC_PROMPT_ERROR: &str = "Error processing user prompt";
pub const DIAGNOSTIC_UNKNOWN_TYPE: &str = "Unknown response type";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentTag {
    Route,
    Weather,
    Conversation,
}

impl IntentTag {
    /// Accepts the spellings the model drifts between: `Type_1`, `Type 1`
    /// and `Type1` (likewise for 2 and 3). Matching is exact.
    pub fn from_tag(value: &str) -> Option<Self> {
        match value {
            "Type_1" | "Type 1" | "Type1" => Some(Self::Route),
            "Type_2" | "Type 2" | "Type2" => Some(Self::Weather),
            "Type_3" | "Type 3" | "Type3" => Some(Self::Conversation),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Route => 1,
            Self::Weather => 2,
            Self::Conversation => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Route => "route",
            Self::Weather => "weather",
            Self::Conversation => "conversation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "text")]
pub enum LocationText {
    Place(String),
    Unspecified,
}

impl LocationText {
    /// Blank text and the literal `null` (any case) mean the user gave no place.
    pub fn from_model_value(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
            Self::Unspecified
        } else {
            Self::Place(trimmed.to_string())
        }
    }

    pub fn as_place(&self) -> Option<&str> {
        match self {
            Self::Place(text) => Some(text.as_str()),
            Self::Unspecified => None,
        }
    }

    pub fn is_unspecified(&self) -> bool {
        matches!(self, Self::Unspecified)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentPosition {
    pub coordinates: Coordinates,
    pub city: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Model,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassificationResult {
    RouteRequest {
        start: LocationText,
        end: LocationText,
    },
    WeatherRequest {
        place: LocationText,
    },
    ConversationalReply {
        text: String,
    },
}

impl ClassificationResult {
    pub fn intent(&self) -> IntentTag {
        match self {
            Self::RouteRequest { .. } => IntentTag::Route,
            Self::WeatherRequest { .. } => IntentTag::Weather,
            Self::ConversationalReply { .. } => IntentTag::Conversation,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchPayload {
    Route {
        start: Option<Coordinates>,
        end: Option<Coordinates>,
    },
    Weather(Option<Value>),
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteSide {
    Start,
    End,
}

impl DispatchPayload {
    /// Wire form: `[startLat, startLon, endLat, endLon]` for routes, where an
    /// unresolved side is rendered as `0, 0`; the raw payload (or `null`) for
    /// weather; `[]` otherwise.
    pub fn to_wire(&self) -> Value {
        match self {
            Self::Route { start, end } => {
                let start = start.unwrap_or(Coordinates::new(0.0, 0.0));
                let end = end.unwrap_or(Coordinates::new(0.0, 0.0));
                serde_json::json!([start.lat, start.lon, end.lat, end.lon])
            }
            Self::Weather(payload) => payload.clone().unwrap_or(Value::Null),
            Self::Empty => Value::Array(Vec::new()),
        }
    }

    pub fn unresolved_sides(&self) -> Vec<RouteSide> {
        match self {
            Self::Route { start, end } => {
                let mut sides = Vec::new();
                if start.is_none() {
                    sides.push(RouteSide::Start);
                }
                if end.is_none() {
                    sides.push(RouteSide::End);
                }
                sides
            }
            _ => Vec::new(),
        }
    }
}

/// Final answer for one prompt. Serializes as `[code, text, payload]`.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub intent: Option<IntentTag>,
    pub text: String,
    pub payload: DispatchPayload,
}

impl DispatchOutcome {
    pub fn resolved(intent: IntentTag, raw_reply: String, payload: DispatchPayload) -> Self {
        Self {
            intent: Some(intent),
            text: raw_reply,
            payload,
        }
    }

    pub fn not_actionable(diagnostic: &str) -> Self {
        Self {
            intent: None,
            text: diagnostic.to_string(),
            payload: DispatchPayload::Empty,
        }
    }

    pub fn intent_code(&self) -> Option<u8> {
        self.intent.map(IntentTag::code)
    }

    pub fn is_actionable(&self) -> bool {
        self.intent.is_some()
    }
}

impl Serialize for DispatchOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(3)?;
        tuple.serialize_element(&self.intent_code())?;
        tuple.serialize_element(&self.text)?;
        tuple.serialize_element(&self.payload.to_wire())?;
        tuple.end()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptInput {
    pub session_id: Option<String>,
    pub text: String,
    pub caller: Option<Coordinates>,
}
