pub mod collaborators;
pub mod intent;
pub mod literal;
pub mod models;
pub mod preamble;

pub use collaborators::{ChatModel, CurrentLocation, Geocoder, WeatherLookup};
pub use intent::{parse_reply, ReplyError};
pub use literal::{parse_literal, Literal, ParseError};
pub use models::*;
pub use preamble::CLASSIFIER_PREAMBLE;
