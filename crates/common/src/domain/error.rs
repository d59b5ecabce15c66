use serde_json::error::Category;
use thiserror::Error;

/// Why an inbound payload could not be turned into a vehicle report
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("payload is not valid JSON: {0}")]
    Syntax(serde_json::Error),

    #[error("payload ended unexpectedly: {0}")]
    Truncated(serde_json::Error),

    #[error("payload is a JSON {0}, expected an object")]
    NotARecord(&'static str),

    #[error("payload field has the wrong type: {0}")]
    FieldType(serde_json::Error),
}

impl DecodeError {
    /// Short machine-readable label for log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Syntax(_) => "syntax",
            Self::Truncated(_) => "truncated",
            Self::NotARecord(_) => "not_a_record",
            Self::FieldType(_) => "field_type",
        }
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        match err.classify() {
            Category::Eof => Self::Truncated(err),
            Category::Data => Self::FieldType(err),
            Category::Syntax | Category::Io => Self::Syntax(err),
        }
    }
}

/// Envelope serialization failure. Only reachable through a bug.
#[derive(Error, Debug)]
#[error("envelope serialization failed: {0}")]
pub struct EncodeError(#[from] pub serde_json::Error);
