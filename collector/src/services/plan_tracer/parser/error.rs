//! Wire-level parse errors

use thiserror::Error;

/// Errors raised while decoding probe event lines and payload fields.
///
/// Line-level variants (`InvalidPid`, `MissingEventName`, `MissingPayload`,
/// `InvalidUtf8`) drop the whole event. Field-level variants (`MalformedField`,
/// `InvalidField`) only drop the offending field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid pid field: '{0}'")]
    InvalidPid(String),

    #[error("Missing event name in line: '{0}'")]
    MissingEventName(String),

    #[error("Event '{event}' requires a payload")]
    MissingPayload { event: String },

    #[error("Event line is not valid UTF-8")]
    InvalidUtf8,

    #[error("Malformed payload field: '{0}'")]
    MalformedField(String),

    #[error("Invalid value '{value}' for field '{key}': {reason}")]
    InvalidField { key: String, value: String, reason: String },
}

impl ParseError {
    pub fn invalid_field(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidField { key: key.into(), value: value.into(), reason: reason.into() }
    }

    /// True for errors that only affect one payload field
    pub fn is_field_error(&self) -> bool {
        matches!(self, Self::MalformedField(_) | Self::InvalidField { .. })
    }
}

pub type ParseResult<T> = Result<T, ParseError>;
