use crate::mapping::MappingError;
use crate::sync::Interrupted;
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Errors returned by session, reconciliation and sync operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MqRestError {
    #[error("invalid configuration: {message}")]
    Config { message: String },

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error("transport failure for {url}: {message}")]
    Transport {
        message: String,
        url: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },

    #[error("malformed response: {message}")]
    Response { message: String, response_text: Option<String> },

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("{operation} of '{name}' did not complete within {elapsed_seconds:.1}s")]
    Timeout {
        name: String,
        operation: String,
        elapsed_seconds: f64,
        #[source]
        source: Option<Interrupted>,
    },

    #[error("authentication failed against {url}: {message}")]
    Auth { message: String, url: String, status_code: Option<u16> },
}

impl MqRestError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    pub fn transport(message: impl Into<String>, url: impl Into<String>) -> Self {
        Self::Transport { message: message.into(), url: url.into(), source: None }
    }

    pub fn response(message: impl Into<String>, response_text: Option<String>) -> Self {
        Self::Response { message: message.into(), response_text }
    }

    pub fn auth(message: impl Into<String>, url: impl Into<String>, status_code: Option<u16>) -> Self {
        Self::Auth { message: message.into(), url: url.into(), status_code }
    }

    /// Returns `true` when the manager itself rejected the command.
    pub fn is_command_error(&self) -> bool {
        matches!(self, Self::Command(_))
    }

    /// Returns `true` for a sync that ran out of time or was cancelled.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// A command that reached the manager but reported a non-zero completion or
/// reason code in its response body.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct CommandError {
    pub message: String,
    pub payload: JsonValue,
    pub status_code: Option<u16>,
}

impl CommandError {
    pub fn new(message: impl Into<String>, payload: JsonValue, status_code: Option<u16>) -> Self {
        Self { message: message.into(), payload, status_code }
    }

    pub fn overall_completion_code(&self) -> Option<i64> {
        self.payload.get("overallCompletionCode").and_then(code_value)
    }

    pub fn overall_reason_code(&self) -> Option<i64> {
        self.payload.get("overallReasonCode").and_then(code_value)
    }
}

/// Reads a completion or reason code that may be encoded as an integer or a
/// float. Anything else is treated as absent.
pub(crate) fn code_value(value: &JsonValue) -> Option<i64> {
    if let Some(code) = value.as_i64() {
        return Some(code);
    }
    value.as_f64().filter(|code| code.is_finite()).map(|code| code as i64)
}
