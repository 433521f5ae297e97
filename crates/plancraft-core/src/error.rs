//! Error taxonomy for the design pipeline
//!
//! Errors serialize to `{"code": "...", ...}` so a frontend can match on the
//! kind while showing `display_message()` to the user.

use serde::Serialize;
use serde_json::Value;

const REQUEST_FAILED: &str = "Request failed";
const VALIDATION_FAILED: &str = "Validation failed";

/// Errors produced by the pipeline and its remote collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum StudioError {
    /// Network failure or 5xx from a remote service.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        status: Option<u16>,
    },

    /// Structured field-level rejection from a remote call.
    #[error("validation error: {}", .lines.join("; "))]
    Validation { lines: Vec<String> },

    /// A remote job reported terminal failure.
    #[error("task failed: {message}")]
    TaskFailure { message: String },

    /// Locally detected precondition violation. Never reaches the network.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// The call finished, but a newer upload or render replaced its target.
    #[error("superseded: {message}")]
    Superseded { message: String },
}

impl StudioError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status: None,
        }
    }

    pub fn task_failure(message: impl Into<String>) -> Self {
        Self::TaskFailure {
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn superseded(message: impl Into<String>) -> Self {
        Self::Superseded {
            message: message.into(),
        }
    }

    /// Build an error from a remote `detail` payload.
    ///
    /// Strings and `{loc, msg}` lists become validation lines, objects are
    /// kept as compact JSON. Anything else falls back to a transport error
    /// carrying `fallback`.
    pub fn from_detail(detail: &Value, status: Option<u16>, fallback: &str) -> Self {
        match detail {
            Value::String(s) if !s.trim().is_empty() => Self::Validation {
                lines: vec![s.clone()],
            },
            Value::Array(items) => Self::Validation {
                lines: items.iter().filter_map(detail_line).collect(),
            },
            Value::Object(_) => Self::Validation {
                lines: vec![detail.to_string()],
            },
            Value::Number(n) => Self::Validation {
                lines: vec![n.to_string()],
            },
            Value::Bool(b) => Self::Validation {
                lines: vec![b.to_string()],
            },
            _ => Self::Transport {
                message: fallback.to_string(),
                status,
            },
        }
    }

    /// Collapse the error into the single string shown to the user.
    pub fn display_message(&self) -> String {
        match self {
            Self::Transport { message, .. } => {
                if message.trim().is_empty() {
                    REQUEST_FAILED.to_string()
                } else {
                    message.clone()
                }
            }
            Self::Validation { lines } => {
                if lines.is_empty() {
                    VALIDATION_FAILED.to_string()
                } else {
                    lines.join("\n")
                }
            }
            Self::TaskFailure { message }
            | Self::InvalidRequest { message }
            | Self::Superseded { message } => message.clone(),
        }
    }

    /// Whether the same call may succeed if repeated.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

/// Render one `{loc, msg}` entry as `"a.b: msg"`.
fn detail_line(item: &Value) -> Option<String> {
    let obj = item.as_object()?;

    let loc = obj
        .get("loc")
        .and_then(Value::as_array)
        .map(|segs| {
            segs.iter()
                .filter(|s| s.as_str() != Some("body"))
                .filter_map(|s| match s {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(".")
        })
        .unwrap_or_default();

    let msg = match obj.get("msg") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    match (loc.is_empty(), msg.is_empty()) {
        (false, false) => Some(format!("{}: {}", loc, msg)),
        (_, false) => Some(msg),
        _ => None,
    }
}

impl From<reqwest::Error> for StudioError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport {
            message: err.to_string(),
            status: err.status().map(|s| s.as_u16()),
        }
    }
}

/// Result type alias for pipeline operations
pub type StudioResult<T> = Result<T, StudioError>;
