use serde::Serialize;
use thiserror::Error;

use super::directive::Span;

/// Why a directive token was dropped. Carries the action keyword, the
/// offending parameter when there is one, and the raw token span.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DirectiveError {
    #[error("unknown directive action `{action}`")]
    UnknownAction {
        action: String,
        span: Span,
        raw: String,
    },

    #[error("directive `{action}` is missing required parameter `{param}`")]
    MissingParameter {
        action: String,
        param: String,
        span: Span,
        raw: String,
    },

    #[error("directive `{action}` has invalid `{param}`: {reason}")]
    InvalidParameter {
        action: String,
        param: String,
        reason: String,
        span: Span,
        raw: String,
    },

    #[error("directive `{action}` has malformed parameter `{segment}`")]
    MalformedParameter {
        action: String,
        segment: String,
        span: Span,
        raw: String,
    },
}

impl DirectiveError {
    pub fn action(&self) -> &str {
        match self {
            Self::UnknownAction { action, .. }
            | Self::MissingParameter { action, .. }
            | Self::InvalidParameter { action, .. }
            | Self::MalformedParameter { action, .. } => action,
        }
    }

    pub fn param(&self) -> Option<&str> {
        match self {
            Self::UnknownAction { .. } => None,
            Self::MissingParameter { param, .. } | Self::InvalidParameter { param, .. } => {
                Some(param)
            }
            Self::MalformedParameter { segment, .. } => Some(segment),
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Self::UnknownAction { span, .. }
            | Self::MissingParameter { span, .. }
            | Self::InvalidParameter { span, .. }
            | Self::MalformedParameter { span, .. } => *span,
        }
    }
}

/// Manual edit failures. State is left untouched when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionError {
    #[error("value for `{field}` must not be empty")]
    EmptyValue { field: String },

    #[error("no character named `{name}`")]
    CharacterNotFound { name: String },

    #[error("a character named `{name}` already exists")]
    DuplicateCharacter { name: String },

    #[error("scene number {number} is outside 1..=30")]
    SceneOutOfRange { number: i64 },

    #[error("scene {number} does not exist")]
    SceneNotFound { number: u8 },

    #[error("invalid snapshot: {reason}")]
    InvalidSnapshot { reason: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid commitment pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("commitment pattern `{0}` has no `field` capture group")]
    MissingFieldGroup(String),

    #[error("invalid config value for `{key}`: {reason}")]
    InvalidValue { key: String, reason: String },
}
