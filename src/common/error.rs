//! Error types for the application.

use std::time::Duration;

use thiserror::Error;

use crate::config::validate::ValidationReport;

/// Top-level application error.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Translator error: {0}")]
    Translate(#[from] TranslateError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read mapping file '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse mappings: {message}")]
    ParseError { message: String },

    #[error("No channel mappings found: set CHANNEL_MAPPINGS_FILE, CHANNEL_MAPPINGS, or provide {default_path}")]
    NoMappingSource { default_path: String },

    #[error("Missing required setting: {name}")]
    MissingSetting { name: String },

    #[error("Settings validation failed:\n{message}")]
    InvalidSettings { message: String },
}

/// Mapping validation failed. Displays the first violation; the full
/// report stays available for callers that want every problem.
#[derive(Debug, Error)]
#[error("Mapping validation failed: {}", first_violation(.report))]
pub struct ValidationError {
    pub report: ValidationReport,
}

fn first_violation(report: &ValidationReport) -> String {
    report
        .first()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "unknown violation".to_string())
}

/// Markup translation errors.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("Invalid pattern for rule '{rule}': {message}")]
    InvalidPattern { rule: &'static str, message: String },

    #[error("Rule '{rule}' failed to evaluate: {message}")]
    Evaluation { rule: &'static str, message: String },
}

/// Failures while composing a destination-native message.
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("Message body is empty after translation")]
    EmptyBody,

    #[error("Message body is {len} characters, limit is {limit}")]
    TooLong { len: usize, limit: usize },
}

/// Why the relay could not produce a formatted payload.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Translate(#[from] TranslateError),

    #[error(transparent)]
    Compose(#[from] ComposeError),
}

/// Telegram Bot API errors.
#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned error {code:?}: {description}")]
    Api {
        code: Option<i64>,
        description: String,
        retry_after: Option<u64>,
    },
}

/// Errors from a destination adapter's send primitive.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("Invalid destination channel id '{channel_id}'")]
    InvalidTarget { channel_id: String },

    #[error("Payload cannot be delivered on {platform}")]
    UnsupportedPayload { platform: &'static str },

    #[error("Discord error: {0}")]
    Discord(#[from] serenity::Error),

    #[error("Telegram error: {0}")]
    Telegram(#[from] TelegramError),
}

/// Connection-related errors.
#[derive(Debug, Clone, Error)]
pub enum ConnectionError {
    #[error("Network failure: {message}")]
    Network { message: String },

    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Session dropped: {message}")]
    SessionDropped { message: String },

    #[error("Authentication rejected: {message}")]
    AuthRejected { message: String },

    #[error("Liveness probe failed: {message}")]
    ProbeFailed { message: String },

    #[error("Connection closed by remote")]
    Closed,
}

impl ConnectionError {
    /// Whether the failure was a credential rejection.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, Self::AuthRejected { .. })
    }

    /// Minimum wait the remote asked for before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<TelegramError> for ConnectionError {
    fn from(error: TelegramError) -> Self {
        match error {
            TelegramError::Api {
                code: Some(401 | 404),
                description,
                ..
            } => Self::AuthRejected {
                message: description,
            },
            TelegramError::Api {
                code: Some(429),
                retry_after,
                ..
            } => Self::RateLimited {
                retry_after: retry_after.map(Duration::from_secs),
            },
            TelegramError::Api {
                code: Some(409),
                description,
                ..
            } => Self::SessionDropped {
                message: description,
            },
            other => Self::Network {
                message: other.to_string(),
            },
        }
    }
}
