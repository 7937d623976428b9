//! Runtime settings read from environment variables.
//!
//! - `DISCORD_TOKEN` - Discord bot token (required)
//! - `TELEGRAM_TOKEN` - Telegram bot token (required)
//! - `DISCORD_GUILD_ID` - only relay messages from this guild
//! - `TELEGRAM_GROUP_ID` - only relay messages from this chat
//! - `TELEGRAM_POLL_TIMEOUT_SECS` - long-poll timeout (default 30)
//! - `TELEGRAM_POLL_LIMIT` - updates per poll, 1-100 (default 100)
//! - `TELEGRAM_PROBE_INTERVAL_SECS` - liveness probe period (default 60)
//! - `MAX_RECONNECT_ATTEMPTS` - consecutive failures before giving up (default 5)
//! - `RECONNECT_BASE_MS` / `RECONNECT_MAX_MS` - backoff bounds
//! - `RECONNECT_STABLE_SECS` - uptime before a session counts as connected (default 30)
//! - `MAX_AUTH_FAILURES` - consecutive auth rejections before giving up (default 2)
//! - `HTTP_TIMEOUT_SECS` - REST request timeout (default 15)

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::common::error::ConfigError;
use crate::common::reconnect::ReconnectConfig;
use crate::config::validate::validate_settings;

pub const DISCORD_TOKEN: &str = "DISCORD_TOKEN";
pub const TELEGRAM_TOKEN: &str = "TELEGRAM_TOKEN";
pub const DISCORD_GUILD_ID: &str = "DISCORD_GUILD_ID";
pub const TELEGRAM_GROUP_ID: &str = "TELEGRAM_GROUP_ID";
pub const TELEGRAM_POLL_TIMEOUT_SECS: &str = "TELEGRAM_POLL_TIMEOUT_SECS";
pub const TELEGRAM_POLL_LIMIT: &str = "TELEGRAM_POLL_LIMIT";
pub const TELEGRAM_PROBE_INTERVAL_SECS: &str = "TELEGRAM_PROBE_INTERVAL_SECS";
pub const MAX_RECONNECT_ATTEMPTS: &str = "MAX_RECONNECT_ATTEMPTS";
pub const RECONNECT_BASE_MS: &str = "RECONNECT_BASE_MS";
pub const RECONNECT_MAX_MS: &str = "RECONNECT_MAX_MS";
pub const RECONNECT_STABLE_SECS: &str = "RECONNECT_STABLE_SECS";
pub const MAX_AUTH_FAILURES: &str = "MAX_AUTH_FAILURES";
pub const HTTP_TIMEOUT_SECS: &str = "HTTP_TIMEOUT_SECS";

/// Discord connection settings.
#[derive(Debug, Clone)]
pub struct DiscordSettings {
    pub token: String,
    pub guild_id: Option<u64>,
}

/// Telegram connection settings.
#[derive(Debug, Clone)]
pub struct TelegramSettings {
    pub token: String,
    pub group_id: Option<String>,
    pub poll_timeout_secs: u64,
    pub poll_limit: u8,
    pub probe_interval: Duration,
}

/// Everything the process needs besides the channel mappings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub discord: DiscordSettings,
    pub telegram: TelegramSettings,
    pub reconnect: ReconnectConfig,
    pub http_timeout: Duration,
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let defaults = ReconnectConfig::default();
        let poll_limit: u32 = parsed(&value, TELEGRAM_POLL_LIMIT, 100);

        let settings = Self {
            discord: DiscordSettings {
                token: require(&value, DISCORD_TOKEN)?,
                guild_id: optional(&value, DISCORD_GUILD_ID),
            },
            telegram: TelegramSettings {
                token: require(&value, TELEGRAM_TOKEN)?,
                group_id: value(TELEGRAM_GROUP_ID),
                poll_timeout_secs: parsed(&value, TELEGRAM_POLL_TIMEOUT_SECS, 30),
                poll_limit: poll_limit.clamp(1, 100) as u8,
                probe_interval: Duration::from_secs(parsed(
                    &value,
                    TELEGRAM_PROBE_INTERVAL_SECS,
                    60,
                )),
            },
            reconnect: ReconnectConfig {
                base_delay: Duration::from_millis(parsed(&value, RECONNECT_BASE_MS, 5_000)),
                max_delay: Duration::from_millis(parsed(&value, RECONNECT_MAX_MS, 300_000)),
                max_attempts: parsed(&value, MAX_RECONNECT_ATTEMPTS, defaults.max_attempts),
                max_auth_failures: parsed(&value, MAX_AUTH_FAILURES, defaults.max_auth_failures),
                stable_after: Duration::from_secs(parsed(
                    &value,
                    RECONNECT_STABLE_SECS,
                    defaults.stable_after.as_secs(),
                )),
                ..defaults
            },
            http_timeout: Duration::from_secs(parsed(&value, HTTP_TIMEOUT_SECS, 15)),
        };

        validate_settings(&settings)?;
        Ok(settings)
    }
}

fn require<F>(value: &F, name: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    value(name).ok_or_else(|| ConfigError::MissingSetting {
        name: name.to_string(),
    })
}

fn optional<F, T>(value: &F, name: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let raw = value(name)?;
    match raw.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!("{} is not a valid value ('{}'), ignoring it", name, raw);
            None
        }
    }
}

fn parsed<F, T>(value: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy + std::fmt::Display,
{
    let Some(raw) = value(name) else {
        return default;
    };
    match raw.parse() {
        Ok(parsed) => parsed,
        Err(_) => {
            warn!("{} is not a valid number ('{}'), using {}", name, raw, default);
            default
        }
    }
}
