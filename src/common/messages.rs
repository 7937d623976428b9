//! Canonical message types for bridge communication.
//!
//! This module defines the single source of truth for the shapes that
//! flow between the platform adapters and the relay.

use std::fmt;

use chrono::{DateTime, Utc};

/// One of the two bridged chat platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// Side A of every bridge mapping.
    Discord,
    /// Side B of every bridge mapping.
    Telegram,
}

impl Platform {
    /// The platform on the other end of the bridge.
    pub fn opposite(self) -> Self {
        match self {
            Self::Discord => Self::Telegram,
            Self::Telegram => Self::Discord,
        }
    }

    /// Display name, also used as the source badge on relayed messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::Discord => "Discord",
            Self::Telegram => "Telegram",
        }
    }

    /// Maximum length of a formatted message body on this platform.
    pub fn markup_limit(self) -> usize {
        match self {
            // Embed description
            Self::Discord => 4096,
            Self::Telegram => 4096,
        }
    }

    /// Maximum length of a plain text message on this platform.
    pub fn plain_limit(self) -> usize {
        match self {
            Self::Discord => 2000,
            Self::Telegram => 4096,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A chat message received from one platform, normalized for the relay.
///
/// Consumed once by the relay and then discarded.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    /// Platform the message was posted on.
    pub platform: Platform,
    /// Guild id (Discord) or chat id (Telegram).
    pub origin_id: String,
    /// Channel the message was posted in.
    pub channel_id: String,
    /// Human-readable channel name.
    pub channel_name: String,
    /// Sender's display name.
    pub author_name: String,
    /// Sender's avatar, when the platform exposes one.
    pub author_avatar_url: Option<String>,
    /// Message text in the source platform's dialect.
    pub text: String,
    /// When the message was posted.
    pub timestamp: DateTime<Utc>,
}

/// Where a relayed message goes. Captured before the first send attempt
/// so the fallback path always has the same target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub platform: Platform,
    /// Name of the bridge mapping that produced this destination.
    pub bridge: String,
    pub channel_id: String,
    pub channel_name: String,
}

/// Rich card rendered as a Discord embed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedCard {
    pub author: String,
    pub avatar_url: Option<String>,
    pub description: String,
    pub footer: String,
    pub timestamp: DateTime<Utc>,
}

/// Destination-native message content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundPayload {
    /// Discord embed with sender attribution.
    Embed(EmbedCard),
    /// Telegram MarkdownV2 text.
    Markup(String),
    /// Untranslated text sent without any parse mode.
    Plain(String),
}

/// A message ready for a destination adapter's send primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub destination: Destination,
    pub payload: OutboundPayload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opposite_never_returns_self() {
        for platform in [Platform::Discord, Platform::Telegram] {
            assert_ne!(platform.opposite(), platform);
            assert_eq!(platform.opposite().opposite(), platform);
        }
    }

    #[test]
    fn test_badge_names() {
        assert_eq!(Platform::Discord.to_string(), "Discord");
        assert_eq!(Platform::Telegram.name(), "Telegram");
    }
}
