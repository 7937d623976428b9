//! Event channel wiring between adapters and the relay.
//!
//! Each platform gets its own unbounded queue so that one side's backlog
//! never reorders the other's events.

use tokio::sync::mpsc;

use crate::bridge::adapter::{EventSink, EventStream};
use crate::common::messages::Platform;

/// Adapter-facing halves: where each platform's supervisor delivers events.
pub struct SinkChannels {
    pub discord: EventSink,
    pub telegram: EventSink,
}

impl SinkChannels {
    pub fn for_platform(&self, platform: Platform) -> EventSink {
        match platform {
            Platform::Discord => self.discord.clone(),
            Platform::Telegram => self.telegram.clone(),
        }
    }
}

/// Relay-facing halves, drained in arrival order.
pub struct StreamChannels {
    pub discord: EventStream,
    pub telegram: EventStream,
}

/// Bundle of both platforms' event queues.
pub struct EventChannels {
    pub sinks: SinkChannels,
    pub streams: StreamChannels,
}

impl EventChannels {
    pub fn new() -> Self {
        let (discord_tx, discord_rx) = mpsc::unbounded_channel();
        let (telegram_tx, telegram_rx) = mpsc::unbounded_channel();

        Self {
            sinks: SinkChannels {
                discord: discord_tx,
                telegram: telegram_tx,
            },
            streams: StreamChannels {
                discord: discord_rx,
                telegram: telegram_rx,
            },
        }
    }
}

impl Default for EventChannels {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::common::messages::InboundEvent;

    fn event(platform: Platform, text: &str) -> InboundEvent {
        InboundEvent {
            platform,
            origin_id: "1".to_string(),
            channel_id: "2".to_string(),
            channel_name: "general".to_string(),
            author_name: "alice".to_string(),
            author_avatar_url: None,
            text: text.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_platform_queues_are_separate() {
        let EventChannels { sinks, mut streams } = EventChannels::new();

        sinks.for_platform(Platform::Discord).send(event(Platform::Discord, "a")).unwrap();
        sinks.for_platform(Platform::Telegram).send(event(Platform::Telegram, "b")).unwrap();
        sinks.for_platform(Platform::Discord).send(event(Platform::Discord, "c")).unwrap();

        assert_eq!(streams.discord.recv().await.unwrap().text, "a");
        assert_eq!(streams.discord.recv().await.unwrap().text, "c");
        assert_eq!(streams.telegram.recv().await.unwrap().text, "b");
        assert!(streams.telegram.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stream_ends_when_sinks_dropped() {
        let EventChannels { sinks, mut streams } = EventChannels::new();
        drop(sinks);
        assert!(streams.discord.recv().await.is_none());
    }
}
