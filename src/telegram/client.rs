//! Telegram platform adapter and send primitive.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serenity::async_trait;
use tracing::{debug, info, warn};

use crate::bridge::adapter::{EventSink, MessageSender, PlatformAdapter};
use crate::common::error::{ConnectionError, SendError};
use crate::common::messages::{InboundEvent, OutboundMessage, OutboundPayload, Platform};
use crate::config::env::TelegramSettings;

use super::api::TelegramApi;
use super::entities::to_markdown_v2;
use super::types::Update;

const PARSE_MODE: &str = "MarkdownV2";

/// Long-polling session for inbound Telegram messages.
pub struct TelegramAdapter {
    api: Arc<TelegramApi>,
    group_filter: Option<String>,
    poll_timeout_secs: u64,
    poll_limit: u8,
    probe_interval: Duration,
    /// Next `getUpdates` offset; 0 until the first update is seen. Kept
    /// across reconnects so updates are not delivered twice.
    offset: AtomicI64,
}

impl TelegramAdapter {
    pub fn new(settings: &TelegramSettings, api: Arc<TelegramApi>) -> Self {
        Self {
            api,
            group_filter: settings.group_id.clone(),
            poll_timeout_secs: settings.poll_timeout_secs,
            poll_limit: settings.poll_limit,
            probe_interval: settings.probe_interval,
            offset: AtomicI64::new(0),
        }
    }

    fn offset(&self) -> Option<i64> {
        match self.offset.load(Ordering::SeqCst) {
            0 => None,
            n => Some(n),
        }
    }
}

#[async_trait]
impl PlatformAdapter for TelegramAdapter {
    fn platform(&self) -> Platform {
        Platform::Telegram
    }

    async fn connect(&self) -> Result<(), ConnectionError> {
        let me = self.api.get_me().await?;
        info!(
            "Telegram bot connected as @{}",
            me.username.as_deref().unwrap_or(&me.first_name)
        );
        Ok(())
    }

    async fn listen(&self, sink: EventSink) -> ConnectionError {
        loop {
            let updates = match self
                .api
                .get_updates(self.offset(), self.poll_timeout_secs, self.poll_limit)
                .await
            {
                Ok(updates) => updates,
                Err(e) => return e.into(),
            };

            for update in &updates {
                self.offset.fetch_max(update.update_id + 1, Ordering::SeqCst);

                let Some(event) = inbound_event(update, self.group_filter.as_deref()) else {
                    continue;
                };
                if sink.send(event).is_err() {
                    warn!("Event sink closed, stopping Telegram poller");
                    return ConnectionError::Closed;
                }
            }
        }
    }

    fn liveness_interval(&self) -> Option<Duration> {
        (!self.probe_interval.is_zero()).then_some(self.probe_interval)
    }

    async fn probe(&self) -> Result<(), ConnectionError> {
        self.api.get_me().await?;
        debug!("Telegram liveness probe ok");
        Ok(())
    }

    async fn disconnect(&self) {
        // Dropping the poll future is enough; no session to close.
        debug!("Telegram poller stopped");
    }
}

/// Normalize a Telegram update, or `None` if it should not be relayed.
pub fn inbound_event(update: &Update, group_filter: Option<&str>) -> Option<InboundEvent> {
    let message = update.message.as_ref()?;
    let from = message.from.as_ref()?;
    if from.is_bot {
        return None;
    }

    let chat_id = message.chat.id.to_string();
    if group_filter.is_some_and(|group| group != chat_id) {
        return None;
    }

    let (text, entities) = match (&message.text, &message.caption) {
        (Some(text), _) => (text, &message.entities),
        (None, Some(caption)) => (caption, &message.caption_entities),
        (None, None) => return None,
    };
    if text.trim().is_empty() {
        return None;
    }

    let author_name = from
        .username
        .clone()
        .unwrap_or_else(|| from.first_name.clone());

    Some(InboundEvent {
        platform: Platform::Telegram,
        origin_id: chat_id.clone(),
        channel_name: message.chat.title.clone().unwrap_or_else(|| chat_id.clone()),
        channel_id: chat_id,
        author_name,
        // Photo URLs embed the bot token, so no avatar is exposed.
        author_avatar_url: None,
        text: to_markdown_v2(text, entities),
        timestamp: DateTime::from_timestamp(message.date, 0).unwrap_or_else(Utc::now),
    })
}

/// `sendMessage` primitive for Telegram chats.
pub struct TelegramSender {
    api: Arc<TelegramApi>,
}

impl TelegramSender {
    pub fn new(api: Arc<TelegramApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl MessageSender for TelegramSender {
    fn platform(&self) -> Platform {
        Platform::Telegram
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), SendError> {
        let chat_id = &message.destination.channel_id;
        if chat_id.trim().is_empty() {
            return Err(SendError::InvalidTarget {
                channel_id: chat_id.clone(),
            });
        }

        match &message.payload {
            OutboundPayload::Markup(text) => {
                self.api.send_message(chat_id, text, Some(PARSE_MODE)).await?;
            }
            OutboundPayload::Plain(text) => {
                self.api.send_message(chat_id, text, None).await?;
            }
            OutboundPayload::Embed(_) => {
                return Err(SendError::UnsupportedPayload {
                    platform: "Telegram",
                })
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(json: &str) -> Update {
        serde_json::from_str(json).unwrap()
    }

    const GROUP_MESSAGE: &str = r#"{
        "update_id": 10,
        "message": {
            "message_id": 1,
            "from": {"id": 7, "is_bot": false, "first_name": "Bob", "username": "bobby"},
            "chat": {"id": -100555, "title": "General", "type": "supergroup"},
            "date": 1714566300,
            "text": "*hi* there"
        }
    }"#;

    #[test]
    fn test_group_message_becomes_event() {
        let event = inbound_event(&update(GROUP_MESSAGE), None).unwrap();
        assert_eq!(event.platform, Platform::Telegram);
        assert_eq!(event.origin_id, "-100555");
        assert_eq!(event.channel_id, "-100555");
        assert_eq!(event.channel_name, "General");
        assert_eq!(event.author_name, "bobby");
        // No entities, so the asterisks are literal.
        assert_eq!(event.text, "\\*hi\\* there");
        assert!(event.author_avatar_url.is_none());
        assert_eq!(event.timestamp.timestamp(), 1714566300);
    }

    #[test]
    fn test_first_name_when_no_username() {
        let json = GROUP_MESSAGE.replace(r#", "username": "bobby""#, "");
        let event = inbound_event(&update(&json), None).unwrap();
        assert_eq!(event.author_name, "Bob");
    }

    #[test]
    fn test_bots_are_ignored() {
        let json = GROUP_MESSAGE.replace(r#""is_bot": false"#, r#""is_bot": true"#);
        assert!(inbound_event(&update(&json), None).is_none());
    }

    #[test]
    fn test_group_filter() {
        assert!(inbound_event(&update(GROUP_MESSAGE), Some("-100555")).is_some());
        assert!(inbound_event(&update(GROUP_MESSAGE), Some("-100999")).is_none());
    }

    #[test]
    fn test_caption_used_when_no_text() {
        let json = GROUP_MESSAGE.replace(r#""text": "*hi* there""#, r#""caption": "look""#);
        let event = inbound_event(&update(&json), None).unwrap();
        assert_eq!(event.text, "look");
    }

    #[test]
    fn test_entities_become_markup() {
        let json = GROUP_MESSAGE.replace(
            r#""text": "*hi* there""#,
            r#""text": "hi there 1.5", "entities": [{"type": "bold", "offset": 0, "length": 2}]"#,
        );
        let event = inbound_event(&update(&json), None).unwrap();
        assert_eq!(event.text, "*hi* there 1\\.5");
    }

    #[test]
    fn test_caption_entities_used_for_caption() {
        let json = GROUP_MESSAGE.replace(
            r#""text": "*hi* there""#,
            r#""caption": "look", "caption_entities": [{"type": "italic", "offset": 0, "length": 4}]"#,
        );
        let event = inbound_event(&update(&json), None).unwrap();
        assert_eq!(event.text, "_look_");
    }

    #[test]
    fn test_literal_text_survives_translation() {
        use crate::bridge::FormatTranslator;

        let json = GROUP_MESSAGE.replace(r#""text": "*hi* there""#, r#""text": "a *b* c \\o/""#);
        let event = inbound_event(&update(&json), None).unwrap();
        let translator = FormatTranslator::new().unwrap();
        assert_eq!(translator.to_discord(&event.text).unwrap(), "a *b* c \\o/");
    }

    #[test]
    fn test_empty_or_missing_text_ignored() {
        let json = GROUP_MESSAGE.replace(r#""text": "*hi* there""#, r#""text": "  ""#);
        assert!(inbound_event(&update(&json), None).is_none());
        assert!(inbound_event(&update(r#"{"update_id": 11}"#), None).is_none());
    }
}
