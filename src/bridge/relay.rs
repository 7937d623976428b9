//! Relay core: route, translate, compose and send one inbound message.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::bridge::adapter::{EventStream, MessageSender};
use crate::bridge::registry::MappingRegistry;
use crate::bridge::translator::{escape_markdown_v2, FormatTranslator};
use crate::common::error::{ComposeError, RenderError};
use crate::common::messages::{
    Destination, EmbedCard, InboundEvent, OutboundMessage, OutboundPayload, Platform,
};
use crate::common::text::truncate_chars;

/// Discord caps embed author names at 256 characters.
const EMBED_AUTHOR_LIMIT: usize = 256;

/// What happened to one inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Sent in the destination's native format.
    Delivered,
    /// Formatting failed; the plain text rendering was sent instead.
    DeliveredPlain,
    /// No bridge covers the source channel.
    NoMapping,
    /// The send failed and the event was discarded.
    Dropped,
}

/// Routes inbound events to the opposite platform.
pub struct RelayCore {
    registry: Arc<MappingRegistry>,
    translator: Arc<FormatTranslator>,
    discord: Arc<dyn MessageSender>,
    telegram: Arc<dyn MessageSender>,
}

impl RelayCore {
    pub fn new(
        registry: Arc<MappingRegistry>,
        translator: Arc<FormatTranslator>,
        discord: Arc<dyn MessageSender>,
        telegram: Arc<dyn MessageSender>,
    ) -> Self {
        debug_assert_eq!(discord.platform(), Platform::Discord);
        debug_assert_eq!(telegram.platform(), Platform::Telegram);
        Self {
            registry,
            translator,
            discord,
            telegram,
        }
    }

    /// Relay one event to the platform opposite `event.platform`.
    ///
    /// At most one native send and, if formatting failed, exactly one plain
    /// text send. Send failures are logged, never retried.
    pub async fn relay(&self, event: &InboundEvent) -> RelayOutcome {
        let Some(destination) = self.resolve(event) else {
            debug!(
                platform = %event.platform,
                origin = %event.origin_id,
                channel = %event.channel_id,
                "No bridge for channel"
            );
            return RelayOutcome::NoMapping;
        };

        let sender = self.sender_for(destination.platform);

        let (payload, outcome) = match self.render(event, &destination) {
            Ok(payload) => (payload, RelayOutcome::Delivered),
            Err(e) => {
                warn!(
                    bridge = %destination.bridge,
                    "Formatting failed ({}), sending plain text",
                    e
                );
                let plain = plain_rendering(event, destination.platform);
                (OutboundPayload::Plain(plain), RelayOutcome::DeliveredPlain)
            }
        };

        let message = OutboundMessage {
            destination,
            payload,
        };

        match sender.send(&message).await {
            Ok(()) => {
                info!(
                    bridge = %message.destination.bridge,
                    "{} #{} -> {} {}",
                    event.platform,
                    event.channel_name,
                    message.destination.platform,
                    message.destination.channel_name
                );
                outcome
            }
            Err(e) => {
                error!(
                    bridge = %message.destination.bridge,
                    channel = %message.destination.channel_id,
                    "Failed to send to {}: {}",
                    message.destination.platform,
                    e
                );
                RelayOutcome::Dropped
            }
        }
    }

    /// Drain one platform's event stream, relaying in arrival order.
    pub async fn drain(self: Arc<Self>, platform: Platform, mut events: EventStream) {
        while let Some(event) = events.recv().await {
            info!(
                platform = %event.platform,
                origin = %event.origin_id,
                channel = %event.channel_name,
                author = %event.author_name,
                "Received message"
            );
            self.relay(&event).await;
        }
        debug!(%platform, "Event stream closed");
    }

    fn resolve(&self, event: &InboundEvent) -> Option<Destination> {
        match event.platform {
            Platform::Discord => self
                .registry
                .resolve_a_to_b(&event.origin_id, &event.channel_id, &event.channel_name)
                .map(|route| Destination {
                    platform: Platform::Telegram,
                    bridge: route.bridge.to_string(),
                    channel_id: route.channel.id.clone(),
                    channel_name: route.channel.name.clone(),
                }),
            Platform::Telegram => {
                self.registry
                    .resolve_b_to_a(&event.origin_id)
                    .map(|route| Destination {
                        platform: Platform::Discord,
                        bridge: route.bridge.to_string(),
                        channel_id: route.channel.id.clone(),
                        channel_name: route.channel.name.clone(),
                    })
            }
        }
    }

    fn sender_for(&self, platform: Platform) -> &Arc<dyn MessageSender> {
        match platform {
            Platform::Discord => &self.discord,
            Platform::Telegram => &self.telegram,
        }
    }

    fn render(
        &self,
        event: &InboundEvent,
        destination: &Destination,
    ) -> Result<OutboundPayload, RenderError> {
        let body = self.translator.translate(&event.text, destination.platform)?;
        Ok(compose(event, destination.platform, body)?)
    }
}

/// Build the destination-native payload around an already translated body.
fn compose(
    event: &InboundEvent,
    destination: Platform,
    body: String,
) -> Result<OutboundPayload, ComposeError> {
    if body.trim().is_empty() {
        return Err(ComposeError::EmptyBody);
    }

    let payload = match destination {
        Platform::Discord => OutboundPayload::Embed(EmbedCard {
            author: truncate_chars(&event.author_name, EMBED_AUTHOR_LIMIT),
            avatar_url: event.author_avatar_url.clone(),
            description: body,
            footer: format!("via {}", event.platform),
            timestamp: event.timestamp,
        }),
        Platform::Telegram => {
            let time = event.timestamp.format("%H:%M UTC").to_string();
            OutboundPayload::Markup(format!(
                "*{}* \\| {} · {}\n{}",
                escape_markdown_v2(&event.author_name),
                event.platform,
                escape_markdown_v2(&time),
                body
            ))
        }
    };

    let len = match &payload {
        OutboundPayload::Embed(card) => card.description.chars().count(),
        OutboundPayload::Markup(text) | OutboundPayload::Plain(text) => text.chars().count(),
    };
    let limit = destination.markup_limit();
    if len > limit {
        return Err(ComposeError::TooLong { len, limit });
    }

    Ok(payload)
}

/// Untranslated `"<Source> | <author>: <text>"`, cut to the destination's limit.
fn plain_rendering(event: &InboundEvent, destination: Platform) -> String {
    let text = format!("{} | {}: {}", event.platform, event.author_name, event.text);
    truncate_chars(&text, destination.plain_limit())
}
