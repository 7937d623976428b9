//! Discord platform adapter and send primitive.
//!
//! Hides serenity behind the [`PlatformAdapter`] and [`MessageSender`]
//! contracts used by the supervisor and the relay.

use std::num::NonZeroU64;
use std::sync::Arc;
use std::time::Duration;

use serenity::all::ShardManager;
use serenity::async_trait;
use serenity::builder::{
    CreateAllowedMentions, CreateEmbed, CreateEmbedAuthor, CreateEmbedFooter, CreateMessage,
};
use serenity::client::ClientBuilder;
use serenity::gateway::GatewayError;
use serenity::http::{Http, HttpBuilder};
use serenity::model::id::{ChannelId, GuildId};
use serenity::model::Timestamp;
use serenity::prelude::*;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::bridge::adapter::{EventSink, MessageSender, PlatformAdapter};
use crate::common::error::{ConnectionError, SendError};
use crate::common::messages::{EmbedCard, OutboundMessage, OutboundPayload, Platform};
use crate::config::env::DiscordSettings;
use crate::discord::handler::RelayHandler;
use crate::discord::resolver::MentionResolver;

/// Build a serenity HTTP client over a reqwest client with timeouts.
pub fn build_http(token: &str, timeout: Duration) -> Result<Http, reqwest::Error> {
    let reqwest_client = reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .build()?;

    Ok(HttpBuilder::new(token).client(reqwest_client).build())
}

fn intents() -> GatewayIntents {
    GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT
}

/// Gateway session for inbound Discord messages.
pub struct DiscordAdapter {
    token: String,
    http_timeout: Duration,
    /// Shared REST client used for the handshake.
    http: Arc<Http>,
    guild_filter: Option<GuildId>,
    resolver: Arc<MentionResolver>,
    shard_manager: Mutex<Option<Arc<ShardManager>>>,
}

impl DiscordAdapter {
    pub fn new(
        settings: &DiscordSettings,
        http: Arc<Http>,
        http_timeout: Duration,
        resolver: Arc<MentionResolver>,
    ) -> Self {
        Self {
            token: settings.token.clone(),
            http_timeout,
            http,
            guild_filter: settings
                .guild_id
                .and_then(NonZeroU64::new)
                .map(GuildId::from),
            resolver,
            shard_manager: Mutex::new(None),
        }
    }
}

#[async_trait]
impl PlatformAdapter for DiscordAdapter {
    fn platform(&self) -> Platform {
        Platform::Discord
    }

    async fn connect(&self) -> Result<(), ConnectionError> {
        let user = self.http.get_current_user().await.map_err(classify)?;
        info!("Discord token accepted for {}", user.name);
        Ok(())
    }

    async fn listen(&self, sink: EventSink) -> ConnectionError {
        let http = match build_http(&self.token, self.http_timeout) {
            Ok(http) => http,
            Err(e) => {
                return ConnectionError::Network {
                    message: e.to_string(),
                }
            }
        };

        let handler = RelayHandler::new(sink, self.guild_filter, Arc::clone(&self.resolver));
        let mut client = match ClientBuilder::new_with_http(http, intents())
            .event_handler(handler)
            .await
        {
            Ok(client) => client,
            Err(e) => return classify(e),
        };

        *self.shard_manager.lock().await = Some(client.shard_manager.clone());

        match client.start().await {
            Ok(()) => ConnectionError::Closed,
            Err(e) => classify(e),
        }
    }

    async fn disconnect(&self) {
        if let Some(manager) = self.shard_manager.lock().await.take() {
            debug!("Shutting down Discord shards");
            manager.shutdown_all().await;
        }
    }
}

/// Map serenity errors onto the supervisor's retry classes.
fn classify(error: serenity::Error) -> ConnectionError {
    match &error {
        serenity::Error::Http(http_error) => match http_error.status_code().map(|s| s.as_u16()) {
            Some(401 | 403) => ConnectionError::AuthRejected {
                message: error.to_string(),
            },
            Some(429) => ConnectionError::RateLimited { retry_after: None },
            _ => ConnectionError::Network {
                message: error.to_string(),
            },
        },
        serenity::Error::Gateway(
            GatewayError::InvalidAuthentication
            | GatewayError::InvalidGatewayIntents
            | GatewayError::DisallowedGatewayIntents,
        ) => ConnectionError::AuthRejected {
            message: error.to_string(),
        },
        serenity::Error::Gateway(_) => ConnectionError::SessionDropped {
            message: error.to_string(),
        },
        _ => ConnectionError::Network {
            message: error.to_string(),
        },
    }
}

/// REST send primitive for Discord channels.
pub struct DiscordSender {
    http: Arc<Http>,
}

impl DiscordSender {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl MessageSender for DiscordSender {
    fn platform(&self) -> Platform {
        Platform::Discord
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), SendError> {
        let channel = parse_channel(&message.destination.channel_id)?;

        let builder = match &message.payload {
            OutboundPayload::Embed(card) => CreateMessage::new().embed(build_embed(card)),
            OutboundPayload::Plain(text) => CreateMessage::new().content(text),
            OutboundPayload::Markup(_) => {
                return Err(SendError::UnsupportedPayload { platform: "Discord" })
            }
        };

        // Relayed text must never ping anyone
        let builder = builder.allowed_mentions(CreateAllowedMentions::new());

        channel.send_message(&*self.http, builder).await?;
        Ok(())
    }
}

fn parse_channel(id: &str) -> Result<ChannelId, SendError> {
    id.parse::<NonZeroU64>()
        .map(ChannelId::from)
        .map_err(|_| SendError::InvalidTarget {
            channel_id: id.to_string(),
        })
}

fn build_embed(card: &EmbedCard) -> CreateEmbed {
    let mut author = CreateEmbedAuthor::new(&card.author);
    if let Some(url) = &card.avatar_url {
        author = author.icon_url(url);
    }

    let embed = CreateEmbed::new()
        .author(author)
        .description(&card.description)
        .footer(CreateEmbedFooter::new(&card.footer));

    match Timestamp::from_unix_timestamp(card.timestamp.timestamp()) {
        Ok(timestamp) => embed.timestamp(timestamp),
        Err(_) => embed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_channel() {
        assert_eq!(parse_channel("123").unwrap(), ChannelId::new(123));
        assert!(matches!(parse_channel("0"), Err(SendError::InvalidTarget { .. })));
        assert!(matches!(
            parse_channel("-100555"),
            Err(SendError::InvalidTarget { .. })
        ));
    }

    #[test]
    fn test_invalid_gateway_auth_is_auth_rejection() {
        let error = classify(serenity::Error::Gateway(GatewayError::InvalidAuthentication));
        assert!(error.is_auth_rejection());
    }

    #[test]
    fn test_other_gateway_errors_are_transient() {
        let error = classify(serenity::Error::Gateway(GatewayError::HeartbeatFailed));
        assert!(matches!(error, ConnectionError::SessionDropped { .. }));
    }

    #[test]
    fn test_intents_include_message_content() {
        assert!(intents().contains(GatewayIntents::MESSAGE_CONTENT));
    }
}
