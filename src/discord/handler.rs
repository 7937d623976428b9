//! Discord gateway event handling.
//!
//! Turns guild text messages into [`InboundEvent`]s for the relay.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serenity::async_trait;
use serenity::model::channel::Message;
use serenity::model::event::ResumedEvent;
use serenity::model::gateway::Ready;
use serenity::model::id::GuildId;
use serenity::prelude::*;
use tracing::{debug, info, warn};

use crate::bridge::adapter::EventSink;
use crate::common::messages::{InboundEvent, Platform};
use crate::discord::resolver::{CacheLookup, MentionResolver};

/// Forwards relayable guild messages into the event sink.
pub struct RelayHandler {
    sink: EventSink,
    guild_filter: Option<GuildId>,
    resolver: Arc<MentionResolver>,
}

impl RelayHandler {
    pub fn new(sink: EventSink, guild_filter: Option<GuildId>, resolver: Arc<MentionResolver>) -> Self {
        Self {
            sink,
            guild_filter,
            resolver,
        }
    }
}

#[async_trait]
impl EventHandler for RelayHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(
            "Discord bot connected as {} ({} guilds)",
            ready.user.name,
            ready.guilds.len()
        );
    }

    async fn resume(&self, _ctx: Context, _event: ResumedEvent) {
        info!("Discord session resumed");
    }

    async fn message(&self, ctx: Context, msg: Message) {
        // Ignore our own messages and other bots
        if msg.author.bot || msg.author.id == ctx.cache.current_user().id {
            return;
        }

        // Only handle guild (server) messages
        let Some(guild_id) = msg.guild_id else {
            return;
        };
        if !accepts_guild(self.guild_filter, guild_id) {
            debug!(%guild_id, "Ignoring message from unbridged guild");
            return;
        }

        if msg.content.trim().is_empty() {
            return;
        }

        let text = {
            let lookup = CacheLookup::new(&ctx.cache, Some(guild_id), &msg.mentions);
            match self.resolver.resolve(&msg.content, &lookup) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Mention resolution failed, relaying raw content: {}", e);
                    msg.content.clone()
                }
            }
        };

        let channel_name = channel_name(&ctx, &msg, guild_id).await;
        let author_name = display_name(
            msg.member.as_ref().and_then(|m| m.nick.as_deref()),
            msg.author.global_name.as_deref(),
            &msg.author.name,
        );

        let event = InboundEvent {
            platform: Platform::Discord,
            origin_id: guild_id.to_string(),
            channel_id: msg.channel_id.to_string(),
            channel_name,
            author_name,
            author_avatar_url: Some(msg.author.face()),
            text,
            timestamp: DateTime::from_timestamp(msg.timestamp.unix_timestamp(), 0)
                .unwrap_or_else(Utc::now),
        };

        if self.sink.send(event).is_err() {
            warn!("Event sink closed, dropping Discord message");
        }
    }
}

async fn channel_name(ctx: &Context, msg: &Message, guild_id: GuildId) -> String {
    let cached = ctx
        .cache
        .guild(guild_id)
        .and_then(|guild| guild.channels.get(&msg.channel_id).map(|c| c.name.clone()));
    if let Some(name) = cached {
        return name;
    }

    match msg.channel_id.name(ctx).await {
        Ok(name) => name,
        Err(e) => {
            debug!("Could not resolve channel name for {}: {}", msg.channel_id, e);
            msg.channel_id.to_string()
        }
    }
}

fn accepts_guild(filter: Option<GuildId>, guild_id: GuildId) -> bool {
    filter.map_or(true, |allowed| allowed == guild_id)
}

/// Guild nickname, then global display name, then username.
fn display_name(nick: Option<&str>, global_name: Option<&str>, username: &str) -> String {
    nick.or(global_name)
        .filter(|name| !name.trim().is_empty())
        .unwrap_or(username)
        .to_string()
}
