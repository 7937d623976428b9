//! Mention and emoji resolution for inbound Discord messages.
//!
//! Raw Discord content carries `<@id>`, `<@&id>`, `<#id>` and `<:name:id>`
//! tokens that mean nothing on the other side of the bridge. They are
//! replaced with readable `@name`, `#name` and emoji text here.

use std::num::NonZeroU64;

use fancy_regex::Regex;
use serenity::cache::Cache;
use serenity::model::id::{ChannelId, GuildId, RoleId, UserId};
use serenity::model::user::User;

use crate::common::error::TranslateError;
use crate::common::text::{compile, rewrite};

/// Name lookups the resolver needs.
pub trait MentionLookup {
    fn user_name(&self, id: NonZeroU64) -> Option<String>;
    fn role_name(&self, id: NonZeroU64) -> Option<String>;
    fn channel_name(&self, id: NonZeroU64) -> Option<String>;
}

/// Lookup backed by the serenity cache and the message's own mention list.
pub struct CacheLookup<'a> {
    cache: &'a Cache,
    guild_id: Option<GuildId>,
    mentions: &'a [User],
}

impl<'a> CacheLookup<'a> {
    pub fn new(cache: &'a Cache, guild_id: Option<GuildId>, mentions: &'a [User]) -> Self {
        Self {
            cache,
            guild_id,
            mentions,
        }
    }
}

impl MentionLookup for CacheLookup<'_> {
    fn user_name(&self, id: NonZeroU64) -> Option<String> {
        let user_id = UserId::from(id);

        if let Some(guild_id) = self.guild_id {
            let nick = self
                .cache
                .guild(guild_id)
                .and_then(|guild| guild.members.get(&user_id).and_then(|m| m.nick.clone()));
            if nick.is_some() {
                return nick;
            }
        }

        if let Some(user) = self.mentions.iter().find(|u| u.id == user_id) {
            return Some(user.global_name.clone().unwrap_or_else(|| user.name.clone()));
        }

        self.cache
            .user(user_id)
            .map(|user| user.global_name.clone().unwrap_or_else(|| user.name.clone()))
    }

    fn role_name(&self, id: NonZeroU64) -> Option<String> {
        let guild = self.cache.guild(self.guild_id?)?;
        guild.roles.get(&RoleId::from(id)).map(|role| role.name.clone())
    }

    fn channel_name(&self, id: NonZeroU64) -> Option<String> {
        let guild = self.cache.guild(self.guild_id?)?;
        guild
            .channels
            .get(&ChannelId::from(id))
            .map(|channel| channel.name.clone())
    }
}

/// Rewrites Discord-only tokens into portable text.
#[derive(Debug)]
pub struct MentionResolver {
    /// `<@123>` or `<@!123>`
    user_pattern: Regex,
    /// `<@&123>`
    role_pattern: Regex,
    /// `<#123>`
    channel_pattern: Regex,
    /// `<:name:123>` or `<a:name:123>`
    emoji_pattern: Regex,
}

impl MentionResolver {
    pub fn new() -> Result<Self, TranslateError> {
        Ok(Self {
            user_pattern: compile("user_mention", r"<@!?(\d+)>")?,
            role_pattern: compile("role_mention", r"<@&(\d+)>")?,
            channel_pattern: compile("channel_mention", r"<#(\d+)>")?,
            emoji_pattern: compile("custom_emoji", r"<a?:([a-zA-Z0-9_]+):\d+>")?,
        })
    }

    /// Resolve every token in `message`. Unknown ids are left untouched.
    pub fn resolve(
        &self,
        message: &str,
        lookup: &dyn MentionLookup,
    ) -> Result<String, TranslateError> {
        let text = rewrite(&self.user_pattern, "user_mention", message, |caps| {
            named(caps, '@', |id| lookup.user_name(id))
        })?;
        let text = rewrite(&self.role_pattern, "role_mention", &text, |caps| {
            named(caps, '@', |id| lookup.role_name(id))
        })?;
        let text = rewrite(&self.channel_pattern, "channel_mention", &text, |caps| {
            named(caps, '#', |id| lookup.channel_name(id))
        })?;
        let text = rewrite(&self.emoji_pattern, "custom_emoji", &text, |caps| {
            format!(":{}:", caps.get(1).map(|m| m.as_str()).unwrap_or(""))
        })?;
        Ok(resolve_shortcodes(&text))
    }
}

fn named<F>(caps: &fancy_regex::Captures<'_>, sigil: char, lookup: F) -> String
where
    F: Fn(NonZeroU64) -> Option<String>,
{
    let original = caps.get(0).map(|m| m.as_str()).unwrap_or("");
    caps.get(1)
        .and_then(|m| m.as_str().parse::<NonZeroU64>().ok())
        .and_then(lookup)
        .map(|name| format!("{}{}", sigil, name))
        .unwrap_or_else(|| original.to_string())
}

/// Replace `:shortcode:` with the Unicode emoji when one exists.
pub fn resolve_shortcodes(message: &str) -> String {
    let mut result = String::with_capacity(message.len());
    let mut chars = message.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != ':' {
            result.push(ch);
            continue;
        }

        let mut shortcode = String::new();
        let mut closed = false;

        while let Some(&next) = chars.peek() {
            if next == ':' {
                closed = true;
                chars.next();
                break;
            } else if next.is_alphanumeric() || next == '_' || next == '-' || next == '+' {
                shortcode.push(next);
                chars.next();
            } else {
                break;
            }
        }

        if !closed {
            result.push(':');
            result.push_str(&shortcode);
            continue;
        }

        match emojis::get_by_shortcode(&shortcode.to_lowercase()) {
            Some(emoji) if !shortcode.is_empty() => result.push_str(emoji.as_str()),
            _ => {
                result.push(':');
                result.push_str(&shortcode);
                result.push(':');
            }
        }
    }

    result
}
