//! Discord side of the bridge.
//!
//! The gateway session feeds inbound messages to the relay; the REST
//! sender delivers relayed messages as embeds.

pub mod client;
pub mod handler;
pub mod resolver;

pub use client::{build_http, DiscordAdapter, DiscordSender};
pub use resolver::MentionResolver;
