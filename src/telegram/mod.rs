//! Telegram side of the bridge, over the Bot API.
//!
//! Inbound messages arrive by long-polling `getUpdates`; relayed messages
//! go out through `sendMessage` as MarkdownV2 or plain text.

pub mod api;
pub mod client;
pub mod entities;
pub mod types;

pub use api::TelegramApi;
pub use client::{TelegramAdapter, TelegramSender};
