//! Common utilities and types shared across the application.

pub mod error;
pub mod messages;
pub mod reconnect;
pub mod text;

// Re-export message types from messages module
pub use messages::{
    Destination, EmbedCard, InboundEvent, OutboundMessage, OutboundPayload, Platform,
};
