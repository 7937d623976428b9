//! Contracts between the relay, the supervisors and the platform clients.

use std::time::Duration;

use serenity::async_trait;
use tokio::sync::mpsc;

use crate::common::error::{ConnectionError, SendError};
use crate::common::messages::{InboundEvent, OutboundMessage, Platform};

/// Where adapters deliver normalized inbound messages.
pub type EventSink = mpsc::UnboundedSender<InboundEvent>;

/// Receiving end drained by a platform's dispatcher.
pub type EventStream = mpsc::UnboundedReceiver<InboundEvent>;

/// The send primitive of a destination platform.
#[async_trait]
pub trait MessageSender: Send + Sync {
    fn platform(&self) -> Platform;

    async fn send(&self, message: &OutboundMessage) -> Result<(), SendError>;
}

/// A platform session that a `ConnectionSupervisor` keeps alive.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Login / session handshake.
    async fn connect(&self) -> Result<(), ConnectionError>;

    /// Forward inbound messages into `sink` until the session ends, and
    /// return why it ended.
    async fn listen(&self, sink: EventSink) -> ConnectionError;

    /// How often to run `probe` while connected. `None` disables probing.
    fn liveness_interval(&self) -> Option<Duration> {
        None
    }

    async fn probe(&self) -> Result<(), ConnectionError> {
        Ok(())
    }

    /// Tear down the session. Safe to call when not connected.
    async fn disconnect(&self);
}
