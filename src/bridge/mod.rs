//! Platform-neutral bridge machinery.
//!
//! ## Module Structure
//!
//! - `adapter`: contracts implemented by the Discord and Telegram clients
//! - `channels`: per-platform event queues
//! - `registry`: validated channel mappings and route lookup
//! - `translator`: Markdown ↔ MarkdownV2 conversion
//! - `relay`: route, translate, compose and send
//! - `supervisor`: connection lifecycle and reconnection

pub mod adapter;
pub mod channels;
pub mod registry;
pub mod relay;
pub mod supervisor;
pub mod translator;

pub use adapter::{EventSink, EventStream, MessageSender, PlatformAdapter};
pub use channels::EventChannels;
pub use registry::MappingRegistry;
pub use relay::RelayCore;
pub use supervisor::{supervise_pair, ConnectionSupervisor, PairOutcome};
pub use translator::FormatTranslator;
