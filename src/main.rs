//! Ferryman - Discord-Telegram chat bridge
//!
//! Relays messages between mapped Discord channels and Telegram chats,
//! translating formatting in both directions and keeping both platform
//! sessions alive with bounded reconnection.

mod bridge;
mod common;
mod config;
mod discord;
mod telegram;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use futures::future;
use tokio::signal;
use tracing::{error, info, warn};

use bridge::{
    supervise_pair, ConnectionSupervisor, EventChannels, FormatTranslator, MappingRegistry,
    MessageSender, PairOutcome, RelayCore,
};
use common::Platform;
use config::{MappingSource, Settings};
use discord::{build_http, DiscordAdapter, DiscordSender, MentionResolver};
use telegram::{TelegramAdapter, TelegramApi, TelegramSender};

/// How long supervisors get to disconnect cleanly on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Ferryman v{} starting...", env!("CARGO_PKG_VERSION"));

    let settings = Settings::from_env().map_err(|e| {
        error!("Invalid settings: {}", e);
        e
    })?;

    let source = MappingSource::from_env().map_err(|e| {
        error!("No channel mappings: {}", e);
        e
    })?;
    info!("Loading channel mappings from {}...", source);

    let registry = MappingRegistry::load(&source)?.validate().map_err(|e| {
        match e.report.first() {
            Some(violation) => error!("Invalid channel mappings: {}", violation),
            None => error!("Invalid channel mappings"),
        }
        for violation in e.report.iter().skip(1) {
            warn!("  also: {}", violation);
        }
        e
    })?;

    if registry.bridges().is_empty() {
        warn!("No bridges configured; nothing will be relayed");
    }
    for mapping in registry.bridges() {
        info!(
            "  Bridge '{}': {} Discord channel(s) -> Telegram {}",
            mapping.name,
            mapping.side_a.channels.len(),
            mapping.side_b.origin_id
        );
    }

    let translator = Arc::new(FormatTranslator::new()?);
    let resolver = Arc::new(MentionResolver::new()?);

    // ============================================================
    // Platform clients
    // ============================================================
    let discord_http = Arc::new(build_http(&settings.discord.token, settings.http_timeout)?);
    let telegram_api = Arc::new(TelegramApi::new(
        &settings.telegram.token,
        settings.http_timeout,
    )?);

    let discord_sender: Arc<dyn MessageSender> =
        Arc::new(DiscordSender::new(Arc::clone(&discord_http)));
    let telegram_sender: Arc<dyn MessageSender> =
        Arc::new(TelegramSender::new(Arc::clone(&telegram_api)));

    let relay = Arc::new(RelayCore::new(
        Arc::new(registry),
        translator,
        discord_sender,
        telegram_sender,
    ));

    // ============================================================
    // Relay dispatchers, one per inbound platform
    // ============================================================
    let EventChannels { sinks, streams } = EventChannels::new();

    let drain_discord = tokio::spawn(
        Arc::clone(&relay).drain(Platform::Discord, streams.discord),
    );
    let drain_telegram = tokio::spawn(
        Arc::clone(&relay).drain(Platform::Telegram, streams.telegram),
    );

    // ============================================================
    // Supervised platform sessions
    // ============================================================
    let discord_adapter = Arc::new(DiscordAdapter::new(
        &settings.discord,
        discord_http,
        settings.http_timeout,
        resolver,
    ));
    let telegram_adapter = Arc::new(TelegramAdapter::new(&settings.telegram, telegram_api));

    let (discord_supervisor, discord_handle) = ConnectionSupervisor::new(
        discord_adapter,
        settings.reconnect.clone(),
        sinks.for_platform(Platform::Discord),
    );
    let (telegram_supervisor, telegram_handle) = ConnectionSupervisor::new(
        telegram_adapter,
        settings.reconnect.clone(),
        sinks.for_platform(Platform::Telegram),
    );
    // Supervisors own the only sinks now; dispatchers end when they do.
    drop(sinks);

    let discord_task = discord_supervisor.spawn(discord_handle);
    let telegram_task = telegram_supervisor.spawn(telegram_handle);

    let outcome = supervise_pair(discord_task, telegram_task, shutdown_signal(), SHUTDOWN_GRACE).await;

    let drained =
        tokio::time::timeout(SHUTDOWN_GRACE, future::join(drain_discord, drain_telegram)).await;
    if drained.is_err() {
        warn!("Relay dispatchers did not finish within {:?}", SHUTDOWN_GRACE);
    }

    match outcome {
        PairOutcome::Shutdown => {
            info!("Exiting...");
            Ok(())
        }
        PairOutcome::Fatal { platform, error } => {
            error!("{} connection failed permanently: {}", platform, error);
            bail!("{} connection failed permanently: {}", platform, error)
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
