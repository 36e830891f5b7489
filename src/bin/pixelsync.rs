//! Pixel Controller Daemon
//!
//! Plays sequences from local storage, either looping the configured
//! autoplay file or following a leader's sync datagrams.

use anyhow::Result;
use crossbeam_channel::bounded;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pixelsync::{
    config::AppConfig,
    network::{detect_local_ipv4, wait_for_network, ReplySender, SyncListener},
    protocol::{EngineCommand, SyncEngine},
    storage::DirectoryStore,
    ui::WebServer,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;

    tracing::info!(
        "Starting PixelSync {} as '{}'",
        config.device.full_version(),
        config.device.hostname
    );
    tracing::info!("Sequences from {}", config.playback.sequence_dir.display());

    let store = Arc::new(DirectoryStore::new(&config.playback.sequence_dir));
    let mut engine = SyncEngine::new(&config, store);

    let (inbox_tx, inbox_rx) = bounded::<EngineCommand>(config.network.inbox_capacity);

    if config.ui.enabled {
        let _web_handle = WebServer::new(config.ui.clone(), inbox_tx.clone()).start_background();
    }

    // The listener binds once the device has an address
    let (ip_tx, mut ip_rx) = watch::channel(config.network.local_address);
    if config.network.local_address.is_none() {
        let route_target = config.network.multicast_group;
        tokio::spawn(async move {
            loop {
                if let Some(ip) = detect_local_ipv4(route_target) {
                    tracing::info!("Network up, device address {}", ip);
                    let _ = ip_tx.send(Some(ip));
                    return;
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        });
    }
    let network_ready = wait_for_network(&mut ip_rx);
    tokio::pin!(network_ready);
    let mut waiting_for_network = true;

    let mut listener: Option<SyncListener> = None;
    let mut replies: Option<ReplySender> = None;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut ticker = tokio::time::interval(Duration::from_millis(config.playback.poll_interval_ms));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let blank_timeout_ms = config.playback.blank_timeout_secs * 1000;
    let started = Instant::now();

    // Main poll loop; the only place engine state is touched
    loop {
        tokio::select! {
            ip = &mut network_ready, if waiting_for_network => {
                waiting_for_network = false;
                match ip {
                    Some(ip) => {
                        engine.set_local_ip(ip);
                        match SyncListener::bind(&config.network, ip, inbox_tx.clone()) {
                            Ok(bound) => {
                                let sender = bound.reply_sender();
                                if let Err(e) = sender.send(&engine.announcement()) {
                                    tracing::warn!("Announcement failed: {}", e);
                                }
                                replies = Some(sender);
                                listener = Some(bound);
                            }
                            Err(e) => {
                                tracing::error!("Sync disabled, listener could not start: {}", e);
                                engine.disable();
                            }
                        }
                    }
                    None => tracing::warn!("No device address, sync stays off"),
                }
            }
            _ = ticker.tick() => {}
            _ = &mut shutdown => {
                tracing::info!("Shutting down");
                break;
            }
        }

        let now = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        while let Ok(command) = inbox_rx.try_recv() {
            let Some(reply) = command.apply(&mut engine, now) else {
                continue;
            };
            if let Some(sender) = &replies {
                if let Err(e) = sender.send(&reply) {
                    tracing::debug!("Reply dropped: {}", e);
                }
            }
        }

        engine.poll(now);
        engine.enforce_blank_timeout(now, blank_timeout_ms);
    }

    engine.player_mut().stop();
    if let Some(listener) = listener {
        listener.shutdown();
    }
    Ok(())
}
