//! Room sync replay runner
//!
//! Joins a room and drives the synchronizer from a recording of session
//! callbacks read on stdin (newline-delimited JSON), logging every version
//! of the remote stream map.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment (fatal on error)
//! 2. Initialize tracing (`RUST_LOG`, falling back to `ROOM_LOG_LEVEL`)
//! 3. Fetch a join client token (fatal on error)
//! 4. Initialize and connect the replay session (fatal on error)
//! 5. Publish the local stream (non-fatal)
//! 6. Feed stdin until it closes or Ctrl+C
//! 7. Log the final state and shut down

#![warn(clippy::pedantic)]

use std::sync::Arc;

use room_sync::client::RoomClient;
use room_sync::config::{Config, DEFAULT_LOG_LEVEL};
use room_sync::replay::{ReplayConnector, SyntheticCapture};
use room_sync::stream_map::StreamMapReceiver;
use tokio::io::BufReader;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();

    let level = config
        .as_ref()
        .map_or(DEFAULT_LOG_LEVEL, |c| c.log_level.as_str());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("room_sync={level},common={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting room sync replay");

    let config = config.map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        room_id = %config.room_id,
        api_base_url = %config.api_base_url,
        log_level = %config.log_level,
        subscribe_kinds = %config.subscribe_kinds,
        callback_buffer = config.callback_buffer,
        "Configuration loaded successfully"
    );

    let connector = ReplayConnector::new();
    let client = RoomClient::start(&config, &connector, Arc::new(SyntheticCapture))
        .await
        .map_err(|e| {
            error!(error = %e, fatal = e.is_fatal(), "Failed to start room");
            e
        })?;

    let session = connector
        .session()
        .ok_or("replay session was not initialized")?;

    let map_logger = tokio::spawn(log_map_versions(client.streams()));

    match client.publish().await {
        Ok(handle) => info!(handle_id = %handle.id, "Local stream published"),
        Err(e) => warn!(error = %e, "Local stream not published, continuing"),
    }

    let input = BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = session.feed(input) => match result {
            Ok(emitted) => info!(emitted, "Replay finished"),
            Err(e) => warn!(error = %e, "Replay stopped early"),
        },
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    match client.state().await {
        Ok(state) => info!(
            participants = state.participants.len(),
            streams = state.streams.len(),
            subscriptions = state.subscriptions.len(),
            visible_streams = state.visible_streams,
            events_applied = state.events_applied,
            events_dropped = state.events_dropped,
            "Final room state"
        ),
        Err(e) => warn!(error = %e, "Could not read final room state"),
    }

    client.shutdown().await?;
    if let Err(e) = map_logger.await {
        warn!(error = %e, "Map logger task failed");
    }

    info!("Room sync replay stopped");
    Ok(())
}

/// Log each published version of the remote stream map until the writer
/// goes away.
async fn log_map_versions(mut streams: StreamMapReceiver) {
    while let Ok(snapshot) = streams.changed().await {
        let participants: Vec<String> = snapshot
            .entries()
            .map(|(id, handle)| format!("{id}={}", handle.id))
            .collect();
        info!(
            version = snapshot.version(),
            visible = snapshot.len(),
            entries = ?participants,
            "Stream map updated"
        );
    }
}
