//! OMAF Player
//!
//! Plays synthetic tiled 360° content headlessly.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize tracing
//! 3. Create the playback session (decoder manager, frame cache, extractor)
//! 4. Start segment downloads
//! 5. Spawn the provider and render tasks
//! 6. Wait for the end of playback, a time limit or a shutdown signal

#![warn(clippy::pedantic)]
#![allow(clippy::too_many_lines)] // main.rs orchestrates startup, naturally longer

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use common::observability::init_tracing;
use omaf_player::config::PlayerConfig;
use omaf_player::session::PlaybackSession;
use omaf_player::tasks::{run_provider_task, run_render_task};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = PlayerConfig::from_env().context("Failed to load configuration")?;
    init_tracing(&config.observability).context("Failed to initialize tracing")?;

    info!("Starting OMAF Player");
    info!(
        tiles = config.tile_count,
        segments = config.segment_count,
        segment_duration_ms = config.segment_duration_ms,
        frame_rate = config.frame_rate,
        decoders = config.decoder_count,
        stream_slots = config.max_stream_count,
        "Configuration loaded successfully"
    );

    let session = match PlaybackSession::new(config.clone()) {
        Ok(session) => Arc::new(session),
        Err(e) => {
            error!(error = %e, "Failed to create playback session");
            return Err(e.into());
        }
    };
    session.start().context("Failed to start downloads")?;

    // Render completion cancels the root token and with it the provider.
    let shutdown_token = CancellationToken::new();

    let provider_handle = tokio::spawn(run_provider_task(
        Arc::clone(&session),
        config.frame_interval() / 2,
        shutdown_token.child_token(),
    ));
    let render_handle = tokio::spawn(run_render_task(
        Arc::clone(&session),
        config.frame_interval(),
        shutdown_token.clone(),
    ));
    info!("Playback running - press Ctrl+C to stop");

    tokio::select! {
        () = shutdown_signal() => {
            info!("Shutdown signal received, stopping playback...");
        }
        () = shutdown_token.cancelled() => {}
        () = playback_limit(config.max_playback_secs) => {
            info!("Playback time limit reached");
        }
    }
    shutdown_token.cancel();

    for (name, handle) in [("provider", provider_handle), ("render", render_handle)] {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(task = name, error = %e, "Task ended with error"),
            Err(e) => warn!(task = name, error = %e, "Task did not complete"),
        }
    }

    session.shutdown().context("Failed to shut down session")?;

    let stats = session.stats();
    info!(
        packets_decoded = stats.packets_decoded,
        frames_rendered = stats.frames_rendered,
        sync_misses = stats.sync_misses,
        buffering_ticks = stats.buffering_ticks,
        last_pts_us = ?stats.last_rendered_pts,
        "OMAF Player shutdown complete"
    );
    Ok(())
}

async fn playback_limit(limit_secs: Option<u64>) {
    match limit_secs {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => std::future::pending::<()>().await,
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. Without them the player
/// cannot be stopped gracefully.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
