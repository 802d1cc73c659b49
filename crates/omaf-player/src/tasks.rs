//! Provider and render loops.
//!
//! Each loop ticks on its own interval and stops when its token is
//! cancelled. A fatal error cancels the token it was given so the other
//! side winds down too.

use crate::errors::PlayerError;
use crate::session::{PlaybackSession, ProviderStatus, RenderStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Download, parse and decode until all content reached the decoder.
///
/// # Errors
///
/// The first unrecoverable [`PlayerError`] of a provider step.
pub async fn run_provider_task(
    session: Arc<PlaybackSession>,
    interval: Duration,
    cancel_token: CancellationToken,
) -> Result<(), PlayerError> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    info!(
        target: "omaf.player.tasks",
        interval_ms = interval.as_millis(),
        "Provider task: Starting"
    );

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!(target: "omaf.player.tasks", "Provider task: Cancelled");
                break;
            }
            _ = ticker.tick() => {
                match session.provider_step() {
                    Ok(ProviderStatus::InputEnded) => {
                        info!(target: "omaf.player.tasks", "Provider task: Input complete");
                        break;
                    }
                    Ok(ProviderStatus::Feeding | ProviderStatus::Waiting) => {}
                    Err(e) if e.is_recoverable() => {
                        warn!(
                            target: "omaf.player.tasks",
                            error = %e,
                            error_type = e.error_type_label(),
                            "Provider step failed, will retry"
                        );
                    }
                    Err(e) => {
                        error!(target: "omaf.player.tasks", error = %e, "Provider task: Fatal error");
                        cancel_token.cancel();
                        return Err(e);
                    }
                }
            }
        }
    }

    info!(target: "omaf.player.tasks", "Provider task: Stopped");
    Ok(())
}

/// Present one frame per tick until the stream ends.
///
/// Cancels `cancel_token` when playback finishes.
///
/// # Errors
///
/// The first unrecoverable [`PlayerError`] of a render step.
pub async fn run_render_task(
    session: Arc<PlaybackSession>,
    interval: Duration,
    cancel_token: CancellationToken,
) -> Result<(), PlayerError> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    info!(
        target: "omaf.player.tasks",
        interval_ms = interval.as_millis(),
        "Render task: Starting"
    );

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!(target: "omaf.player.tasks", "Render task: Cancelled");
                break;
            }
            _ = ticker.tick() => {
                match session.render_step() {
                    Ok(RenderStatus::Finished) => {
                        let stats = session.stats();
                        info!(
                            target: "omaf.player.tasks",
                            frames_rendered = stats.frames_rendered,
                            sync_misses = stats.sync_misses,
                            "Render task: Playback finished"
                        );
                        cancel_token.cancel();
                        break;
                    }
                    Ok(_) => {}
                    Err(e) if e.is_recoverable() => {
                        warn!(
                            target: "omaf.player.tasks",
                            error = %e,
                            error_type = e.error_type_label(),
                            "Render step failed, will retry"
                        );
                    }
                    Err(e) => {
                        error!(target: "omaf.player.tasks", error = %e, "Render task: Fatal error");
                        cancel_token.cancel();
                        return Err(e);
                    }
                }
            }
        }
    }

    info!(target: "omaf.player.tasks", "Render task: Stopped");
    Ok(())
}
