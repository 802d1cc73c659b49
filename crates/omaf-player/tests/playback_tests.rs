//! End-to-end playback through the provider and render tasks.
//!
//! Time is paused; tokio advances it whenever both tasks are idle, so the
//! loops run at their configured intervals without real waiting.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use omaf_player::config::PlayerConfig;
use omaf_player::session::PlaybackSession;
use omaf_player::tasks::{run_provider_task, run_render_task};
use tokio_util::sync::CancellationToken;

/// Two segments of five frames each at 25 fps.
fn short_content() -> PlayerConfig {
    PlayerConfig {
        segment_count: 2,
        segment_duration_ms: 200,
        width: 64,
        height: 32,
        ..PlayerConfig::default()
    }
}

fn start_session(config: PlayerConfig) -> Arc<PlaybackSession> {
    let session = Arc::new(PlaybackSession::new(config).unwrap());
    session.start().unwrap();
    session
}

// ============================================================================
// Playback to the end
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_playback_runs_to_completion() {
    let config = short_content();
    let session = start_session(config.clone());
    let token = CancellationToken::new();

    let provider = tokio::spawn(run_provider_task(
        Arc::clone(&session),
        config.frame_interval() / 2,
        token.child_token(),
    ));
    let render = tokio::spawn(run_render_task(
        Arc::clone(&session),
        config.frame_interval(),
        token.clone(),
    ));

    let rendered = tokio::time::timeout(Duration::from_secs(30), render)
        .await
        .expect("playback should finish");
    rendered.unwrap().unwrap();
    provider.await.unwrap().unwrap();

    // Finishing playback cancels the shared token.
    assert!(token.is_cancelled());
    assert!(session.manager().is_eos(session.stream()));

    let stats = session.stats();
    assert_eq!(stats.packets_decoded, 10);
    assert!(stats.frames_rendered >= 5, "rendered {}", stats.frames_rendered);
    assert!(stats.buffering_ticks >= 1);
    let last = stats.last_rendered_pts.unwrap();
    assert!(last <= 360_000);
    assert_eq!(last % 40_000, 0);
}

#[tokio::test(start_paused = true)]
async fn test_session_shutdown_after_playback() {
    let config = short_content();
    let session = start_session(config.clone());
    let token = CancellationToken::new();

    let provider = tokio::spawn(run_provider_task(
        Arc::clone(&session),
        config.frame_interval() / 2,
        token.child_token(),
    ));
    run_render_task(Arc::clone(&session), config.frame_interval(), token.clone())
        .await
        .unwrap();
    provider.await.unwrap().unwrap();

    session.shutdown().unwrap();
    assert!(session.manager().is_free(session.stream()));
    assert_eq!(session.textures().live_textures(), 0);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_both_tasks() {
    let config = PlayerConfig {
        segment_count: 100,
        ..short_content()
    };
    let session = start_session(config.clone());
    let token = CancellationToken::new();

    let provider = tokio::spawn(run_provider_task(
        Arc::clone(&session),
        config.frame_interval() / 2,
        token.child_token(),
    ));
    let render = tokio::spawn(run_render_task(
        Arc::clone(&session),
        config.frame_interval(),
        token.clone(),
    ));

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!token.is_cancelled());
    token.cancel();

    provider.await.unwrap().unwrap();
    render.await.unwrap().unwrap();

    let stats = session.stats();
    assert!(stats.frames_rendered > 0);
    assert!(stats.packets_decoded < 500);
    assert!(!session.manager().is_eos(session.stream()));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_provider_leaves_render_running() {
    let config = short_content();
    let session = start_session(config.clone());
    let token = CancellationToken::new();
    let provider_token = token.child_token();

    let provider = tokio::spawn(run_provider_task(
        Arc::clone(&session),
        config.frame_interval() / 2,
        provider_token.clone(),
    ));
    provider_token.cancel();
    provider.await.unwrap().unwrap();

    // Cancelling a child does not reach the parent.
    assert!(!token.is_cancelled());
}
