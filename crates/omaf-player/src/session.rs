//! Playback session.
//!
//! A session owns one decoder stream fed by one multi-resolution extractor.
//! The provider side downloads, concatenates and decodes; the render side
//! uploads the frame due at the playback clock. Both sides only share the
//! session through `Arc`, the same way a player shell drives them from its
//! provider and render threads.

use crate::config::PlayerConfig;
use crate::content::{PacketQueue, SampleParser, SyntheticContent, SyntheticSegmentStream};
use crate::errors::PlayerError;
use common::types::{AdaptationSetId, StreamId, Streams};
use dash_provider::{
    DashAdaptationSetExtractorMr, ExtractorRepresentation, QualityDescriptor, QualityScheme,
    TileAdaptationSet, TileRepresentation,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use video_decoder::null_decoder::{NullDecoderConfig, NullDecoderPool};
use video_decoder::{
    DecodeResult, DecoderConfig, HeadlessTextureBackend, PixelFormat, PooledFrameCache, VideoCodec,
    VideoDecoderManager,
};

/// Adaptation set id of the extractor; tiles use 1..=tile_count.
const EXTRACTOR_SET_ID: AdaptationSetId = 0;

const EXTRACTOR_BANDWIDTH: u32 = 200_000;

/// Tile representations in manifest order as (suffix, SRQR ranking, bandwidth).
const TILE_QUALITIES: [(&str, u8, u32); 2] = [("low", 5, 1_000_000), ("high", 1, 4_000_000)];

/// Synthetic segment payload size in bytes.
const SEGMENT_PAYLOAD_LEN: usize = 64;

const NO_FRAME: u64 = u64::MAX;

/// Outcome of one provider step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStatus {
    /// At least one packet reached the decoder.
    Feeding,
    /// Nothing could be decoded this time.
    Waiting,
    /// All content was handed to the decoder.
    InputEnded,
}

/// Outcome of one render step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    Buffering,
    Rendered { pts_us: u64 },
    /// No frame is due yet at the playback clock.
    Stalled,
    Finished,
}

/// Playback counters, updated from both sides.
#[derive(Debug)]
pub struct PlaybackStats {
    packets_decoded: AtomicU64,
    frames_rendered: AtomicU64,
    sync_misses: AtomicU64,
    buffering_ticks: AtomicU64,
    last_rendered_pts: AtomicU64,
}

impl Default for PlaybackStats {
    fn default() -> Self {
        Self {
            packets_decoded: AtomicU64::new(0),
            frames_rendered: AtomicU64::new(0),
            sync_misses: AtomicU64::new(0),
            buffering_ticks: AtomicU64::new(0),
            last_rendered_pts: AtomicU64::new(NO_FRAME),
        }
    }
}

/// Point-in-time copy of [`PlaybackStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub packets_decoded: u64,
    pub frames_rendered: u64,
    pub sync_misses: u64,
    pub buffering_ticks: u64,
    pub last_rendered_pts: Option<u64>,
}

impl PlaybackStats {
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let last = self.last_rendered_pts.load(Ordering::SeqCst);
        StatsSnapshot {
            packets_decoded: self.packets_decoded.load(Ordering::SeqCst),
            frames_rendered: self.frames_rendered.load(Ordering::SeqCst),
            sync_misses: self.sync_misses.load(Ordering::SeqCst),
            buffering_ticks: self.buffering_ticks.load(Ordering::SeqCst),
            last_rendered_pts: (last != NO_FRAME).then_some(last),
        }
    }
}

pub struct PlaybackSession {
    config: PlayerConfig,
    manager: Arc<VideoDecoderManager>,
    textures: Arc<HeadlessTextureBackend>,
    extractor: Mutex<DashAdaptationSetExtractorMr>,
    packets: PacketQueue,
    stream: StreamId,
    clock_us: AtomicU64,
    input_eos_sent: AtomicBool,
    stats: PlaybackStats,
}

impl PlaybackSession {
    /// Build the decoder side and the extractor, and reserve a decoder.
    ///
    /// # Errors
    ///
    /// Invalid configuration, or no decoder engine for the stream.
    pub fn new(config: PlayerConfig) -> Result<Self, PlayerError> {
        config.validate()?;

        let textures = Arc::new(HeadlessTextureBackend::new());
        let cache = Arc::new(PooledFrameCache::new(
            config.frame_cache_config(),
            textures.clone(),
        )?);
        let pool = Arc::new(NullDecoderPool::new(
            cache.clone(),
            NullDecoderConfig {
                capacity: config.decoder_count,
                ..NullDecoderConfig::default()
            },
        ));
        let manager = Arc::new(VideoDecoderManager::new(
            config.manager_config(),
            cache,
            pool,
        )?);
        manager.create_video_decoders(VideoCodec::Hevc, config.decoder_count);

        let stream = manager.generate_unique_stream_id(false)?;
        let decoder_config =
            DecoderConfig::new(VideoCodec::Hevc, config.width, config.height, PixelFormat::Nv12);
        manager.initialize_stream(stream, decoder_config)?;
        manager.activate_stream(stream, 0)?;

        let packets = PacketQueue::new();
        let extractor = build_extractor(&config, packets.clone())?;
        info!(
            target: "omaf.player.session",
            stream = %stream,
            tiles = extractor.supporting_set_count(),
            width = config.width,
            height = config.height,
            "Playback session created"
        );

        Ok(Self {
            config,
            manager,
            textures,
            extractor: Mutex::new(extractor),
            packets,
            stream,
            clock_us: AtomicU64::new(0),
            input_eos_sent: AtomicBool::new(false),
            stats: PlaybackStats::default(),
        })
    }

    #[must_use]
    pub fn stream(&self) -> StreamId {
        self.stream
    }

    #[must_use]
    pub fn manager(&self) -> &Arc<VideoDecoderManager> {
        &self.manager
    }

    #[must_use]
    pub fn textures(&self) -> &Arc<HeadlessTextureBackend> {
        &self.textures
    }

    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Playback clock in microseconds.
    #[must_use]
    pub fn clock_us(&self) -> u64 {
        self.clock_us.load(Ordering::SeqCst)
    }

    /// Start downloading from the beginning of the content.
    ///
    /// # Errors
    ///
    /// `DashError::NoRepresentation` if the extractor has no representation.
    pub fn start(&self) -> Result<(), PlayerError> {
        let mut extractor = self.extractor.lock();
        extractor.switch_to_this(1);
        extractor.start_download(0, self.config.expected_ping_ms)?;
        Ok(())
    }

    /// Download and concatenate, then feed parsed packets to the decoder
    /// until it is full.
    ///
    /// # Errors
    ///
    /// Parser rejections, decoder contract violations and decoder failures.
    pub fn provider_step(&self) -> Result<ProviderStatus, PlayerError> {
        if self.input_eos_sent.load(Ordering::SeqCst) {
            return Ok(ProviderStatus::InputEnded);
        }
        let mut extractor = self.extractor.lock();
        extractor.process_segment_download()?;

        let mut accepted = 0_u64;
        while let Some(packet) = self.packets.pop() {
            match self
                .manager
                .decode_media_packet(self.stream, &packet, false)?
            {
                DecodeResult::PacketAccepted => accepted += 1,
                DecodeResult::DecoderFull | DecodeResult::NotReady => {
                    self.packets.push_front(packet);
                    break;
                }
                DecodeResult::DecoderError => {
                    return Err(PlayerError::DecodeFailed {
                        stream: self.stream,
                        pts_us: packet.pts_us,
                    });
                }
            }
        }
        self.stats
            .packets_decoded
            .fetch_add(accepted, Ordering::SeqCst);

        let nothing_queued = !extractor
            .representation()
            .is_some_and(|representation| representation.segments().segment_count() > 0);
        if self.packets.is_empty() && nothing_queued && extractor.is_done() {
            self.manager.set_input_eos(self.stream)?;
            self.input_eos_sent.store(true, Ordering::SeqCst);
            info!(target: "omaf.player.session", stream = %self.stream, "All content decoded");
            return Ok(ProviderStatus::InputEnded);
        }
        Ok(if accepted > 0 {
            ProviderStatus::Feeding
        } else {
            ProviderStatus::Waiting
        })
    }

    /// Upload the frame due at the playback clock and advance the clock.
    ///
    /// # Errors
    ///
    /// Decoder errors other than synchronization misses.
    pub fn render_step(&self) -> Result<RenderStatus, PlayerError> {
        let streams: Streams = std::iter::once(self.stream).collect();
        self.manager.activate_decoder(self.stream);
        if self.manager.is_eos(self.stream) {
            return Ok(RenderStatus::Finished);
        }
        if self.manager.is_buffering(&streams)? {
            self.stats.buffering_ticks.fetch_add(1, Ordering::SeqCst);
            return Ok(RenderStatus::Buffering);
        }

        let clock = self.clock_us();
        match self
            .manager
            .upload_textures_for_pts(&streams, &Streams::new(), clock)
        {
            Ok(output) => {
                self.clock_us.store(
                    clock.saturating_add(self.config.frame_duration_us()),
                    Ordering::SeqCst,
                );
                let previous = self.stats.last_rendered_pts.swap(output.pts, Ordering::SeqCst);
                if previous != output.pts {
                    self.stats.frames_rendered.fetch_add(1, Ordering::SeqCst);
                }
                Ok(RenderStatus::Rendered { pts_us: output.pts })
            }
            Err(e) if e.is_recoverable() => {
                self.stats.sync_misses.fetch_add(1, Ordering::SeqCst);
                debug!(target: "omaf.player.session", clock_us = clock, error = %e, "No frame due");
                Ok(RenderStatus::Stalled)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Stop downloads and return the stream slot and its decoder.
    ///
    /// # Errors
    ///
    /// Decoder contract violations while shutting the stream down.
    pub fn shutdown(&self) -> Result<(), PlayerError> {
        self.extractor.lock().stop_download();
        self.manager.shutdown_stream(self.stream)?;
        info!(target: "omaf.player.session", stream = %self.stream, "Playback session shut down");
        Ok(())
    }
}

fn build_extractor(
    config: &PlayerConfig,
    packets: PacketQueue,
) -> Result<DashAdaptationSetExtractorMr, PlayerError> {
    let content = SyntheticContent {
        segment_count: config.segment_count,
        segment_duration_ms: config.segment_duration_ms,
        payload_len: SEGMENT_PAYLOAD_LEN,
    };
    let parser = SampleParser::new(
        packets,
        config.frame_duration_us(),
        config.frames_per_segment(),
    );
    let own = TileRepresentation::new(
        "extractor",
        EXTRACTOR_BANDWIDTH,
        Box::new(SyntheticSegmentStream::new("extractor", content)),
    );
    let mut extractor = DashAdaptationSetExtractorMr::new(EXTRACTOR_SET_ID)
        .with_representation(ExtractorRepresentation::new(own, Box::new(parser)));

    for tile in 1..=config.tile_count {
        let representations = TILE_QUALITIES
            .iter()
            .map(|(suffix, ranking, bandwidth)| {
                let id = format!("tile-{tile}-{suffix}");
                let representation = TileRepresentation::new(
                    id.clone(),
                    *bandwidth,
                    Box::new(SyntheticSegmentStream::new(id, content)),
                );
                let quality = vec![QualityDescriptor {
                    scheme: QualityScheme::SphereRegion,
                    quality_ranking: *ranking,
                    global: false,
                }];
                (representation, quality)
            })
            .collect();
        let set = TileAdaptationSet::from_manifest(tile, &[], representations)?;
        extractor.add_supporting_set(set.shared());
    }
    Ok(extractor)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn short_config() -> PlayerConfig {
        PlayerConfig {
            segment_count: 2,
            segment_duration_ms: 200,
            width: 64,
            height: 32,
            ..PlayerConfig::default()
        }
    }

    #[test]
    fn test_render_buffers_until_frames_arrive() {
        let session = PlaybackSession::new(short_config()).unwrap();
        session.start().unwrap();

        assert_eq!(session.render_step().unwrap(), RenderStatus::Buffering);
        assert_eq!(session.provider_step().unwrap(), ProviderStatus::Feeding);
        assert_eq!(
            session.render_step().unwrap(),
            RenderStatus::Rendered { pts_us: 0 }
        );
        assert_eq!(session.clock_us(), 40_000);
        assert_eq!(session.textures().upload_count(), 1);

        let stats = session.stats();
        assert_eq!(stats.buffering_ticks, 1);
        assert_eq!(stats.frames_rendered, 1);
        assert_eq!(stats.last_rendered_pts, Some(0));
    }

    #[test]
    fn test_provider_waits_for_render_side_activation() {
        let session = PlaybackSession::new(short_config()).unwrap();
        session.start().unwrap();
        // Frame buffers are activated by the first render step.
        assert_eq!(session.provider_step().unwrap(), ProviderStatus::Waiting);
        assert_eq!(session.stats().packets_decoded, 0);
    }

    #[test]
    fn test_extractor_merges_every_tile() {
        let session = PlaybackSession::new(short_config()).unwrap();
        assert_eq!(session.extractor.lock().supporting_set_count(), 2);
        // Every tile starts on its best ranked variant, listed last.
        assert_eq!(
            session.extractor.lock().current_bandwidth(),
            u64::from(EXTRACTOR_BANDWIDTH) + 2 * 4_000_000
        );
    }

    #[test]
    fn test_shutdown_frees_the_stream() {
        let session = PlaybackSession::new(short_config()).unwrap();
        session.start().unwrap();
        session.shutdown().unwrap();
        assert!(session.manager().is_free(session.stream()));
        assert!(!session.manager().has_decoder(session.stream()));
    }
}
