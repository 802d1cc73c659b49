//! Pre-configured test data and harnesses.
//!
//! Provides:
//! - Stream configurations and packets
//! - `ManagerHarness`: a decoder manager wired to a spy cache and mock pool
//! - `ExtractorHarness`: an extractor with scripted tile sets

use crate::mock_decoder::{EventLog, MockDecoderPool};
use crate::mock_segments::{RecordingParser, ScriptedSegmentStream};
use crate::spy_cache::SpyFrameCache;
use bytes::Bytes;
use common::types::{AdaptationSetId, SegmentId, StreamId};
use dash_provider::{
    DashAdaptationSetExtractorMr, ExtractorRepresentation, SharedTileSet, TileAdaptationSet,
    TileRepresentation,
};
use std::sync::Arc;
use video_decoder::{
    DecodeResult, DecoderConfig, FlushOrder, FrameCacheConfig, HeadlessTextureBackend,
    ManagerConfig, MediaPacket, PixelFormat, PooledFrameCache, VideoCodec, VideoDecoderManager,
};

/// Frame duration of test packets (25 fps).
pub const FRAME_DURATION_US: u64 = 40_000;

/// 1280x720 NV12 HEVC stream.
pub fn hd_nv12_config() -> DecoderConfig {
    DecoderConfig::new(VideoCodec::Hevc, 1280, 720, PixelFormat::Nv12)
}

/// 640x640 NV12 HEVC tile.
pub fn tile_config() -> DecoderConfig {
    DecoderConfig::new(VideoCodec::Hevc, 640, 640, PixelFormat::Nv12)
}

/// Packet at `pts_us` with a small payload.
pub fn packet(pts_us: u64) -> MediaPacket {
    MediaPacket::new(pts_us, FRAME_DURATION_US, Bytes::from_static(&[0, 0, 0, 1, 0x26]))
}

/// Decoder manager over a spy frame cache and a mock decoder pool.
pub struct ManagerHarness {
    pub manager: Arc<VideoDecoderManager>,
    pub cache: Arc<SpyFrameCache>,
    pub pool: Arc<MockDecoderPool>,
    pub textures: Arc<HeadlessTextureBackend>,
    pub events: EventLog,
}

/// Builder for [`ManagerHarness`].
#[derive(Debug, Clone)]
pub struct ManagerHarnessBuilder {
    manager_config: ManagerConfig,
    cache_config: FrameCacheConfig,
    decoder_capacity: usize,
    flush_order: FlushOrder,
}

impl Default for ManagerHarnessBuilder {
    fn default() -> Self {
        Self {
            manager_config: ManagerConfig::default(),
            cache_config: FrameCacheConfig::default(),
            decoder_capacity: usize::MAX,
            flush_order: FlushOrder::DecoderFirst,
        }
    }
}

impl ManagerHarnessBuilder {
    pub fn max_stream_count(mut self, count: usize) -> Self {
        self.manager_config.max_stream_count = count;
        self.cache_config.max_stream_count = count;
        self
    }

    pub fn decoder_capacity(mut self, capacity: usize) -> Self {
        self.decoder_capacity = capacity;
        self
    }

    pub fn flush_order(mut self, flush_order: FlushOrder) -> Self {
        self.flush_order = flush_order;
        self
    }

    pub fn frames_per_stream(mut self, frames: usize) -> Self {
        self.cache_config.frames_per_stream = frames;
        self
    }

    pub fn buffering_threshold(mut self, frames: usize) -> Self {
        self.manager_config.initial_buffering_threshold = frames;
        self
    }

    pub fn build(self) -> ManagerHarness {
        let events = EventLog::new();
        let textures = Arc::new(HeadlessTextureBackend::new());
        let inner = PooledFrameCache::new(self.cache_config, textures.clone())
            .expect("valid frame cache config");
        let cache = Arc::new(SpyFrameCache::new(inner).with_events(events.clone()));
        let pool = Arc::new(
            MockDecoderPool::new(cache.clone())
                .with_capacity(self.decoder_capacity)
                .with_flush_order(self.flush_order)
                .with_events(events.clone()),
        );
        let manager = Arc::new(
            VideoDecoderManager::new(self.manager_config, cache.clone(), pool.clone())
                .expect("valid manager config"),
        );
        ManagerHarness {
            manager,
            cache,
            pool,
            textures,
            events,
        }
    }
}

impl Default for ManagerHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl ManagerHarness {
    pub fn builder() -> ManagerHarnessBuilder {
        ManagerHarnessBuilder::default()
    }

    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Claim a slot and configure it.
    pub fn configured_stream(&self, config: DecoderConfig) -> StreamId {
        let stream = self
            .manager
            .generate_unique_stream_id(false)
            .expect("free stream slot");
        self.manager
            .initialize_stream(stream, config)
            .expect("stream initializes");
        stream
    }

    /// Configure, reserve a decoder and activate the render side.
    pub fn active_stream(&self, config: DecoderConfig, current_pts: u64) -> StreamId {
        let stream = self.configured_stream(config);
        self.manager
            .activate_stream(stream, current_pts)
            .expect("decoder reserved");
        self.manager.activate_decoder(stream);
        stream
    }

    /// Decode one packet per PTS, asserting each is accepted.
    pub fn decode(&self, stream: StreamId, pts_list: &[u64]) {
        for pts in pts_list {
            let result = self
                .manager
                .decode_media_packet(stream, &packet(*pts), false)
                .expect("stream has a decoder");
            assert_eq!(result, DecodeResult::PacketAccepted, "packet at {pts}");
        }
    }
}

/// One tile set and the scripted streams of its representations.
pub struct TileFixture {
    pub set: SharedTileSet,
    pub streams: Vec<ScriptedSegmentStream>,
}

impl TileFixture {
    /// Tile set with one representation per `(id, quality ranking)`.
    pub fn new(id: AdaptationSetId, representations: &[(&str, u8)]) -> Self {
        let mut streams = Vec::new();
        let mut tiles = Vec::new();
        for (representation_id, quality) in representations {
            let stream = ScriptedSegmentStream::new();
            tiles.push(
                TileRepresentation::new(*representation_id, 1_000_000, Box::new(stream.clone()))
                    .with_quality_level(*quality),
            );
            streams.push(stream);
        }
        let set = TileAdaptationSet::new(id, tiles)
            .expect("at least one representation")
            .shared();
        Self { set, streams }
    }

    /// Stream of the representation that starts out current.
    pub fn current_stream(&self) -> &ScriptedSegmentStream {
        self.streams.first().expect("tile has a representation")
    }

    pub fn deliver(&self, ids: &[SegmentId]) {
        self.current_stream().deliver(ids);
    }
}

/// Extractor over single-quality tile sets.
pub struct ExtractorHarness {
    pub extractor: DashAdaptationSetExtractorMr,
    pub stream: ScriptedSegmentStream,
    pub parser: RecordingParser,
    pub tiles: Vec<TileFixture>,
}

impl ExtractorHarness {
    /// Extractor `id` with `tile_count` supporting sets, ids 1..=tile_count.
    pub fn new(id: AdaptationSetId, tile_count: u32) -> Self {
        let tiles = (1..=tile_count)
            .map(|tile| {
                let name = format!("tile-{tile}");
                TileFixture::new(tile, &[(name.as_str(), 1)])
            })
            .collect();
        Self::with_tiles(id, tiles)
    }

    /// Extractor depending on the given tile sets, in order.
    pub fn with_tiles(id: AdaptationSetId, tiles: Vec<TileFixture>) -> Self {
        let stream = ScriptedSegmentStream::new();
        let parser = RecordingParser::new();
        let representation = ExtractorRepresentation::new(
            TileRepresentation::new(format!("extractor-{id}"), 50_000, Box::new(stream.clone())),
            Box::new(parser.clone()),
        );
        let mut extractor = DashAdaptationSetExtractorMr::new(id).with_representation(representation);
        for tile in &tiles {
            extractor.add_supporting_set(tile.set.clone());
        }
        Self {
            extractor,
            stream,
            parser,
            tiles,
        }
    }

    /// Complete the download of `ids` for the extractor and every tile.
    pub fn deliver_all(&self, ids: &[SegmentId]) {
        self.stream.deliver(ids);
        for tile in &self.tiles {
            tile.deliver(ids);
        }
    }

    pub fn tile(&self, index: usize) -> &TileFixture {
        self.tiles.get(index).expect("tile index in range")
    }
}
