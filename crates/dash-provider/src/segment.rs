//! Media segments and the download/parse boundaries of a representation.
//!
//! The HTTP download engine and the MP4 parser live outside this crate; a
//! representation talks to them through [`SegmentStream`] and
//! [`SegmentParser`].

use crate::errors::DashError;
use bytes::Bytes;
use common::types::SegmentId;

/// One downloaded (or concatenated) media segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashSegment {
    pub segment_id: SegmentId,
    pub init_segment_id: u32,
    pub data: Bytes,
    /// Representations whose payloads make up a concatenated segment, in
    /// concatenation order. Empty for plain downloads.
    pub sources: Vec<String>,
}

impl DashSegment {
    #[must_use]
    pub fn new(segment_id: SegmentId, init_segment_id: u32, data: Bytes) -> Self {
        Self {
            segment_id,
            init_segment_id,
            data,
            sources: Vec::new(),
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Where a (re)started download begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStart {
    /// Segment covering a presentation start time, in milliseconds.
    AtTime(u64),
    /// An explicit segment number.
    FromSegment(SegmentId),
}

/// Download engine of one representation.
pub trait SegmentStream: Send {
    fn start(&mut self, start: DownloadStart);

    /// Stop downloading; `abort` also cancels a download in progress.
    fn stop(&mut self, abort: bool);

    /// Segments completed since the last call, in download order.
    fn poll_completed(&mut self) -> Vec<DashSegment>;

    /// Whether a segment download is in progress right now.
    fn is_completing_download(&self) -> bool;

    fn is_buffering(&self) -> bool;

    fn is_error(&self) -> bool;

    fn is_end_of_stream(&self) -> bool;

    /// Drop segments that were downloaded but not yet handed out.
    fn clear_downloaded_segments(&mut self);
}

/// MP4 parser fed by an extractor representation.
pub trait SegmentParser: Send {
    /// Take ownership of a concatenated media segment.
    ///
    /// # Errors
    ///
    /// `DashError::ParserRejected` if the segment cannot be parsed.
    fn add_segment(&mut self, segment: DashSegment) -> Result<(), DashError>;

    /// Whether the parser has consumed everything before `segment_id`.
    fn ready_for_segment(&self, segment_id: SegmentId) -> bool;

    /// Whether the first segment has been parsed and streams exist.
    fn is_initialized(&self) -> bool;

    /// Whether every parsed sample has been read out.
    fn is_done(&self) -> bool;

    fn release_all_segments(&mut self);
}
