//! In-crate stubs for unit tests.

use crate::errors::DashError;
use crate::segment::{DashSegment, DownloadStart, SegmentParser, SegmentStream};
use bytes::Bytes;
use common::types::SegmentId;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
struct StreamState {
    ready: Vec<DashSegment>,
    started: Vec<DownloadStart>,
    completing: bool,
    end_of_stream: bool,
    cleared: usize,
}

/// Segment stream whose downloads are delivered by the test.
#[derive(Clone, Default)]
pub(crate) struct QueueStream(Arc<Mutex<StreamState>>);

impl QueueStream {
    /// Complete downloads of the given segments with a 4-byte payload
    /// holding the segment id.
    pub(crate) fn deliver(&self, ids: &[SegmentId]) {
        let mut state = self.0.lock();
        for id in ids {
            state.ready.push(DashSegment::new(
                *id,
                1,
                Bytes::copy_from_slice(&id.to_be_bytes()),
            ));
        }
    }

    pub(crate) fn set_completing(&self, completing: bool) {
        self.0.lock().completing = completing;
    }

    pub(crate) fn set_end_of_stream(&self, end_of_stream: bool) {
        self.0.lock().end_of_stream = end_of_stream;
    }

    pub(crate) fn completing(&self) -> bool {
        self.0.lock().completing
    }

    pub(crate) fn started(&self) -> Vec<DownloadStart> {
        self.0.lock().started.clone()
    }

    pub(crate) fn cleared(&self) -> usize {
        self.0.lock().cleared
    }
}

impl SegmentStream for QueueStream {
    fn start(&mut self, start: DownloadStart) {
        self.0.lock().started.push(start);
    }

    fn stop(&mut self, abort: bool) {
        if abort {
            self.0.lock().completing = false;
        }
    }

    fn poll_completed(&mut self) -> Vec<DashSegment> {
        std::mem::take(&mut self.0.lock().ready)
    }

    fn is_completing_download(&self) -> bool {
        self.0.lock().completing
    }

    fn is_buffering(&self) -> bool {
        false
    }

    fn is_error(&self) -> bool {
        false
    }

    fn is_end_of_stream(&self) -> bool {
        self.0.lock().end_of_stream
    }

    fn clear_downloaded_segments(&mut self) {
        let mut state = self.0.lock();
        state.ready.clear();
        state.cleared += 1;
    }
}

#[derive(Default)]
struct ParserState {
    parsed: Vec<DashSegment>,
    released: usize,
}

/// Parser that records the segments it receives.
#[derive(Clone, Default)]
pub(crate) struct StubParser(Arc<Mutex<ParserState>>);

impl StubParser {
    pub(crate) fn parsed(&self) -> Vec<DashSegment> {
        self.0.lock().parsed.clone()
    }

    pub(crate) fn released(&self) -> usize {
        self.0.lock().released
    }
}

impl SegmentParser for StubParser {
    fn add_segment(&mut self, segment: DashSegment) -> Result<(), DashError> {
        self.0.lock().parsed.push(segment);
        Ok(())
    }

    fn ready_for_segment(&self, _segment_id: SegmentId) -> bool {
        true
    }

    fn is_initialized(&self) -> bool {
        !self.0.lock().parsed.is_empty()
    }

    fn is_done(&self) -> bool {
        false
    }

    fn release_all_segments(&mut self) {
        let mut state = self.0.lock();
        state.parsed.clear();
        state.released += 1;
    }
}
