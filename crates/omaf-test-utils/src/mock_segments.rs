//! Scripted segment downloads and a recording parser.
//!
//! `ScriptedSegmentStream` never touches the network: a test decides when a
//! segment download completes with [`ScriptedSegmentStream::deliver`].
//! Clones share state, so the test keeps one handle while the representation
//! owns another.

use bytes::Bytes;
use common::types::SegmentId;
use dash_provider::{DashError, DashSegment, DownloadStart, SegmentParser, SegmentStream};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Default)]
struct StreamState {
    ready: Vec<DashSegment>,
    started: Vec<DownloadStart>,
    stops: Vec<bool>,
    completing: bool,
    buffering: bool,
    error: bool,
    end_of_stream: bool,
    cleared: usize,
    payload_len: usize,
}

/// Segment stream driven by the test.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSegmentStream(Arc<Mutex<StreamState>>);

impl ScriptedSegmentStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payload size of delivered segments; the first four bytes hold the
    /// big-endian segment id.
    pub fn with_payload_len(self, payload_len: usize) -> Self {
        self.0.lock().payload_len = payload_len;
        self
    }

    /// Complete downloads of the given segments.
    pub fn deliver(&self, ids: &[SegmentId]) {
        let mut state = self.0.lock();
        for id in ids {
            let mut payload = id.to_be_bytes().to_vec();
            payload.resize(state.payload_len.max(4), 0);
            state
                .ready
                .push(DashSegment::new(*id, 1, Bytes::from(payload)));
        }
    }

    pub fn set_completing(&self, completing: bool) {
        self.0.lock().completing = completing;
    }

    pub fn set_buffering(&self, buffering: bool) {
        self.0.lock().buffering = buffering;
    }

    pub fn set_error(&self, error: bool) {
        self.0.lock().error = error;
    }

    pub fn set_end_of_stream(&self, end_of_stream: bool) {
        self.0.lock().end_of_stream = end_of_stream;
    }

    /// Every start request, oldest first.
    pub fn started(&self) -> Vec<DownloadStart> {
        self.0.lock().started.clone()
    }

    /// `abort` flag of every stop request, oldest first.
    pub fn stops(&self) -> Vec<bool> {
        self.0.lock().stops.clone()
    }

    pub fn cleared(&self) -> usize {
        self.0.lock().cleared
    }

    pub fn is_completing(&self) -> bool {
        self.0.lock().completing
    }
}

impl SegmentStream for ScriptedSegmentStream {
    fn start(&mut self, start: DownloadStart) {
        self.0.lock().started.push(start);
    }

    fn stop(&mut self, abort: bool) {
        let mut state = self.0.lock();
        state.stops.push(abort);
        if abort {
            state.completing = false;
        }
    }

    fn poll_completed(&mut self) -> Vec<DashSegment> {
        std::mem::take(&mut self.0.lock().ready)
    }

    fn is_completing_download(&self) -> bool {
        self.0.lock().completing
    }

    fn is_buffering(&self) -> bool {
        self.0.lock().buffering
    }

    fn is_error(&self) -> bool {
        self.0.lock().error
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

#[derive(Debug, Default)]
struct ParserState {
    parsed: Vec<DashSegment>,
    released: usize,
    reject: bool,
    done: bool,
}

/// Parser recording every concatenated segment it is given.
#[derive(Debug, Clone, Default)]
pub struct RecordingParser(Arc<Mutex<ParserState>>);

impl RecordingParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every following segment with `DashError::ParserRejected`.
    pub fn reject_segments(&self, reject: bool) {
        self.0.lock().reject = reject;
    }

    pub fn set_done(&self, done: bool) {
        self.0.lock().done = done;
    }

    pub fn parsed(&self) -> Vec<DashSegment> {
        self.0.lock().parsed.clone()
    }

    pub fn parsed_ids(&self) -> Vec<SegmentId> {
        self.0
            .lock()
            .parsed
            .iter()
            .map(|segment| segment.segment_id)
            .collect()
    }

    pub fn released(&self) -> usize {
        self.0.lock().released
    }
}

impl SegmentParser for RecordingParser {
    fn add_segment(&mut self, segment: DashSegment) -> Result<(), DashError> {
        let mut state = self.0.lock();
        if state.reject {
            return Err(DashError::ParserRejected {
                segment: segment.segment_id,
                reason: "rejected by test".to_string(),
            });
        }
        state.parsed.push(segment);
        Ok(())
    }

    fn ready_for_segment(&self, _segment_id: SegmentId) -> bool {
        true
    }

    fn is_initialized(&self) -> bool {
        !self.0.lock().parsed.is_empty()
    }

    fn is_done(&self) -> bool {
        self.0.lock().done
    }

    fn release_all_segments(&mut self) {
        let mut state = self.0.lock();
        state.parsed.clear();
        state.released += 1;
    }
}
