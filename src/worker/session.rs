//! Streaming session state machine
//!
//! One session turns a ranged read into a demand-driven sequence of chunks.
//! Each signal advances the phase and yields at most one response:
//!
//! ```text
//! Idle --start--> Seeking --ok--> Streaming --next--> Streaming
//!                    |               |  \
//!                  error        past end / EOF       stop
//!                    |               |                 |
//!                    v               v                 v
//!                 Closed <------ Draining          Cancelling --> Closed
//! ```
//!
//! The engine is read only in response to a start or next, so there is never
//! more than one undelivered packet per session.

use crate::engine::{next_packet_of, DemuxCursor};
use crate::error::DemuxError;
use crate::protocol::{MessageKind, Response, StreamChunk};
use crate::types::SeekFlag;

/// Demand signals from the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Start,
    Next,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Seeking,
    /// A packet was delivered; waiting for demand
    Streaming,
    /// Natural end reached
    Draining,
    /// Stop received
    Cancelling,
    Closed,
}

/// Half-open time window `[start, end)` in seconds; `end <= 0` is unbounded
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub start: f64,
    pub end: f64,
}

impl Window {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn is_past(&self, timestamp: f64) -> bool {
        self.end > 0.0 && timestamp >= self.end
    }
}

pub struct Session<C> {
    id: u64,
    stream_index: usize,
    window: Window,
    flag: SeekFlag,
    phase: Phase,
    demanded: u64,
    delivered: u64,
    cursor: Option<C>,
}

impl<C: DemuxCursor> Session<C> {
    /// `cursor` is exclusively owned; it is dropped as soon as the session closes
    pub fn new(id: u64, cursor: C, stream_index: usize, window: Window, flag: SeekFlag) -> Self {
        Self {
            id,
            stream_index,
            window,
            flag,
            phase: Phase::Idle,
            demanded: 0,
            delivered: 0,
            cursor: Some(cursor),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_closed(&self) -> bool {
        self.phase == Phase::Closed
    }

    pub fn demanded(&self) -> u64 {
        self.demanded
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Apply a signal; returns the response to send, if any
    pub fn handle(&mut self, signal: Signal) -> Option<Response> {
        let response = match (self.phase, signal) {
            (Phase::Idle, Signal::Start) => {
                self.demanded += 1;
                self.start()
            }
            (Phase::Streaming, Signal::Next) => {
                self.demanded += 1;
                self.pump()
            }
            (Phase::Idle | Phase::Streaming, Signal::Stop) => {
                self.phase = Phase::Cancelling;
                self.close();
                Some(Response::chunk(self.id, StreamChunk::Cancelled))
            }
            (phase, signal) => {
                tracing::debug!(id = self.id, ?phase, ?signal, "Ignoring signal");
                None
            }
        };

        tracing::trace!(
            id = self.id,
            ?signal,
            phase = ?self.phase,
            demanded = self.demanded,
            delivered = self.delivered,
            "Session transition"
        );
        response
    }

    fn start(&mut self) -> Option<Response> {
        if self.window.start > 0.0 {
            self.phase = Phase::Seeking;
            let seeked = match self.cursor.as_mut() {
                Some(cursor) => cursor.seek(self.stream_index, self.window.start, self.flag),
                None => return Some(self.fail("session cursor already released".to_string())),
            };
            if let Err(e) = seeked {
                return Some(self.fail(DemuxError::from(e).to_string()));
            }
        }
        self.phase = Phase::Streaming;
        self.pump()
    }

    fn pump(&mut self) -> Option<Response> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Some(self.fail("session cursor already released".to_string()));
        };

        match next_packet_of(cursor, self.stream_index) {
            Ok(Some(packet)) if self.window.is_past(packet.timestamp) => {
                tracing::debug!(
                    id = self.id,
                    timestamp = packet.timestamp,
                    end = self.window.end,
                    "Packet past window"
                );
                Some(self.finish())
            }
            Ok(Some(packet)) => {
                self.delivered += 1;
                Some(Response::chunk(self.id, StreamChunk::Packet(packet)))
            }
            Ok(None) => Some(self.finish()),
            Err(e) => Some(self.fail(DemuxError::from(e).to_string())),
        }
    }

    fn finish(&mut self) -> Response {
        self.phase = Phase::Draining;
        self.close();
        Response::chunk(self.id, StreamChunk::End)
    }

    fn fail(&mut self, message: String) -> Response {
        tracing::warn!(id = self.id, "Session failed: {}", message);
        self.close();
        Response::error(self.id, MessageKind::StreamChunk, message)
    }

    fn close(&mut self) {
        self.cursor = None;
        tracing::debug!(
            id = self.id,
            from = ?self.phase,
            delivered = self.delivered,
            "Session closed"
        );
        self.phase = Phase::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{DemuxEngine, MemoryContainer, MemoryEngine};
    use crate::protocol::Reply;
    use crate::types::{Packet, Source};

    type Cursor = <MemoryEngine as DemuxEngine>::Cursor;

    fn session(container: MemoryContainer, window: Window) -> Session<Cursor> {
        let mut engine = MemoryEngine::new().with_container("s.mp4", container);
        let cursor = engine.open(&Source::from("s.mp4")).unwrap();
        Session::new(1, cursor, 0, window, SeekFlag::Backward)
    }

    fn packet_of(response: Option<Response>) -> Packet {
        match response.map(|r| r.result) {
            Some(Ok(Reply::Chunk(StreamChunk::Packet(p)))) => p,
            other => panic!("expected packet, got {:?}", other),
        }
    }

    fn chunk_of(response: Option<Response>) -> StreamChunk {
        match response.map(|r| r.result) {
            Some(Ok(Reply::Chunk(chunk))) => chunk,
            other => panic!("expected chunk, got {:?}", other),
        }
    }

    #[test]
    fn test_window_is_half_open() {
        let window = Window::new(2.0, 5.0);
        assert!(!window.is_past(4.96));
        assert!(window.is_past(5.0));
        assert!(!Window::new(0.0, 0.0).is_past(1e9));
    }

    #[test]
    fn test_one_packet_per_demand() {
        let mut s = session(MemoryContainer::synthetic_av(2.0), Window::new(0.0, 0.0));
        let first = packet_of(s.handle(Signal::Start));
        assert_eq!(first.timestamp, 0.0);
        assert_eq!(s.phase(), Phase::Streaming);
        let second = packet_of(s.handle(Signal::Next));
        assert!(second.timestamp >= first.timestamp);
        assert_eq!(s.demanded(), 2);
        assert_eq!(s.delivered(), 2);
    }

    #[test]
    fn test_start_seeks_to_keyframe() {
        let mut s = session(MemoryContainer::synthetic_av(5.0), Window::new(2.5, 0.0));
        let first = packet_of(s.handle(Signal::Start));
        // Backward seek lands before the window start
        assert_eq!(first.timestamp, 2.0);
        assert!(first.keyframe);
    }

    #[test]
    fn test_end_of_window() {
        let mut s = session(MemoryContainer::synthetic_av(2.0), Window::new(0.0, 0.08));
        packet_of(s.handle(Signal::Start));
        packet_of(s.handle(Signal::Next));
        assert_eq!(chunk_of(s.handle(Signal::Next)), StreamChunk::End);
        assert!(s.is_closed());
        assert!(s.handle(Signal::Next).is_none());
    }

    #[test]
    fn test_eof_ends_stream() {
        let mut s = session(MemoryContainer::synthetic_av(0.08), Window::new(0.0, 0.0));
        packet_of(s.handle(Signal::Start));
        packet_of(s.handle(Signal::Next));
        assert_eq!(chunk_of(s.handle(Signal::Next)), StreamChunk::End);
    }

    #[test]
    fn test_stop_acknowledged_once() {
        let mut s = session(MemoryContainer::synthetic_av(2.0), Window::new(0.0, 0.0));
        packet_of(s.handle(Signal::Start));
        assert_eq!(chunk_of(s.handle(Signal::Stop)), StreamChunk::Cancelled);
        assert!(s.handle(Signal::Stop).is_none());
        assert!(s.handle(Signal::Next).is_none());
        assert_eq!(s.phase(), Phase::Closed);
    }

    #[test]
    fn test_next_before_start_is_ignored() {
        let mut s = session(MemoryContainer::synthetic_av(1.0), Window::new(0.0, 0.0));
        assert!(s.handle(Signal::Next).is_none());
        assert_eq!(s.phase(), Phase::Idle);
    }

    #[test]
    fn test_seek_error_closes() {
        let container = MemoryContainer::synthetic_av(2.0).with_seek_error();
        let mut s = session(container, Window::new(1.0, 0.0));
        let response = s.handle(Signal::Start).unwrap();
        assert!(response.result.is_err());
        assert!(s.is_closed());
    }

    #[test]
    fn test_read_error_closes() {
        let container = MemoryContainer::synthetic_av(2.0).with_read_error_at(0);
        let mut s = session(container, Window::new(0.0, 0.0));
        let response = s.handle(Signal::Start).unwrap();
        assert_eq!(response.kind, MessageKind::StreamChunk);
        assert!(response.result.unwrap_err().contains("Failed to read packet"));
        assert!(s.is_closed());
    }
}
