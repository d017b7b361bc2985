//! Request router
//!
//! Maps each inbound request to its handler on the worker thread. Simple
//! queries open a fresh cursor, answer once and drop it. Streaming requests
//! are forwarded to the session registered under the request id.

use std::collections::HashMap;

use super::session::{Session, Signal, Window};
use crate::engine::{packet_at, packets_at_all_streams, DemuxCursor, DemuxEngine};
use crate::error::{DemuxError, EngineError, Result};
use crate::protocol::{MessageKind, Reply, Request, RequestPayload, Response};
use crate::types::{SeekFlag, Source, StreamSelector};

pub struct Router<E: DemuxEngine> {
    engine: E,
    initialized: bool,
    source: Option<Source>,
    sessions: HashMap<u64, Session<E::Cursor>>,
}

impl<E: DemuxEngine> Router<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            initialized: false,
            source: None,
            sessions: HashMap::new(),
        }
    }

    /// The active source, if one was loaded
    pub fn source(&self) -> Option<&Source> {
        self.source.as_ref()
    }

    /// Number of open streaming sessions
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Handle one request. Returns `None` when the request produces no
    /// response, such as a next or stop for a session that no longer exists.
    pub fn dispatch(&mut self, request: Request) -> Option<Response> {
        let id = request.id;
        let kind = request.kind();
        tracing::debug!(id, %kind, "Dispatching request");

        match request.payload {
            RequestPayload::StreamStart {
                start,
                end,
                selector,
                flag,
            } => self
                .start_session(id, Window::new(start, end), selector, flag)
                .unwrap_or_else(|e| {
                    tracing::warn!(id, "Failed to start stream: {}", e);
                    Some(Response::error(id, MessageKind::StreamChunk, e.to_string()))
                }),
            RequestPayload::StreamNext => self.signal(id, Signal::Next),
            RequestPayload::StreamStop => self.signal(id, Signal::Stop),
            payload => Some(match self.query(payload) {
                Ok(reply) => Response::ok(id, kind, reply),
                Err(e) => {
                    tracing::warn!(id, %kind, "Request failed: {}", e);
                    Response::error(id, kind, e.to_string())
                }
            }),
        }
    }

    /// Decode and handle a JSON frame; malformed frames are dropped
    pub fn dispatch_frame(&mut self, frame: &[u8]) -> Option<Response> {
        match Request::from_frame(frame) {
            Ok(request) => self.dispatch(request),
            Err(e) => {
                tracing::warn!("Dropping malformed frame ({} bytes): {}", frame.len(), e);
                None
            }
        }
    }

    fn query(&mut self, payload: RequestPayload) -> Result<Reply> {
        match payload {
            RequestPayload::LoadSource { source, asset_path } => {
                if !self.initialized {
                    self.engine.init(asset_path.as_deref())?;
                    self.initialized = true;
                }
                // Fail the load rather than the first query on a bad source
                drop(self.engine.open(&source)?);
                tracing::info!("Loaded source {}", source);
                self.source = Some(source);
                Ok(Reply::Loaded)
            }
            RequestPayload::GetStreamInfo { selector } => {
                let cursor = self.open_cursor()?;
                let index = cursor.find_stream(&selector)?;
                cursor
                    .streams()
                    .into_iter()
                    .find(|s| s.index == index)
                    .map(Reply::Stream)
                    .ok_or(DemuxError::Engine(EngineError::StreamNotFound))
            }
            RequestPayload::GetAllStreams => Ok(Reply::Streams(self.open_cursor()?.streams())),
            RequestPayload::GetMediaInfo => Ok(Reply::MediaInfo(self.open_cursor()?.media_info())),
            RequestPayload::GetPacketAt {
                time,
                selector,
                flag,
            } => {
                let mut cursor = self.open_cursor()?;
                let index = cursor.find_stream(&selector)?;
                Ok(Reply::Packet(packet_at(&mut cursor, index, time, flag)?))
            }
            RequestPayload::GetPacketsAtAllStreams { time, flag } => {
                let mut cursor = self.open_cursor()?;
                Ok(Reply::Packets(packets_at_all_streams(&mut cursor, time, flag)?))
            }
            RequestPayload::SetLogLevel { level } => {
                self.engine.set_log_level(level);
                tracing::debug!(?level, "Engine log level set");
                Ok(Reply::LogLevelSet)
            }
            other @ (RequestPayload::StreamStart { .. }
            | RequestPayload::StreamNext
            | RequestPayload::StreamStop) => Err(DemuxError::UnexpectedReply(format!(
                "{:?} is not a query",
                other
            ))),
        }
    }

    fn open_cursor(&mut self) -> Result<E::Cursor> {
        let source = self.source.as_ref().ok_or(DemuxError::NoSource)?;
        Ok(self.engine.open(source)?)
    }

    fn start_session(
        &mut self,
        id: u64,
        window: Window,
        selector: StreamSelector,
        flag: SeekFlag,
    ) -> Result<Option<Response>> {
        if self.sessions.contains_key(&id) {
            tracing::warn!(id, "Session already exists, ignoring start");
            return Ok(None);
        }

        let cursor = self.open_cursor()?;
        let stream_index = cursor.find_stream(&selector)?;
        tracing::debug!(
            id,
            stream_index,
            start = window.start,
            end = window.end,
            "Starting session"
        );

        let mut session = Session::new(id, cursor, stream_index, window, flag);
        let response = session.handle(Signal::Start);
        if !session.is_closed() {
            self.sessions.insert(id, session);
        }
        Ok(response)
    }

    fn signal(&mut self, id: u64, signal: Signal) -> Option<Response> {
        let Some(session) = self.sessions.get_mut(&id) else {
            tracing::debug!(id, ?signal, "No session, ignoring signal");
            return None;
        };
        let response = session.handle(signal);
        if session.is_closed() {
            self.sessions.remove(&id);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{MemoryContainer, MemoryEngine};
    use crate::protocol::StreamChunk;
    use crate::types::{LogLevel, MediaType};

    fn router() -> Router<MemoryEngine> {
        Router::new(
            MemoryEngine::new().with_container("movie.mp4", MemoryContainer::synthetic_av(10.0)),
        )
    }

    fn loaded() -> Router<MemoryEngine> {
        let mut router = router();
        let response = router
            .dispatch(Request::new(
                1,
                RequestPayload::LoadSource {
                    source: Source::from("movie.mp4"),
                    asset_path: None,
                },
            ))
            .unwrap();
        assert_eq!(response.result, Ok(Reply::Loaded));
        router
    }

    #[test]
    fn test_queries_require_source() {
        let mut router = router();
        for payload in [
            RequestPayload::GetMediaInfo,
            RequestPayload::GetAllStreams,
            RequestPayload::GetStreamInfo {
                selector: StreamSelector::video(),
            },
            RequestPayload::GetPacketAt {
                time: 0.0,
                selector: StreamSelector::video(),
                flag: SeekFlag::Backward,
            },
            RequestPayload::StreamStart {
                start: 0.0,
                end: 0.0,
                selector: StreamSelector::video(),
                flag: SeekFlag::Backward,
            },
        ] {
            let response = router.dispatch(Request::new(9, payload)).unwrap();
            assert_eq!(
                response.result,
                Err("source is not loaded. call load() first".to_string())
            );
        }
    }

    #[test]
    fn test_load_unknown_source_fails() {
        let mut router = router();
        let response = router
            .dispatch(Request::new(
                1,
                RequestPayload::LoadSource {
                    source: Source::from("other.mp4"),
                    asset_path: None,
                },
            ))
            .unwrap();
        assert_eq!(response.kind, MessageKind::LoadSource);
        assert!(response.result.is_err());
        assert!(router.source().is_none());
    }

    #[test]
    fn test_stream_info_by_selector() {
        let mut router = loaded();
        let response = router
            .dispatch(Request::new(
                2,
                RequestPayload::GetStreamInfo {
                    selector: StreamSelector::audio(),
                },
            ))
            .unwrap();
        match response.result {
            Ok(Reply::Stream(stream)) => {
                assert_eq!(stream.index, 1);
                assert_eq!(stream.media_type, MediaType::Audio);
                assert_eq!(stream.sample_rate, 48000);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_missing_stream_is_error_response() {
        let mut router = loaded();
        let response = router
            .dispatch(Request::new(
                2,
                RequestPayload::GetStreamInfo {
                    selector: StreamSelector::new(MediaType::Subtitle, None),
                },
            ))
            .unwrap();
        assert_eq!(response.id, 2);
        assert_eq!(response.kind, MessageKind::GetStreamInfo);
        assert_eq!(
            response.result,
            Err("Engine error: Cannot find wanted stream in the input file".to_string())
        );
    }

    #[test]
    fn test_session_lifecycle() {
        let mut router = loaded();
        let start = router
            .dispatch(Request::new(
                5,
                RequestPayload::StreamStart {
                    start: 0.0,
                    end: 0.0,
                    selector: StreamSelector::video(),
                    flag: SeekFlag::Backward,
                },
            ))
            .unwrap();
        assert_eq!(start.kind, MessageKind::StreamChunk);
        assert!(!start.is_terminal());
        assert_eq!(router.session_count(), 1);

        let next = router
            .dispatch(Request::new(5, RequestPayload::StreamNext))
            .unwrap();
        assert!(!next.is_terminal());

        let stop = router
            .dispatch(Request::new(5, RequestPayload::StreamStop))
            .unwrap();
        assert_eq!(stop.result, Ok(Reply::Chunk(StreamChunk::Cancelled)));
        assert_eq!(router.session_count(), 0);

        assert!(router
            .dispatch(Request::new(5, RequestPayload::StreamNext))
            .is_none());
        assert!(router
            .dispatch(Request::new(5, RequestPayload::StreamStop))
            .is_none());
    }

    #[test]
    fn test_malformed_frame_dropped() {
        let mut router = loaded();
        assert!(router.dispatch_frame(b"{\"id\":3").is_none());
        let response = router
            .dispatch_frame(br#"{"id":3,"kind":"get_all_streams"}"#)
            .unwrap();
        assert!(matches!(response.result, Ok(Reply::Streams(ref s)) if s.len() == 2));
    }

    #[test]
    fn test_set_log_level_without_source() {
        let engine = MemoryEngine::new();
        let stats = engine.stats();
        let mut router = Router::new(engine);
        let response = router
            .dispatch(Request::new(
                1,
                RequestPayload::SetLogLevel {
                    level: LogLevel::Info,
                },
            ))
            .unwrap();
        assert_eq!(response.result, Ok(Reply::LogLevelSet));
        assert_eq!(stats.log_level(), 32);
    }
}
