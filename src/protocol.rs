//! Wire protocol between the client side and the worker
//!
//! Every message is an envelope tagged with a correlation id. A streaming
//! session reuses the id of its `StreamStart` request for every `StreamNext`,
//! `StreamStop` and chunk, so many sessions multiplex over one channel.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::types::{
    LogLevel, MediaInfo, Packet, SeekFlag, Source, StreamDescriptor, StreamSelector,
};

/// Request/response kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    LoadSource,
    GetStreamInfo,
    GetAllStreams,
    GetMediaInfo,
    GetPacketAt,
    GetPacketsAtAllStreams,
    StreamStart,
    StreamNext,
    StreamStop,
    SetLogLevel,
    /// Outbound only: one chunk of a streaming session
    StreamChunk,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestPayload {
    LoadSource {
        source: Source,
        #[serde(default)]
        asset_path: Option<PathBuf>,
    },
    GetStreamInfo {
        #[serde(default)]
        selector: StreamSelector,
    },
    GetAllStreams,
    GetMediaInfo,
    GetPacketAt {
        time: f64,
        #[serde(default)]
        selector: StreamSelector,
        #[serde(default)]
        flag: SeekFlag,
    },
    GetPacketsAtAllStreams {
        time: f64,
        #[serde(default)]
        flag: SeekFlag,
    },
    /// `end == 0` reads to end of file
    StreamStart {
        start: f64,
        end: f64,
        #[serde(default)]
        selector: StreamSelector,
        #[serde(default)]
        flag: SeekFlag,
    },
    StreamNext,
    StreamStop,
    SetLogLevel {
        level: LogLevel,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    #[serde(flatten)]
    pub payload: RequestPayload,
}

impl Request {
    pub fn new(id: u64, payload: RequestPayload) -> Self {
        Self { id, payload }
    }

    pub fn kind(&self) -> MessageKind {
        match self.payload {
            RequestPayload::LoadSource { .. } => MessageKind::LoadSource,
            RequestPayload::GetStreamInfo { .. } => MessageKind::GetStreamInfo,
            RequestPayload::GetAllStreams => MessageKind::GetAllStreams,
            RequestPayload::GetMediaInfo => MessageKind::GetMediaInfo,
            RequestPayload::GetPacketAt { .. } => MessageKind::GetPacketAt,
            RequestPayload::GetPacketsAtAllStreams { .. } => MessageKind::GetPacketsAtAllStreams,
            RequestPayload::StreamStart { .. } => MessageKind::StreamStart,
            RequestPayload::StreamNext => MessageKind::StreamNext,
            RequestPayload::StreamStop => MessageKind::StreamStop,
            RequestPayload::SetLogLevel { .. } => MessageKind::SetLogLevel,
        }
    }

    /// Decode a JSON frame sent by a foreign host
    pub fn from_frame(frame: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(frame)
    }

    pub fn to_frame(&self) -> serde_json::Result<Bytes> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}

/// One element of a streaming session's output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "chunk", content = "packet", rename_all = "snake_case")]
pub enum StreamChunk {
    Packet(Packet),
    /// Natural end of stream: EOF or the first packet past the window
    End,
    /// Acknowledges a stop
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reply {
    Loaded,
    Stream(StreamDescriptor),
    Streams(Vec<StreamDescriptor>),
    MediaInfo(MediaInfo),
    Packet(Packet),
    Packets(Vec<Packet>),
    Chunk(StreamChunk),
    LogLevelSet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    pub kind: MessageKind,
    pub result: Result<Reply, String>,
}

impl Response {
    pub fn ok(id: u64, kind: MessageKind, reply: Reply) -> Self {
        Self {
            id,
            kind,
            result: Ok(reply),
        }
    }

    pub fn error(id: u64, kind: MessageKind, message: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            result: Err(message.into()),
        }
    }

    pub fn chunk(id: u64, chunk: StreamChunk) -> Self {
        Self::ok(id, MessageKind::StreamChunk, Reply::Chunk(chunk))
    }

    /// Whether nothing more follows under this id
    pub fn is_terminal(&self) -> bool {
        !matches!(self.result, Ok(Reply::Chunk(StreamChunk::Packet(_))))
    }

    pub fn to_frame(&self) -> serde_json::Result<Bytes> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}

/// Everything the worker thread receives
#[derive(Debug)]
pub enum WorkerMessage {
    Request(Request),
    /// An undecoded JSON request
    Frame(Bytes),
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MediaType;

    #[test]
    fn test_decode_json_frame() {
        let frame = br#"{"id":7,"kind":"get_packet_at","time":1.5,"selector":{"media_type":"audio","index":null},"flag":"forward"}"#;
        let request = Request::from_frame(frame).unwrap();
        assert_eq!(request.id, 7);
        assert_eq!(request.kind(), MessageKind::GetPacketAt);
        assert_eq!(
            request.payload,
            RequestPayload::GetPacketAt {
                time: 1.5,
                selector: StreamSelector::audio(),
                flag: SeekFlag::Forward,
            }
        );
    }

    #[test]
    fn test_decode_applies_defaults() {
        let request = Request::from_frame(br#"{"id":1,"kind":"stream_start","start":0,"end":0}"#)
            .unwrap();
        match request.payload {
            RequestPayload::StreamStart { selector, flag, .. } => {
                assert_eq!(selector.media_type, MediaType::Video);
                assert_eq!(flag, SeekFlag::Backward);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_malformed_frame_is_an_error() {
        assert!(Request::from_frame(b"{\"id\":1,\"kind\":\"bogus\"}").is_err());
        assert!(Request::from_frame(b"not json").is_err());
    }

    #[test]
    fn test_request_frame_round_trip() {
        let request = Request::new(3, RequestPayload::StreamStop);
        let decoded = Request::from_frame(&request.to_frame().unwrap()).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_terminal_responses() {
        let packet = Packet::new(0, MediaType::Video, 0.0, 0.04, true, vec![0u8; 2]);
        assert!(!Response::chunk(1, StreamChunk::Packet(packet)).is_terminal());
        assert!(Response::chunk(1, StreamChunk::End).is_terminal());
        assert!(Response::chunk(1, StreamChunk::Cancelled).is_terminal());
        assert!(Response::error(1, MessageKind::StreamChunk, "boom").is_terminal());
        assert!(Response::ok(2, MessageKind::GetMediaInfo, Reply::LogLevelSet).is_terminal());
    }
}
