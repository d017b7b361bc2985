//! Time-ranged, flow-controlled media packet streaming.
//!
//! A synchronous demux engine runs on a dedicated worker thread. The async
//! [`Demuxer`] facade talks to it over an ordered channel, correlating
//! responses by request id, and exposes ranged reads as pull-driven streams.

pub mod channel;
pub mod chunk;
pub mod client;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod types;
pub mod worker;

#[cfg(test)]
pub(crate) mod tests;

pub use chunk::{ChunkType, DecoderConfig, EncodedChunk};
pub use client::{ChunkStream, Demuxer, PacketStream};
pub use config::{DemuxerConfig, LoggingConfig};
pub use engine::{DemuxCursor, DemuxEngine, EngineStats, MemoryContainer, MemoryEngine};
#[cfg(feature = "ffmpeg")]
pub use engine::FfmpegEngine;
pub use error::{DemuxError, EngineError, Result};
pub use types::{
    LogLevel, MediaInfo, MediaKind, MediaType, Packet, SeekFlag, Source, StreamDescriptor,
    StreamSelector,
};
