//! Decoder-facing conversions
//!
//! Pure transformations of already-fetched stream descriptors and packets into
//! the shapes a WebCodecs-style decoder expects. No engine interaction.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::types::{MediaKind, Packet, StreamDescriptor};

/// Microseconds per second; chunk timestamps are integral microseconds
pub const TIME_BASE: f64 = 1e6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoDecoderConfig {
    pub codec: String,
    pub coded_width: u32,
    pub coded_height: u32,
    pub description: Option<Bytes>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioDecoderConfig {
    pub codec: String,
    pub sample_rate: u32,
    pub number_of_channels: u32,
    pub description: Option<Bytes>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DecoderConfig {
    Video(VideoDecoderConfig),
    Audio(AudioDecoderConfig),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Key,
    Delta,
}

/// A ready-to-decode chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedChunk {
    pub kind: MediaKind,
    pub chunk_type: ChunkType,
    /// Microseconds
    pub timestamp: i64,
    /// Microseconds
    pub duration: i64,
    pub data: Bytes,
}

impl StreamDescriptor {
    /// Decoder configuration for this stream, read as the given kind
    pub fn decoder_config(&self, kind: MediaKind) -> DecoderConfig {
        let description = if self.extradata.is_empty() {
            None
        } else {
            Some(self.extradata.clone())
        };

        match kind {
            MediaKind::Video => DecoderConfig::Video(VideoDecoderConfig {
                codec: self.codec_string.clone(),
                coded_width: self.width,
                coded_height: self.height,
                description,
            }),
            MediaKind::Audio => DecoderConfig::Audio(AudioDecoderConfig {
                codec: self.codec_string.clone(),
                sample_rate: self.sample_rate,
                number_of_channels: self.channels,
                description,
            }),
        }
    }
}

impl Packet {
    /// Consume the packet into an encoded chunk; the payload moves, it is not copied
    pub fn into_encoded_chunk(self, kind: MediaKind) -> EncodedChunk {
        EncodedChunk {
            kind,
            chunk_type: if self.keyframe {
                ChunkType::Key
            } else {
                ChunkType::Delta
            },
            timestamp: (self.timestamp * TIME_BASE).round() as i64,
            duration: (self.duration * TIME_BASE).round() as i64,
            data: self.data,
        }
    }
}
