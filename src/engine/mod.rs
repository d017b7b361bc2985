//! Demux engine seam
//!
//! The worker never parses containers itself. It drives an engine through two
//! traits:
//! - [`DemuxEngine`]: engine-wide setup, opening sources, log level
//! - [`DemuxCursor`]: one opened source with its own read position
//!
//! Every request and every streaming session opens its own cursor, so sessions
//! never share a read position.

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod memory;

use std::path::Path;

use crate::error::EngineError;
use crate::types::{LogLevel, MediaInfo, Packet, SeekFlag, Source, StreamDescriptor, StreamSelector};

#[cfg(feature = "ffmpeg")]
pub use self::ffmpeg::FfmpegEngine;
pub use memory::{EngineStats, MemoryContainer, MemoryEngine};

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// A container demuxer hosted on the worker thread.
pub trait DemuxEngine: Send + 'static {
    type Cursor: DemuxCursor;

    /// Engine-wide initialization, run before the first source is opened.
    ///
    /// `asset_path` points at engine resources when the engine needs any.
    fn init(&mut self, asset_path: Option<&Path>) -> EngineResult<()> {
        let _ = asset_path;
        Ok(())
    }

    /// Open a source and parse its header
    fn open(&mut self, source: &Source) -> EngineResult<Self::Cursor>;

    fn set_log_level(&mut self, level: LogLevel);
}

/// An opened source with a sequential read position.
pub trait DemuxCursor {
    fn media_info(&self) -> MediaInfo;

    fn streams(&self) -> Vec<StreamDescriptor> {
        self.media_info().streams
    }

    /// Resolve a selector to a stream index
    fn find_stream(&self, selector: &StreamSelector) -> EngineResult<usize>;

    /// Reposition so the next read starts at the keyframe chosen by `flag`
    fn seek(&mut self, stream_index: usize, time: f64, flag: SeekFlag) -> EngineResult<()>;

    /// Next packet of any stream, `None` at end of file
    fn read_packet(&mut self) -> EngineResult<Option<Packet>>;
}

/// Read the next packet belonging to `stream_index`, skipping the others
pub fn next_packet_of<C: DemuxCursor>(
    cursor: &mut C,
    stream_index: usize,
) -> EngineResult<Option<Packet>> {
    while let Some(packet) = cursor.read_packet()? {
        if packet.stream_index == stream_index {
            return Ok(Some(packet));
        }
    }
    Ok(None)
}

/// Seek one stream to `time` and return its first packet from there
pub fn packet_at<C: DemuxCursor>(
    cursor: &mut C,
    stream_index: usize,
    time: f64,
    flag: SeekFlag,
) -> EngineResult<Packet> {
    cursor.seek(stream_index, time, flag)?;
    next_packet_of(cursor, stream_index)?.ok_or_else(|| {
        EngineError::ReadPacket("Failed to get av packet at timestamp".to_string())
    })
}

/// One packet per stream at `time`, in stream order
pub fn packets_at_all_streams<C: DemuxCursor>(
    cursor: &mut C,
    time: f64,
    flag: SeekFlag,
) -> EngineResult<Vec<Packet>> {
    let count = cursor.media_info().nb_streams;
    let mut packets = Vec::with_capacity(count);
    for stream_index in 0..count {
        packets.push(packet_at(cursor, stream_index, time, flag)?);
    }
    Ok(packets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MediaType;

    fn open_demo() -> <MemoryEngine as DemuxEngine>::Cursor {
        let mut engine =
            MemoryEngine::new().with_container("demo.mp4", MemoryContainer::synthetic_av(10.0));
        engine.open(&Source::from("demo.mp4")).unwrap()
    }

    #[test]
    fn test_next_packet_skips_other_streams() {
        let mut cursor = open_demo();
        let audio = cursor.find_stream(&StreamSelector::audio()).unwrap();
        let packet = next_packet_of(&mut cursor, audio).unwrap().unwrap();
        assert_eq!(packet.stream_index, audio);
        assert_eq!(packet.media_type, MediaType::Audio);
    }

    #[test]
    fn test_packet_at_backward_lands_on_keyframe() {
        let mut cursor = open_demo();
        let video = cursor.find_stream(&StreamSelector::video()).unwrap();
        let packet = packet_at(&mut cursor, video, 3.5, SeekFlag::Backward).unwrap();
        assert!(packet.keyframe);
        assert!((packet.timestamp - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_packets_at_all_streams_one_per_stream() {
        let mut cursor = open_demo();
        let packets = packets_at_all_streams(&mut cursor, 1.0, SeekFlag::Backward).unwrap();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].stream_index, 0);
        assert_eq!(packets[1].stream_index, 1);
    }
}
