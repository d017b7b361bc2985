//! In-memory demux engine
//!
//! Serves scripted containers registered under a location string. Used for the
//! CLI demo mode and the test suite, and by hosts that synthesize media.

use bytes::Bytes;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;

use super::{DemuxCursor, DemuxEngine, EngineResult};
use crate::codec::{codec_string, CodecParams};
use crate::error::EngineError;
use crate::types::{
    LogLevel, MediaInfo, MediaType, Packet, SeekFlag, Source, StreamDescriptor, StreamSelector,
};

/// Counters shared between an engine, its cursors and whoever holds a clone
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    opens: Arc<AtomicUsize>,
    seeks: Arc<AtomicUsize>,
    reads: Arc<AtomicUsize>,
    log_level: Arc<AtomicI32>,
}

impl EngineStats {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn seeks(&self) -> usize {
        self.seeks.load(Ordering::SeqCst)
    }

    /// Packets handed out by all cursors
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Last log level code set on the engine
    pub fn log_level(&self) -> i32 {
        self.log_level.load(Ordering::SeqCst)
    }
}

/// A scripted container: stream descriptors plus interleaved packets
#[derive(Debug, Clone)]
pub struct MemoryContainer {
    info: MediaInfo,
    packets: Vec<Packet>,
    read_error_at: Option<usize>,
    seek_error: bool,
}

impl MemoryContainer {
    /// Packets are ordered by timestamp; ties keep their given order
    pub fn new(format_name: &str, streams: Vec<StreamDescriptor>, mut packets: Vec<Packet>) -> Self {
        packets.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        let duration = packets
            .iter()
            .map(|p| p.timestamp + p.duration)
            .fold(0.0, f64::max);

        let info = MediaInfo {
            format_name: format_name.to_string(),
            start_time: 0.0,
            duration,
            bit_rate: streams.iter().map(|s| s.bit_rate).sum(),
            nb_streams: streams.len(),
            nb_chapters: 0,
            flags: 0,
            streams,
        };

        Self {
            info,
            packets,
            read_error_at: None,
            seek_error: false,
        }
    }

    /// H.264 1280x720 at 25 fps with one keyframe per second, plus AAC
    /// stereo at 48 kHz, interleaved by timestamp.
    pub fn synthetic_av(duration_secs: f64) -> Self {
        const FPS: f64 = 25.0;
        const SAMPLE_RATE: f64 = 48000.0;
        const FRAME_SAMPLES: f64 = 1024.0;

        let video = synthetic_video_stream(0, duration_secs, FPS);
        let audio = synthetic_audio_stream(1, duration_secs, SAMPLE_RATE as u32);

        let mut packets = Vec::new();
        let frames = (duration_secs * FPS).round() as usize;
        for i in 0..frames {
            packets.push(Packet::new(
                0,
                MediaType::Video,
                i as f64 / FPS,
                1.0 / FPS,
                i % FPS as usize == 0,
                payload(0, i, 64),
            ));
        }

        let audio_duration = FRAME_SAMPLES / SAMPLE_RATE;
        let audio_frames = (duration_secs / audio_duration).ceil() as usize;
        for i in 0..audio_frames {
            packets.push(Packet::new(
                1,
                MediaType::Audio,
                i as f64 * audio_duration,
                audio_duration,
                true,
                payload(1, i, 16),
            ));
        }

        Self::new("mov,mp4,m4a,3gp,3g2,mj2", vec![video, audio], packets)
    }

    /// Fail the read of the packet at position `pos`
    pub fn with_read_error_at(mut self, pos: usize) -> Self {
        self.read_error_at = Some(pos);
        self
    }

    /// Fail every seek
    pub fn with_seek_error(mut self) -> Self {
        self.seek_error = true;
        self
    }

    pub fn info(&self) -> &MediaInfo {
        &self.info
    }

    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }
}

fn synthetic_video_stream(index: usize, duration: f64, fps: f64) -> StreamDescriptor {
    let (width, height) = (1280, 720);
    StreamDescriptor {
        index,
        id: index as i32 + 1,
        media_type: MediaType::Video,
        codec_name: "h264".to_string(),
        codec_string: codec_string(&CodecParams {
            media_type: MediaType::Video,
            codec_name: "h264",
            width,
            height,
            profile: Some(100),
            level: Some(31),
        }),
        profile: "High".to_string(),
        level: 31,
        bit_rate: 2_500_000,
        extradata: Bytes::from_static(&[0x01, 0x64, 0x00, 0x1f, 0xff, 0xe1]),
        width,
        height,
        pix_fmt: "yuv420p".to_string(),
        color_primaries: "bt709".to_string(),
        color_transfer: "bt709".to_string(),
        color_space: "bt709".to_string(),
        color_range: "tv".to_string(),
        r_frame_rate: format!("{}/1", fps),
        avg_frame_rate: format!("{}/1", fps),
        sample_aspect_ratio: "1:1".to_string(),
        display_aspect_ratio: "16:9".to_string(),
        start_time: 0.0,
        duration,
        nb_frames: (duration * fps).round() as u64,
        tags: vec![
            ("language".to_string(), "und".to_string()),
            ("handler_name".to_string(), "VideoHandler".to_string()),
        ],
        ..Default::default()
    }
}

fn synthetic_audio_stream(index: usize, duration: f64, sample_rate: u32) -> StreamDescriptor {
    StreamDescriptor {
        index,
        id: index as i32 + 1,
        media_type: MediaType::Audio,
        codec_name: "aac".to_string(),
        codec_string: codec_string(&CodecParams {
            media_type: MediaType::Audio,
            codec_name: "aac",
            width: 0,
            height: 0,
            profile: Some(1),
            level: None,
        }),
        profile: "LC".to_string(),
        level: -99,
        bit_rate: 128_000,
        extradata: Bytes::from_static(&[0x11, 0x90]),
        r_frame_rate: "0/0".to_string(),
        avg_frame_rate: "0/0".to_string(),
        sample_aspect_ratio: "N/A".to_string(),
        display_aspect_ratio: "N/A".to_string(),
        channels: 2,
        sample_rate,
        sample_fmt: "fltp".to_string(),
        start_time: 0.0,
        duration,
        tags: vec![("language".to_string(), "eng".to_string())],
        ..Default::default()
    }
}

fn payload(stream: usize, seq: usize, len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (stream * 131 + seq * 7 + i) as u8)
        .collect()
}

/// Engine serving [`MemoryContainer`]s by location
#[derive(Debug, Default)]
pub struct MemoryEngine {
    containers: HashMap<String, Arc<MemoryContainer>>,
    stats: EngineStats,
    initialized: bool,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a container under a path or URL
    pub fn with_container(mut self, location: impl Into<String>, container: MemoryContainer) -> Self {
        self.containers.insert(location.into(), Arc::new(container));
        self
    }

    /// Shared counters; clone before handing the engine to a worker
    pub fn stats(&self) -> EngineStats {
        self.stats.clone()
    }
}

impl DemuxEngine for MemoryEngine {
    type Cursor = MemoryCursor;

    fn init(&mut self, asset_path: Option<&Path>) -> EngineResult<()> {
        if self.initialized {
            return Ok(());
        }
        if let Some(path) = asset_path {
            if !path.exists() {
                return Err(EngineError::InitFailed(format!(
                    "engine asset {:?} not found",
                    path
                )));
            }
        }
        self.initialized = true;
        tracing::debug!("Memory engine initialized");
        Ok(())
    }

    fn open(&mut self, source: &Source) -> EngineResult<MemoryCursor> {
        let location = source.location();
        let container = self
            .containers
            .get(&location)
            .cloned()
            .ok_or_else(|| EngineError::OpenInput(location.clone()))?;
        self.stats.opens.fetch_add(1, Ordering::SeqCst);

        Ok(MemoryCursor {
            container,
            pos: 0,
            stats: self.stats.clone(),
        })
    }

    fn set_log_level(&mut self, level: LogLevel) {
        self.stats.log_level.store(level.code(), Ordering::SeqCst);
    }
}

/// Read position over one [`MemoryContainer`]
#[derive(Debug)]
pub struct MemoryCursor {
    container: Arc<MemoryContainer>,
    pos: usize,
    stats: EngineStats,
}

impl DemuxCursor for MemoryCursor {
    fn media_info(&self) -> MediaInfo {
        self.container.info.clone()
    }

    fn find_stream(&self, selector: &StreamSelector) -> EngineResult<usize> {
        if selector.media_type == MediaType::Unknown {
            return Err(EngineError::Unsupported(
                "stream selection by unknown media type".to_string(),
            ));
        }
        let streams = &self.container.info.streams;
        match selector.index {
            Some(i) => streams
                .get(i)
                .filter(|s| s.media_type == selector.media_type)
                .map(|s| s.index)
                .ok_or(EngineError::StreamNotFound),
            None => streams
                .iter()
                .find(|s| s.media_type == selector.media_type)
                .map(|s| s.index)
                .ok_or(EngineError::StreamNotFound),
        }
    }

    fn seek(&mut self, stream_index: usize, time: f64, flag: SeekFlag) -> EngineResult<()> {
        if self.container.seek_error {
            return Err(EngineError::Seek(format!("stream {} to {:.3}s", stream_index, time)));
        }
        if stream_index >= self.container.info.nb_streams {
            return Err(EngineError::Seek(format!("no stream {}", stream_index)));
        }
        self.stats.seeks.fetch_add(1, Ordering::SeqCst);

        let mut keyframes = self
            .container
            .packets
            .iter()
            .enumerate()
            .filter(|(_, p)| p.stream_index == stream_index && p.keyframe);

        let target = match flag {
            SeekFlag::Backward => keyframes
                .filter(|(_, p)| p.timestamp <= time)
                .last()
                .map(|(pos, _)| pos)
                .unwrap_or(0),
            SeekFlag::Forward => keyframes
                .find(|(_, p)| p.timestamp >= time)
                .map(|(pos, _)| pos)
                .ok_or_else(|| {
                    EngineError::Seek(format!("no keyframe at or after {:.3}s", time))
                })?,
        };

        tracing::trace!(stream_index, time, ?flag, target, "Memory cursor seek");
        self.pos = target;
        Ok(())
    }

    fn read_packet(&mut self) -> EngineResult<Option<Packet>> {
        if self.container.read_error_at == Some(self.pos) {
            return Err(EngineError::ReadPacket(format!(
                "corrupt packet at position {}",
                self.pos
            )));
        }
        let Some(stored) = self.container.packets.get(self.pos) else {
            return Ok(None);
        };
        self.pos += 1;
        self.stats.reads.fetch_add(1, Ordering::SeqCst);

        // Each read hands out its own buffer
        Ok(Some(Packet {
            data: Bytes::copy_from_slice(&stored.data),
            ..stored.clone()
        }))
    }
}
