//! Data model shared by the engine, the worker and the client facade.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A loadable container: a local file or a URL the engine understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Path(PathBuf),
    Url(String),
}

impl Source {
    /// Path or URL string handed to the engine
    pub fn location(&self) -> String {
        match self {
            Source::Path(p) => p.to_string_lossy().to_string(),
            Source::Url(u) => u.clone(),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.location())
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::Path(path)
    }
}

impl From<&std::path::Path> for Source {
    fn from(path: &std::path::Path) -> Self {
        Source::Path(path.to_path_buf())
    }
}

impl From<&str> for Source {
    fn from(s: &str) -> Self {
        if s.contains("://") {
            Source::Url(s.to_string())
        } else {
            Source::Path(PathBuf::from(s))
        }
    }
}

/// Elementary stream type, numbered like the engine's media type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Unknown,
    #[default]
    Video,
    Audio,
    Data,
    Subtitle,
    Attachment,
}

impl MediaType {
    pub fn code(self) -> i32 {
        match self {
            MediaType::Unknown => -1,
            MediaType::Video => 0,
            MediaType::Audio => 1,
            MediaType::Data => 2,
            MediaType::Subtitle => 3,
            MediaType::Attachment => 4,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            0 => MediaType::Video,
            1 => MediaType::Audio,
            2 => MediaType::Data,
            3 => MediaType::Subtitle,
            4 => MediaType::Attachment,
            _ => MediaType::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Unknown => "unknown",
            MediaType::Video => "video",
            MediaType::Audio => "audio",
            MediaType::Data => "data",
            MediaType::Subtitle => "subtitle",
            MediaType::Attachment => "attachment",
        }
    }
}

/// The two media kinds the decoder-facing convenience API deals with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub fn media_type(self) -> MediaType {
        match self {
            MediaKind::Video => MediaType::Video,
            MediaKind::Audio => MediaType::Audio,
        }
    }
}

/// Picks one stream of a container.
///
/// `index == None` asks the engine for the best stream of `media_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreamSelector {
    pub media_type: MediaType,
    pub index: Option<usize>,
}

impl StreamSelector {
    pub fn new(media_type: MediaType, index: Option<usize>) -> Self {
        Self { media_type, index }
    }

    pub fn video() -> Self {
        Self::new(MediaType::Video, None)
    }

    pub fn audio() -> Self {
        Self::new(MediaType::Audio, None)
    }

    /// Exact stream index
    pub fn index(media_type: MediaType, index: usize) -> Self {
        Self::new(media_type, Some(index))
    }
}

/// Keyframe resolution rule used when seeking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeekFlag {
    /// Nearest keyframe at or before the target
    #[default]
    Backward,
    /// Nearest keyframe at or after the target
    Forward,
}

impl SeekFlag {
    /// Native seek flag bits
    pub fn bits(self) -> i32 {
        match self {
            SeekFlag::Backward => 1,
            SeekFlag::Forward => 0,
        }
    }
}

/// Engine log verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Quiet,
    Panic,
    Fatal,
    Error,
    #[default]
    Warning,
    Info,
    Verbose,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn code(self) -> i32 {
        match self {
            LogLevel::Quiet => -8,
            LogLevel::Panic => 0,
            LogLevel::Fatal => 8,
            LogLevel::Error => 16,
            LogLevel::Warning => 24,
            LogLevel::Info => 32,
            LogLevel::Verbose => 40,
            LogLevel::Debug => 48,
            LogLevel::Trace => 56,
        }
    }
}

/// Metadata of one elementary stream
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub index: usize,
    pub id: i32,
    pub media_type: MediaType,
    pub codec_name: String,
    pub codec_string: String,
    pub profile: String,
    pub level: i32,
    pub bit_rate: u64,
    pub extradata: Bytes,

    // Video
    pub width: u32,
    pub height: u32,
    pub pix_fmt: String,
    pub color_primaries: String,
    pub color_transfer: String,
    pub color_space: String,
    pub color_range: String,
    pub r_frame_rate: String,
    pub avg_frame_rate: String,
    pub sample_aspect_ratio: String,
    pub display_aspect_ratio: String,
    pub rotation: f64,

    // Audio
    pub channels: u32,
    pub sample_rate: u32,
    pub sample_fmt: String,

    pub start_time: f64,
    pub duration: f64,
    pub nb_frames: u64,
    pub tags: Vec<(String, String)>,
}

impl StreamDescriptor {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Container-level metadata plus every stream in container order
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MediaInfo {
    pub format_name: String,
    pub start_time: f64,
    pub duration: f64,
    pub bit_rate: u64,
    pub nb_streams: usize,
    pub nb_chapters: usize,
    pub flags: i32,
    pub streams: Vec<StreamDescriptor>,
}

/// One compressed, timestamped unit of an elementary stream.
///
/// Timestamps and durations are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub stream_index: usize,
    pub media_type: MediaType,
    pub timestamp: f64,
    pub duration: f64,
    pub keyframe: bool,
    pub data: Bytes,
    pub size: usize,
}

impl Packet {
    pub fn new(
        stream_index: usize,
        media_type: MediaType,
        timestamp: f64,
        duration: f64,
        keyframe: bool,
        data: impl Into<Bytes>,
    ) -> Self {
        let data = data.into();
        Self {
            stream_index,
            media_type,
            timestamp,
            duration,
            keyframe,
            size: data.len(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_codes() {
        for ty in [
            MediaType::Video,
            MediaType::Audio,
            MediaType::Data,
            MediaType::Subtitle,
            MediaType::Attachment,
        ] {
            assert_eq!(MediaType::from_code(ty.code()), ty);
        }
        assert_eq!(MediaType::from_code(42), MediaType::Unknown);
    }

    #[test]
    fn test_source_from_str() {
        assert_eq!(
            Source::from("https://example.com/a.mp4"),
            Source::Url("https://example.com/a.mp4".to_string())
        );
        assert_eq!(
            Source::from("/tmp/a.mp4"),
            Source::Path(PathBuf::from("/tmp/a.mp4"))
        );
    }

    #[test]
    fn test_packet_size_follows_payload() {
        let packet = Packet::new(0, MediaType::Video, 1.0, 0.04, true, vec![1u8, 2, 3]);
        assert_eq!(packet.size, 3);
    }

    #[test]
    fn test_default_selector_is_primary_video() {
        let sel = StreamSelector::default();
        assert_eq!(sel.media_type, MediaType::Video);
        assert_eq!(sel.index, None);
    }

    #[test]
    fn test_seek_flag_bits() {
        assert_eq!(SeekFlag::Backward.bits(), 1);
        assert_eq!(SeekFlag::Forward.bits(), 0);
        assert_eq!(LogLevel::default().code(), 24);
    }
}
