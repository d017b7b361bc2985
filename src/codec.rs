//! Codec string generation
//!
//! Generates RFC 6381 style codec strings for decoder configuration.

use crate::types::MediaType;

/// Codec parameters relevant to the codec string
#[derive(Debug, Clone, Copy)]
pub struct CodecParams<'a> {
    pub media_type: MediaType,
    /// Engine codec name, e.g. "h264", "aac"
    pub codec_name: &'a str,
    pub width: u32,
    pub height: u32,
    pub profile: Option<i32>,
    pub level: Option<i32>,
}

/// Codec string for any stream; "undf" for streams that are neither audio nor video
pub fn codec_string(params: &CodecParams<'_>) -> String {
    match params.media_type {
        MediaType::Video => get_video_codec_string(
            params.codec_name,
            params.width,
            params.height,
            params.profile,
            params.level,
        ),
        MediaType::Audio => get_audio_codec_string(params.codec_name, params.profile),
        _ => "undf".to_string(),
    }
}

/// Get codec string for a video codec
pub fn get_video_codec_string(
    codec_name: &str,
    width: u32,
    height: u32,
    profile: Option<i32>,
    level: Option<i32>,
) -> String {
    match codec_name {
        "h264" => get_h264_profile_level(width, height, profile, level),
        // HEVC Main unless told otherwise
        "hevc" | "h265" => format!(
            "hvc1.{}.6.L{}.B0",
            profile.filter(|p| *p > 0).unwrap_or(1),
            level.filter(|l| *l > 0).unwrap_or(93)
        ),
        "vp9" => format!(
            "vp09.{:02}.{:02}.08",
            profile.filter(|p| *p >= 0).unwrap_or(0),
            level.filter(|l| *l > 0).unwrap_or(10)
        ),
        "av1" => format!(
            "av01.{}.{:02}M.08",
            profile.filter(|p| *p >= 0).unwrap_or(0),
            level.filter(|l| *l >= 0).unwrap_or(4)
        ),
        "vp8" => "vp8".to_string(),
        other => other.to_string(),
    }
}

/// Get codec string for an audio codec
pub fn get_audio_codec_string(codec_name: &str, profile: Option<i32>) -> String {
    match codec_name {
        // Engine AAC profiles are audio object type - 1
        "aac" => format!("mp4a.40.{}", profile.filter(|p| *p >= 0).map_or(2, |p| p + 1)),
        "mp3" => "mp4a.40.34".to_string(),
        "ac3" => "ac-3".to_string(),
        "eac3" => "ec-3".to_string(),
        "opus" => "opus".to_string(),
        "flac" => "flac".to_string(),
        "vorbis" => "vorbis".to_string(),
        "pcm_alaw" => "alaw".to_string(),
        "pcm_mulaw" => "ulaw".to_string(),
        other => other.to_string(),
    }
}

/// Get profile level for H.264
pub fn get_h264_profile_level(
    width: u32,
    height: u32,
    profile: Option<i32>,
    level: Option<i32>,
) -> String {
    let pixels = u64::from(width) * u64::from(height);
    let profile_byte = match profile {
        Some(66) => 0x42,  // Baseline
        Some(77) => 0x4d,  // Main
        Some(100) => 0x64, // High
        Some(244) => 0xf4, // High 4:4:4 Predictive
        _ => {
            if pixels <= 130000 {
                0x42
            } else if pixels <= 921600 {
                0x4d
            } else {
                0x64
            }
        }
    };

    // Engine levels are level * 10, which is also the level_idc byte
    let level_byte = match level {
        Some(l) if l > 0 => l as u8,
        _ => {
            if pixels <= 130000 {
                21
            } else if pixels <= 414720 {
                30
            } else if pixels <= 921600 {
                31
            } else if pixels <= 2073600 {
                40
            } else if pixels <= 8847360 {
                51
            } else {
                52
            }
        }
    };

    format!("avc1.{:02x}00{:02x}", profile_byte, level_byte)
}
