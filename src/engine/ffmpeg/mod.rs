//! FFmpeg-backed demux engine (feature `ffmpeg`)

pub mod helpers;

use bytes::Bytes;
use ffmpeg_next as ffmpeg;
use std::path::Path;

use super::{DemuxCursor, DemuxEngine, EngineResult};
use crate::codec::{codec_string, CodecParams};
use crate::error::EngineError;
use crate::types::{
    LogLevel, MediaInfo, MediaType, Packet, SeekFlag, Source, StreamDescriptor, StreamSelector,
};

/// Demuxes local files and URLs through libavformat
#[derive(Debug, Default)]
pub struct FfmpegEngine {
    initialized: bool,
}

impl FfmpegEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DemuxEngine for FfmpegEngine {
    type Cursor = FfmpegCursor;

    fn init(&mut self, asset_path: Option<&Path>) -> EngineResult<()> {
        if self.initialized {
            return Ok(());
        }
        if let Some(path) = asset_path {
            // libavformat is linked in; there is nothing to locate
            tracing::debug!("Ignoring engine asset path {:?}", path);
        }
        ffmpeg::init().map_err(|e| EngineError::InitFailed(e.to_string()))?;
        self.initialized = true;
        tracing::info!("FFmpeg initialized");
        Ok(())
    }

    fn open(&mut self, source: &Source) -> EngineResult<FfmpegCursor> {
        let location = source.location();
        // `input` also runs avformat_find_stream_info
        let input = ffmpeg::format::input(&location).map_err(|e| match e {
            ffmpeg::Error::StreamNotFound => EngineError::FindStreamInfo(location.clone()),
            other => EngineError::OpenInput(format!("{}: {}", location, other)),
        })?;

        let info = media_info(&input);
        tracing::debug!(
            "Opened {} ({}, {} streams, {:.2}s)",
            location,
            info.format_name,
            info.nb_streams,
            info.duration
        );

        Ok(FfmpegCursor { input, info })
    }

    fn set_log_level(&mut self, level: LogLevel) {
        helpers::set_log_level(level.code());
    }
}

/// One opened input
pub struct FfmpegCursor {
    input: ffmpeg::format::context::Input,
    info: MediaInfo,
}

impl DemuxCursor for FfmpegCursor {
    fn media_info(&self) -> MediaInfo {
        self.info.clone()
    }

    fn find_stream(&self, selector: &StreamSelector) -> EngineResult<usize> {
        if selector.media_type == MediaType::Unknown {
            return Err(EngineError::Unsupported(
                "stream selection by unknown media type".to_string(),
            ));
        }
        helpers::find_best_stream(&self.input, medium(selector.media_type), selector.index)
            .map_err(|_| EngineError::StreamNotFound)
    }

    fn seek(&mut self, stream_index: usize, time: f64, flag: SeekFlag) -> EngineResult<()> {
        let time_base = self
            .input
            .stream(stream_index)
            .map(|s| s.time_base())
            .ok_or_else(|| EngineError::Seek(format!("no stream {}", stream_index)))?;

        let ts = helpers::rescale_ts(
            (time * 1_000_000.0) as i64,
            ffmpeg::rescale::TIME_BASE,
            time_base,
        );

        helpers::seek_frame(&mut self.input, stream_index, ts, flag.bits()).map_err(|code| {
            EngineError::Seek(format!(
                "stream {} to {:.3}s: {}",
                stream_index,
                time,
                ffmpeg::Error::from(code)
            ))
        })
    }

    fn read_packet(&mut self) -> EngineResult<Option<Packet>> {
        let mut packet = ffmpeg::Packet::empty();
        match packet.read(&mut self.input) {
            Ok(()) => {}
            Err(ffmpeg::Error::Eof) => return Ok(None),
            Err(e) => return Err(EngineError::ReadPacket(e.to_string())),
        }

        let stream_index = packet.stream();
        let (time_base, media_type) = self
            .input
            .stream(stream_index)
            .map(|s| (f64::from(s.time_base()), media_type(s.parameters().medium())))
            .ok_or_else(|| EngineError::ReadPacket(format!("no stream {}", stream_index)))?;

        // Some containers (AVI) carry only DTS
        let timestamp = packet
            .pts()
            .or_else(|| packet.dts())
            .map_or(0.0, |ts| ts as f64 * time_base);

        Ok(Some(Packet::new(
            stream_index,
            media_type,
            timestamp,
            packet.duration() as f64 * time_base,
            packet.is_key(),
            packet.data().map(Bytes::copy_from_slice).unwrap_or_default(),
        )))
    }
}

fn medium(media_type: MediaType) -> ffmpeg::media::Type {
    match media_type {
        MediaType::Video => ffmpeg::media::Type::Video,
        MediaType::Audio => ffmpeg::media::Type::Audio,
        MediaType::Data => ffmpeg::media::Type::Data,
        MediaType::Subtitle => ffmpeg::media::Type::Subtitle,
        MediaType::Attachment => ffmpeg::media::Type::Attachment,
        MediaType::Unknown => ffmpeg::media::Type::Unknown,
    }
}

fn media_type(medium: ffmpeg::media::Type) -> MediaType {
    match medium {
        ffmpeg::media::Type::Video => MediaType::Video,
        ffmpeg::media::Type::Audio => MediaType::Audio,
        ffmpeg::media::Type::Data => MediaType::Data,
        ffmpeg::media::Type::Subtitle => MediaType::Subtitle,
        ffmpeg::media::Type::Attachment => MediaType::Attachment,
        _ => MediaType::Unknown,
    }
}

fn media_info(input: &ffmpeg::format::context::Input) -> MediaInfo {
    let (start_time, flags) = helpers::format_start_and_flags(input);
    let container_duration = input.duration().max(0) as f64 / 1_000_000.0;
    let streams: Vec<StreamDescriptor> = input
        .streams()
        .map(|s| describe_stream(input, &s, container_duration))
        .collect();

    MediaInfo {
        format_name: input.format().name().to_string(),
        start_time: if start_time == ffmpeg::ffi::AV_NOPTS_VALUE {
            0.0
        } else {
            start_time as f64 / 1_000_000.0
        },
        duration: container_duration,
        bit_rate: input.bit_rate().max(0) as u64,
        nb_streams: streams.len(),
        nb_chapters: input.nb_chapters() as usize,
        flags,
        streams,
    }
}

fn describe_stream(
    input: &ffmpeg::format::context::Input,
    stream: &ffmpeg::Stream<'_>,
    container_duration: f64,
) -> StreamDescriptor {
    let params = stream.parameters();
    let media_type = media_type(params.medium());
    let codec_name = params.id().name().to_string();
    let time_base = f64::from(stream.time_base());
    let profile = helpers::codec_params_profile(&params);
    let level = helpers::codec_params_level(&params);

    let mut desc = StreamDescriptor {
        index: stream.index(),
        id: stream.id(),
        media_type,
        profile: helpers::codec_params_profile_name(&params),
        level,
        bit_rate: helpers::codec_params_bit_rate(&params),
        extradata: helpers::codec_params_extradata(&params),
        r_frame_rate: "0/0".to_string(),
        avg_frame_rate: "0/0".to_string(),
        sample_aspect_ratio: "N/A".to_string(),
        display_aspect_ratio: "N/A".to_string(),
        start_time: if stream.start_time() == ffmpeg::ffi::AV_NOPTS_VALUE {
            0.0
        } else {
            stream.start_time() as f64 * time_base
        },
        duration: if stream.duration() > 0 {
            stream.duration() as f64 * time_base
        } else {
            container_duration
        },
        tags: stream
            .metadata()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        ..Default::default()
    };

    match media_type {
        MediaType::Video => {
            desc.width = helpers::codec_params_width(&params);
            desc.height = helpers::codec_params_height(&params);
            let colors = helpers::codec_params_color_names(&params);
            desc.color_primaries = colors.primaries;
            desc.color_transfer = colors.transfer;
            desc.color_space = colors.space;
            desc.color_range = colors.range;
            desc.pix_fmt = pixel_format_name(&params);
            desc.r_frame_rate = rational_str(stream.rate(), '/');
            desc.avg_frame_rate = rational_str(stream.avg_frame_rate(), '/');
            desc.rotation = rotation(stream, &params);
            if let Some((sar, dar)) =
                helpers::guess_aspect_ratios(input, stream, desc.width, desc.height)
            {
                desc.sample_aspect_ratio = format!("{}:{}", sar.0, sar.1);
                desc.display_aspect_ratio = format!("{}:{}", dar.0, dar.1);
            }
        }
        MediaType::Audio => {
            desc.channels = helpers::codec_params_channels(&params);
            desc.sample_rate = helpers::codec_params_sample_rate(&params);
            desc.sample_fmt = sample_format_name(&params);
        }
        _ => {}
    }

    desc.codec_string = codec_string(&CodecParams {
        media_type,
        codec_name: &codec_name,
        width: desc.width,
        height: desc.height,
        profile: Some(profile).filter(|p| *p >= 0),
        level: Some(level).filter(|l| *l > 0),
    });
    desc.codec_name = codec_name;

    // Some codecs (vp8) carry no frame count
    let frames = stream.frames();
    desc.nb_frames = if frames > 0 {
        frames as u64
    } else {
        let fps = stream.avg_frame_rate();
        if fps.denominator() > 0 {
            (container_duration * f64::from(fps)).max(0.0) as u64
        } else {
            0
        }
    };

    desc
}

fn pixel_format_name(params: &ffmpeg::codec::Parameters) -> String {
    ffmpeg::codec::context::Context::from_parameters(params.clone())
        .and_then(|ctx| ctx.decoder().video())
        .ok()
        .and_then(|video| video.format().descriptor())
        .map(|d| d.name().to_string())
        .unwrap_or_default()
}

fn sample_format_name(params: &ffmpeg::codec::Parameters) -> String {
    ffmpeg::codec::context::Context::from_parameters(params.clone())
        .and_then(|ctx| ctx.decoder().audio())
        .map(|audio| audio.format().name().to_string())
        .unwrap_or_default()
}

fn rational_str(r: ffmpeg::Rational, sep: char) -> String {
    format!("{}{}{}", r.numerator(), sep, r.denominator())
}

/// The "rotate" tag wins over the display matrix
fn rotation(stream: &ffmpeg::Stream<'_>, params: &ffmpeg::codec::Parameters) -> f64 {
    let tagged = stream
        .metadata()
        .get("rotate")
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|theta| *theta != 0.0);

    let theta = tagged
        .or_else(|| helpers::codec_params_display_rotation(params))
        .unwrap_or(0.0);
    normalize_rotation(theta)
}

/// Map an angle into [0, 360), snapping values just below a full turn to 0
pub fn normalize_rotation(theta: f64) -> f64 {
    theta - 360.0 * (theta / 360.0 + 0.9 / 360.0).floor()
}
