//! demux-stream CLI
//!
//! Prints container metadata and streams packets of one stream through the
//! worker-backed demuxer. `--demo` uses a synthetic in-memory container; real
//! files need the `ffmpeg` feature.

use clap::{ArgGroup, Parser};
use futures::StreamExt;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use demux_stream::{
    DemuxError, Demuxer, DemuxerConfig, LoggingConfig, MediaKind, MemoryContainer, MemoryEngine,
    Result,
};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "demux-stream";

const DEMO_SOURCE: &str = "demo.mp4";

/// Print container metadata and stream packets of one stream
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(group(ArgGroup::new("mode").required(true).args(["demo", "input"])))]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use a synthetic 10 second in-memory container
    #[arg(long)]
    demo: bool,

    /// Stream the primary audio stream instead of video
    #[arg(short, long)]
    audio: bool,

    /// Window start in seconds
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    start: f64,

    /// Window end in seconds; 0 or less reads to the end
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    end: f64,

    /// Stop after this many packets
    #[arg(short, long)]
    limit: Option<usize>,

    /// File path or URL to open
    input: Option<String>,
}

impl Args {
    fn kind(&self) -> MediaKind {
        if self.audio {
            MediaKind::Audio
        } else {
            MediaKind::Video
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let (config, config_error) = match &args.config {
        Some(path) if path.exists() => match DemuxerConfig::from_file(path) {
            Ok(config) => (config, None),
            Err(e) => (
                DemuxerConfig::default(),
                Some(format!("{}: {}", path.display(), e)),
            ),
        },
        _ => (DemuxerConfig::default(), None),
    };

    init_logging(&config.logging);
    tracing::info!("{} v{} starting", APP_NAME, VERSION);
    if let Some(e) = config_error {
        tracing::warn!("Failed to load config file {}. Using defaults.", e);
    }

    let (demuxer, source) = if args.demo {
        let engine =
            MemoryEngine::new().with_container(DEMO_SOURCE, MemoryContainer::synthetic_av(10.0));
        (Demuxer::new(engine, config)?, DEMO_SOURCE.to_string())
    } else {
        let input = args.input.clone().unwrap_or_default();
        (file_demuxer(config)?, input)
    };

    let result = run(&demuxer, &args, &source).await;
    demuxer.destroy();
    result
}

#[cfg(feature = "ffmpeg")]
fn file_demuxer(config: DemuxerConfig) -> Result<Demuxer> {
    Demuxer::new(demux_stream::FfmpegEngine::new(), config)
}

#[cfg(not(feature = "ffmpeg"))]
fn file_demuxer(_config: DemuxerConfig) -> Result<Demuxer> {
    Err(DemuxError::Config(
        "built without the ffmpeg feature; use --demo".to_string(),
    ))
}

async fn run(demuxer: &Demuxer, args: &Args, source: &str) -> Result<()> {
    demuxer.load(source).await?;

    let info = demuxer.get_media_info().await?;
    println!(
        "{}: {} ({:.3}s, {} streams, {} kb/s)",
        source,
        info.format_name,
        info.duration,
        info.nb_streams,
        info.bit_rate / 1000
    );
    for stream in &info.streams {
        println!(
            "  #{} {} {} [{}] {}",
            stream.index,
            stream.media_type.as_str(),
            stream.codec_name,
            stream.codec_string,
            stream.tag("language").unwrap_or("und")
        );
    }

    let kind = args.kind();
    let decoder_config = demuxer.get_decoder_config(kind).await?;
    match serde_json::to_string(&decoder_config) {
        Ok(json) => println!("decoder config: {}", json),
        Err(e) => tracing::warn!("Cannot encode decoder config: {}", e),
    }

    let mut packets = demuxer.read_media_packet(kind, args.start, args.end, None)?;
    let mut count = 0usize;
    let mut bytes = 0usize;
    while let Some(packet) = packets.next().await {
        let packet = packet?;
        count += 1;
        bytes += packet.size;
        println!(
            "  {:>10.6} {:>8.6} {} {:>7} bytes",
            packet.timestamp,
            packet.duration,
            if packet.keyframe { "K" } else { "-" },
            packet.size
        );
        if args.limit.is_some_and(|limit| count >= limit) {
            packets.cancel().await?;
            break;
        }
    }
    println!("{} packets, {} bytes", count, bytes);
    Ok(())
}

/// Initialize logging with tracing
fn init_logging(logging: &LoggingConfig) {
    let json = logging.is_json();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| logging.level.clone().into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> std::result::Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once(APP_NAME).chain(args.iter().copied()))
    }

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_parse_args() {
        let args = parse(&["--audio", "--start", "2", "--end=5.5", "movie.mkv"]).unwrap();
        assert_eq!(args.kind(), MediaKind::Audio);
        assert_eq!(args.start, 2.0);
        assert_eq!(args.end, 5.5);
        assert_eq!(args.input.as_deref(), Some("movie.mkv"));
        assert!(args.config.is_none());

        let args = parse(&["--demo", "--start=2", "--end", "-1", "--limit", "3"]).unwrap();
        assert!(args.demo);
        assert_eq!(args.kind(), MediaKind::Video);
        assert_eq!(args.end, -1.0);
        assert_eq!(args.limit, Some(3));
    }

    #[test]
    fn test_parse_requires_one_mode() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["--demo"]).unwrap().demo);
        assert!(parse(&["--demo", "movie.mp4"]).is_err());
        assert!(parse(&["a.mp4", "b.mp4"]).is_err());
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        assert!(parse(&["--start", "soon", "--demo"]).is_err());
        assert!(parse(&["--bogus", "--demo"]).is_err());
        let help = parse(&["--help"]).unwrap_err();
        assert_eq!(help.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
