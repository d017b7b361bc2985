//! Test fixtures for end-to-end tests
//!
//! Synthetic containers and engine wrappers, so no media files are needed.

use futures::StreamExt;
use std::path::Path;
use std::time::Duration;

use crate::client::{Demuxer, PacketStream};
use crate::config::DemuxerConfig;
use crate::engine::{DemuxEngine, EngineResult, EngineStats, MemoryContainer, MemoryEngine};
use crate::error::DemuxError;
use crate::types::{LogLevel, Packet, Source};

/// Location of the synthetic 10 second H.264 + AAC container
pub const MOVIE: &str = "fixtures/movie.mp4";

pub fn movie_engine() -> MemoryEngine {
    MemoryEngine::new().with_container(MOVIE, MemoryContainer::synthetic_av(10.0))
}

/// A demuxer over `engine`, with `MOVIE` loaded
pub async fn loaded_demuxer(engine: MemoryEngine) -> (Demuxer, EngineStats) {
    let stats = engine.stats();
    let demuxer = Demuxer::new(engine, DemuxerConfig::default()).unwrap();
    demuxer.load(MOVIE).await.unwrap();
    (demuxer, stats)
}

/// Drain a stream; returns the packets and the error that ended it, if any
pub async fn collect(mut stream: PacketStream) -> (Vec<Packet>, Option<DemuxError>) {
    let mut packets = Vec::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(packet) => packets.push(packet),
            Err(e) => {
                assert!(stream.next().await.is_none(), "stream continued after error");
                return (packets, Some(e));
            }
        }
    }
    (packets, None)
}

/// Wait until the demuxer has no pending requests left
pub async fn settle(demuxer: &Demuxer) {
    for _ in 0..100 {
        if demuxer.pending_requests() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("{} requests still pending", demuxer.pending_requests());
}

/// Engine that takes `delay` to open any source
pub struct SlowEngine {
    pub inner: MemoryEngine,
    pub delay: Duration,
}

impl DemuxEngine for SlowEngine {
    type Cursor = <MemoryEngine as DemuxEngine>::Cursor;

    fn init(&mut self, asset_path: Option<&Path>) -> EngineResult<()> {
        self.inner.init(asset_path)
    }

    fn open(&mut self, source: &Source) -> EngineResult<Self::Cursor> {
        std::thread::sleep(self.delay);
        self.inner.open(source)
    }

    fn set_log_level(&mut self, level: LogLevel) {
        self.inner.set_log_level(level)
    }
}
