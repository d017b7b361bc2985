//! Client facade
//!
//! [`Demuxer`] is the async face of the worker. Each call allocates a
//! correlation id, registers a waiter, sends one request and awaits the
//! matching response. Ranged reads return a [`PacketStream`] instead.

mod packet_stream;

pub use packet_stream::{ChunkStream, PacketStream};

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};

use crate::channel::{self, PendingRegistry};
use crate::chunk::{DecoderConfig, EncodedChunk};
use crate::config::DemuxerConfig;
use crate::engine::DemuxEngine;
use crate::error::{DemuxError, Result};
use crate::protocol::{MessageKind, Reply, Request, RequestPayload, Response, WorkerMessage};
use crate::types::{
    LogLevel, MediaInfo, MediaKind, Packet, SeekFlag, Source, StreamDescriptor, StreamSelector,
};
use crate::worker::{self, WorkerHandle, WorkerOptions};

/// Async demuxer backed by a dedicated worker thread
pub struct Demuxer {
    requests: mpsc::UnboundedSender<WorkerMessage>,
    registry: PendingRegistry,
    next_id: AtomicU64,
    source: RwLock<Option<Source>>,
    config: DemuxerConfig,
    worker: WorkerHandle,
}

impl Demuxer {
    /// Start the worker thread for `engine`.
    ///
    /// Must be called from within a tokio runtime, which hosts the response
    /// dispatcher.
    pub fn new<E: DemuxEngine>(engine: E, config: DemuxerConfig) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| DemuxError::Config(format!("no tokio runtime: {}", e)))?;

        let registry = PendingRegistry::new();
        let (responses, inbox) = mpsc::unbounded_channel();
        let worker = worker::spawn(
            engine,
            WorkerOptions {
                thread_name: config.worker_thread_name.clone(),
                log_level: config.engine_log_level,
            },
            responses,
        )?;
        runtime.spawn(channel::dispatch(inbox, registry.clone()));

        Ok(Self {
            requests: worker.sender(),
            registry,
            next_id: AtomicU64::new(1),
            source: RwLock::new(None),
            config,
            worker,
        })
    }

    pub fn config(&self) -> &DemuxerConfig {
        &self.config
    }

    /// The loaded source, if any
    pub fn source(&self) -> Option<Source> {
        self.source.read().clone()
    }

    /// Load a source; every other query needs one
    pub async fn load(&self, source: impl Into<Source>) -> Result<()> {
        let source = source.into();
        let payload = RequestPayload::LoadSource {
            source: source.clone(),
            asset_path: self.config.engine_asset_path.clone(),
        };
        match self.request(payload).await? {
            Reply::Loaded => {
                tracing::info!("Demuxer loaded {}", source);
                *self.source.write() = Some(source);
                Ok(())
            }
            other => Err(unexpected(MessageKind::LoadSource, &other)),
        }
    }

    pub async fn get_media_info(&self) -> Result<MediaInfo> {
        self.require_source()?;
        match self.request(RequestPayload::GetMediaInfo).await? {
            Reply::MediaInfo(info) => Ok(info),
            other => Err(unexpected(MessageKind::GetMediaInfo, &other)),
        }
    }

    pub async fn get_av_stream(&self, selector: StreamSelector) -> Result<StreamDescriptor> {
        self.require_source()?;
        match self
            .request(RequestPayload::GetStreamInfo { selector })
            .await?
        {
            Reply::Stream(stream) => Ok(stream),
            other => Err(unexpected(MessageKind::GetStreamInfo, &other)),
        }
    }

    pub async fn get_av_streams(&self) -> Result<Vec<StreamDescriptor>> {
        self.require_source()?;
        match self.request(RequestPayload::GetAllStreams).await? {
            Reply::Streams(streams) => Ok(streams),
            other => Err(unexpected(MessageKind::GetAllStreams, &other)),
        }
    }

    /// First packet of the selected stream at the keyframe `flag` picks for `time`
    pub async fn get_av_packet(
        &self,
        time: f64,
        selector: StreamSelector,
        flag: SeekFlag,
    ) -> Result<Packet> {
        self.require_source()?;
        let payload = RequestPayload::GetPacketAt {
            time,
            selector,
            flag,
        };
        match self.request(payload).await? {
            Reply::Packet(packet) => Ok(packet),
            other => Err(unexpected(MessageKind::GetPacketAt, &other)),
        }
    }

    /// One packet per stream at `time`, in stream order
    pub async fn get_av_packets(&self, time: f64, flag: SeekFlag) -> Result<Vec<Packet>> {
        self.require_source()?;
        match self
            .request(RequestPayload::GetPacketsAtAllStreams { time, flag })
            .await?
        {
            Reply::Packets(packets) => Ok(packets),
            other => Err(unexpected(MessageKind::GetPacketsAtAllStreams, &other)),
        }
    }

    /// Stream packets of the selected stream from `start` (seconds) until the
    /// first packet at or past `end`. `end == 0` reads to end of file.
    pub fn read_av_packet(
        &self,
        start: f64,
        end: f64,
        selector: StreamSelector,
        flag: SeekFlag,
    ) -> Result<PacketStream> {
        self.require_source()?;
        let id = self.next_id();
        tracing::debug!(id, start, end, ?selector, "Opening packet stream");
        Ok(PacketStream::new(
            id,
            RequestPayload::StreamStart {
                start,
                end,
                selector,
                flag,
            },
            self.requests.clone(),
            self.registry.clone(),
        ))
    }

    pub async fn set_log_level(&self, level: LogLevel) -> Result<()> {
        match self
            .request(RequestPayload::SetLogLevel { level })
            .await?
        {
            Reply::LogLevelSet => Ok(()),
            other => Err(unexpected(MessageKind::SetLogLevel, &other)),
        }
    }

    // ── Media-kind conveniences ─────────────────────────────────────────────

    /// Stream of the given kind; `index == None` picks the best one
    pub async fn get_media_stream(
        &self,
        kind: MediaKind,
        index: Option<usize>,
    ) -> Result<StreamDescriptor> {
        self.get_av_stream(StreamSelector::new(kind.media_type(), index))
            .await
    }

    pub async fn seek_media_packet(
        &self,
        kind: MediaKind,
        time: f64,
        flag: Option<SeekFlag>,
    ) -> Result<Packet> {
        let flag = flag.unwrap_or(self.config.default_seek_flag);
        self.get_av_packet(time, StreamSelector::new(kind.media_type(), None), flag)
            .await
    }

    pub fn read_media_packet(
        &self,
        kind: MediaKind,
        start: f64,
        end: f64,
        flag: Option<SeekFlag>,
    ) -> Result<PacketStream> {
        let flag = flag.unwrap_or(self.config.default_seek_flag);
        self.read_av_packet(
            start,
            end,
            StreamSelector::new(kind.media_type(), None),
            flag,
        )
    }

    /// Decoder configuration of the best stream of `kind`
    pub async fn get_decoder_config(&self, kind: MediaKind) -> Result<DecoderConfig> {
        let stream = self.get_media_stream(kind, None).await?;
        Ok(stream.decoder_config(kind))
    }

    /// Encoded chunk at `time` for the best stream of `kind`
    pub async fn seek(
        &self,
        kind: MediaKind,
        time: f64,
        flag: Option<SeekFlag>,
    ) -> Result<EncodedChunk> {
        let packet = self.seek_media_packet(kind, time, flag).await?;
        Ok(packet.into_encoded_chunk(kind))
    }

    /// Encoded chunks of the best stream of `kind` between `start` and `end`
    pub fn read(
        &self,
        kind: MediaKind,
        start: f64,
        end: f64,
        flag: Option<SeekFlag>,
    ) -> Result<ChunkStream> {
        let packets = self.read_media_packet(kind, start, end, flag)?;
        Ok(ChunkStream::new(packets, kind))
    }

    /// Stop the worker and forget the source. Pending requests fail with
    /// [`DemuxError::WorkerGone`].
    pub fn destroy(&self) {
        tracing::debug!("Destroying demuxer");
        self.source.write().take();
        self.worker.shutdown();
    }

    pub fn is_worker_running(&self) -> bool {
        !self.worker.is_finished()
    }

    /// Requests and sessions still waiting for a terminal response
    pub fn pending_requests(&self) -> usize {
        self.registry.len()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn require_source(&self) -> Result<()> {
        if self.source.read().is_none() {
            return Err(DemuxError::NoSource);
        }
        Ok(())
    }

    async fn request(&self, payload: RequestPayload) -> Result<Reply> {
        let request = Request::new(self.next_id(), payload);
        let id = request.id;
        let kind = request.kind();

        let rx = self.registry.register_once(id);
        if self.requests.send(WorkerMessage::Request(request)).is_err() {
            self.registry.remove(id);
            return Err(DemuxError::WorkerGone);
        }
        tracing::trace!(id, %kind, "Request sent");

        let response = self.wait(id, rx).await?;
        response.result.map_err(DemuxError::Remote)
    }

    async fn wait(&self, id: u64, rx: oneshot::Receiver<Response>) -> Result<Response> {
        let received = match self.config.request_timeout() {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    self.registry.remove(id);
                    tracing::warn!(id, "Request timed out after {:?}", limit);
                    return Err(DemuxError::Timeout(id));
                }
            },
            None => rx.await,
        };
        received.map_err(|_| DemuxError::WorkerGone)
    }
}

impl Drop for Demuxer {
    fn drop(&mut self) {
        self.worker.shutdown();
    }
}

fn unexpected(kind: MessageKind, reply: &Reply) -> DemuxError {
    DemuxError::UnexpectedReply(format!("{}: {:?}", kind, reply))
}
