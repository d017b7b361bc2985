//! Pull-driven packet streams
//!
//! A [`PacketStream`] asks the worker for exactly one packet per poll that
//! needs one: the first poll sends the stream start, every later poll a next.
//! Nothing is read ahead, so a slow consumer holds the engine still.

use futures::Stream;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::sync::mpsc;

use crate::channel::PendingRegistry;
use crate::chunk::EncodedChunk;
use crate::error::{DemuxError, Result};
use crate::protocol::{Reply, Request, RequestPayload, Response, StreamChunk, WorkerMessage};
use crate::types::{MediaKind, Packet};

enum State {
    /// Holds the start request until the first poll
    NotStarted(RequestPayload),
    /// A packet was handed out; the next poll sends demand
    Ready,
    /// Demand sent, waiting for the chunk
    Waiting,
    Done,
}

/// Stream of packets from one streaming session
pub struct PacketStream {
    id: u64,
    state: State,
    requests: mpsc::UnboundedSender<WorkerMessage>,
    chunks: mpsc::UnboundedReceiver<Response>,
    registry: PendingRegistry,
}

impl PacketStream {
    pub(crate) fn new(
        id: u64,
        start: RequestPayload,
        requests: mpsc::UnboundedSender<WorkerMessage>,
        registry: PendingRegistry,
    ) -> Self {
        let chunks = registry.register_stream(id);
        Self {
            id,
            state: State::NotStarted(start),
            requests,
            chunks,
            registry,
        }
    }

    /// Correlation id of the session
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, State::Done)
    }

    /// Stop the session and wait for the worker to acknowledge it.
    ///
    /// Resolves on the cancellation acknowledgment, or on an end or error
    /// that raced with the stop. Packets still in flight are discarded.
    pub async fn cancel(mut self) -> Result<()> {
        match self.state {
            State::Done => return Ok(()),
            State::NotStarted(_) => {
                self.finish();
                return Ok(());
            }
            State::Ready | State::Waiting => {}
        }

        if !self.send(RequestPayload::StreamStop) {
            self.finish();
            return Err(DemuxError::WorkerGone);
        }

        loop {
            match self.chunks.recv().await {
                None => {
                    self.finish();
                    return Err(DemuxError::WorkerGone);
                }
                Some(response) if response.is_terminal() => {
                    tracing::debug!(id = self.id, "Stream cancelled");
                    self.finish();
                    return Ok(());
                }
                Some(_) => {
                    tracing::trace!(id = self.id, "Discarding in-flight packet");
                }
            }
        }
    }

    fn send(&self, payload: RequestPayload) -> bool {
        self.requests
            .send(WorkerMessage::Request(Request::new(self.id, payload)))
            .is_ok()
    }

    fn finish(&mut self) {
        self.state = State::Done;
        self.registry.remove(self.id);
    }

    fn on_response(&mut self, response: Response) -> Option<Result<Packet>> {
        match response.result {
            Ok(Reply::Chunk(StreamChunk::Packet(packet))) => {
                self.state = State::Ready;
                Some(Ok(packet))
            }
            Ok(Reply::Chunk(StreamChunk::End)) | Ok(Reply::Chunk(StreamChunk::Cancelled)) => {
                self.finish();
                None
            }
            Ok(other) => {
                self.finish();
                Some(Err(DemuxError::UnexpectedReply(format!("{:?}", other))))
            }
            Err(message) => {
                self.finish();
                Some(Err(DemuxError::Remote(message)))
            }
        }
    }
}

impl Stream for PacketStream {
    type Item = Result<Packet>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match std::mem::replace(&mut this.state, State::Waiting) {
                State::Done => {
                    this.state = State::Done;
                    return Poll::Ready(None);
                }
                State::NotStarted(start) => {
                    if !this.send(start) {
                        this.finish();
                        return Poll::Ready(Some(Err(DemuxError::WorkerGone)));
                    }
                }
                State::Ready => {
                    if !this.send(RequestPayload::StreamNext) {
                        this.finish();
                        return Poll::Ready(Some(Err(DemuxError::WorkerGone)));
                    }
                }
                State::Waiting => {
                    return match ready!(this.chunks.poll_recv(cx)) {
                        Some(response) => Poll::Ready(this.on_response(response)),
                        None => {
                            this.finish();
                            Poll::Ready(Some(Err(DemuxError::WorkerGone)))
                        }
                    };
                }
            }
        }
    }
}

impl Drop for PacketStream {
    fn drop(&mut self) {
        match self.state {
            State::Ready | State::Waiting => {
                // The worker answers with a cancellation nobody reads; that
                // terminal response clears the waiter.
                tracing::debug!(id = self.id, "Stream dropped, stopping session");
                if !self.send(RequestPayload::StreamStop) {
                    self.registry.remove(self.id);
                }
            }
            State::NotStarted(_) => self.registry.remove(self.id),
            State::Done => {}
        }
    }
}

/// Packets of one media kind converted into encoded chunks
pub struct ChunkStream {
    inner: PacketStream,
    kind: MediaKind,
}

impl ChunkStream {
    pub(crate) fn new(inner: PacketStream, kind: MediaKind) -> Self {
        Self { inner, kind }
    }

    pub async fn cancel(self) -> Result<()> {
        self.inner.cancel().await
    }
}

impl Stream for ChunkStream {
    type Item = Result<EncodedChunk>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let kind = this.kind;
        Pin::new(&mut this.inner)
            .poll_next(cx)
            .map(|item| item.map(|packet| packet.map(|p| p.into_encoded_chunk(kind))))
    }
}
