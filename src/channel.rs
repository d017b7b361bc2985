//! Execution channel: correlation of worker responses with their waiters
//!
//! Every request registers a waiter under its id before it is sent. The
//! dispatcher task reads the worker's responses in order and hands each one to
//! its waiter. A waiter is removed on its terminal response; when the worker
//! goes away the registry is closed and every waiter sees its sender dropped.

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::protocol::Response;

/// A registered waiter
#[derive(Debug)]
pub enum Pending {
    /// Single-result request
    Once(oneshot::Sender<Response>),
    /// Streaming session, receives chunks until a terminal one
    Stream(mpsc::UnboundedSender<Response>),
}

/// Pending requests keyed by correlation id
#[derive(Debug, Clone, Default)]
pub struct PendingRegistry {
    waiters: Arc<DashMap<u64, Pending>>,
    closed: Arc<AtomicBool>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_once(&self, id: u64) -> oneshot::Receiver<Response> {
        let (tx, rx) = oneshot::channel();
        self.insert(id, Pending::Once(tx));
        rx
    }

    pub fn register_stream(&self, id: u64) -> mpsc::UnboundedReceiver<Response> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.insert(id, Pending::Stream(tx));
        rx
    }

    fn insert(&self, id: u64, pending: Pending) {
        if self.is_closed() {
            return;
        }
        self.waiters.insert(id, pending);
        // Lost a race with close(): drop the waiter so it fails too
        if self.is_closed() {
            self.waiters.remove(&id);
        }
    }

    pub fn remove(&self, id: u64) {
        self.waiters.remove(&id);
    }

    pub fn contains(&self, id: u64) -> bool {
        self.waiters.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Deliver a response to its waiter. Returns false if nobody was waiting.
    pub fn route(&self, response: Response) -> bool {
        let id = response.id;

        if !response.is_terminal() {
            if let Some(entry) = self.waiters.get(&id) {
                if let Pending::Stream(tx) = entry.value() {
                    return tx.send(response).is_ok();
                }
            }
        }

        match self.waiters.remove(&id) {
            Some((_, Pending::Once(tx))) => tx.send(response).is_ok(),
            Some((_, Pending::Stream(tx))) => tx.send(response).is_ok(),
            None => {
                tracing::debug!(id, kind = %response.kind, "No waiter for response");
                false
            }
        }
    }

    /// Fail every current and future waiter
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let failed = self.waiters.len();
        self.waiters.clear();
        if failed > 0 {
            tracing::warn!("Worker gone, failed {} pending requests", failed);
        }
    }
}

/// Route worker responses until the worker drops its sender
pub async fn dispatch(mut responses: mpsc::UnboundedReceiver<Response>, registry: PendingRegistry) {
    while let Some(response) = responses.recv().await {
        registry.route(response);
    }
    tracing::debug!("Response channel closed");
    registry.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{MessageKind, Reply, StreamChunk};
    use crate::types::{MediaType, Packet};

    fn packet_chunk(id: u64) -> Response {
        let packet = Packet::new(0, MediaType::Video, 0.0, 0.04, true, vec![1u8]);
        Response::chunk(id, StreamChunk::Packet(packet))
    }

    #[tokio::test]
    async fn test_once_waiter_removed_on_response() {
        let registry = PendingRegistry::new();
        let rx = registry.register_once(1);
        assert!(registry.route(Response::ok(1, MessageKind::GetMediaInfo, Reply::LogLevelSet)));
        assert!(registry.is_empty());
        assert_eq!(rx.await.unwrap().id, 1);
    }

    #[tokio::test]
    async fn test_stream_waiter_kept_until_terminal() {
        let registry = PendingRegistry::new();
        let mut rx = registry.register_stream(4);
        assert!(registry.route(packet_chunk(4)));
        assert!(registry.contains(4));
        assert!(registry.route(Response::chunk(4, StreamChunk::End)));
        assert!(!registry.contains(4));

        assert!(!rx.recv().await.unwrap().is_terminal());
        assert!(rx.recv().await.unwrap().is_terminal());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_id_dropped() {
        let registry = PendingRegistry::new();
        assert!(!registry.route(packet_chunk(99)));
    }

    #[tokio::test]
    async fn test_dispatcher_fails_waiters_when_worker_gone() {
        let registry = PendingRegistry::new();
        let once = registry.register_once(1);
        let mut stream = registry.register_stream(2);

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(dispatch(rx, registry.clone()));
        drop(tx);
        task.await.unwrap();

        assert!(once.await.is_err());
        assert!(stream.recv().await.is_none());
        assert!(registry.is_closed());

        let late = registry.register_once(3);
        assert!(late.await.is_err());
    }
}
