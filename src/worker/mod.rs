//! Worker thread hosting the demux engine
//!
//! The engine is synchronous and never leaves this thread. Requests arrive in
//! order on an unbounded channel and responses leave in the order they are
//! produced.

pub mod router;
pub mod session;

use std::thread::JoinHandle;
use tokio::sync::mpsc;

pub use router::Router;
pub use session::{Phase, Session, Signal, Window};

use crate::engine::DemuxEngine;
use crate::error::Result;
use crate::protocol::{Response, WorkerMessage};
use crate::types::LogLevel;

/// Settings applied when the worker starts
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub thread_name: String,
    pub log_level: LogLevel,
}

/// Handle to a running worker thread
#[derive(Debug)]
pub struct WorkerHandle {
    requests: mpsc::UnboundedSender<WorkerMessage>,
    thread: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn sender(&self) -> mpsc::UnboundedSender<WorkerMessage> {
        self.requests.clone()
    }

    /// Ask the worker to stop after the messages already queued
    pub fn shutdown(&self) {
        if self.requests.send(WorkerMessage::Shutdown).is_err() {
            tracing::debug!("Worker already stopped");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

/// Spawn the worker thread. Responses are sent on `responses`; the sender is
/// dropped when the worker exits.
pub fn spawn<E: DemuxEngine>(
    engine: E,
    options: WorkerOptions,
    responses: mpsc::UnboundedSender<Response>,
) -> Result<WorkerHandle> {
    let (requests, inbox) = mpsc::unbounded_channel();
    let thread = std::thread::Builder::new()
        .name(options.thread_name.clone())
        .spawn(move || {
            let mut router = Router::new(engine);
            router.engine_mut().set_log_level(options.log_level);
            run(router, inbox, responses);
        })?;

    tracing::info!("Spawned worker thread {}", options.thread_name);
    Ok(WorkerHandle { requests, thread })
}

fn run<E: DemuxEngine>(
    mut router: Router<E>,
    mut inbox: mpsc::UnboundedReceiver<WorkerMessage>,
    responses: mpsc::UnboundedSender<Response>,
) {
    while let Some(message) = inbox.blocking_recv() {
        let response = match message {
            WorkerMessage::Request(request) => router.dispatch(request),
            WorkerMessage::Frame(frame) => router.dispatch_frame(&frame),
            WorkerMessage::Shutdown => {
                tracing::debug!("Worker received shutdown");
                break;
            }
        };

        if let Some(response) = response {
            if responses.send(response).is_err() {
                tracing::debug!("Response channel closed");
                break;
            }
        }
    }

    tracing::info!(
        "Worker stopped, dropping {} open sessions",
        router.session_count()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{MemoryContainer, MemoryEngine};
    use crate::protocol::{MessageKind, Reply, Request, RequestPayload};
    use crate::types::Source;
    use bytes::Bytes;

    fn options() -> WorkerOptions {
        WorkerOptions {
            thread_name: "test-worker".to_string(),
            log_level: LogLevel::Error,
        }
    }

    #[tokio::test]
    async fn test_worker_answers_in_order() {
        let engine = MemoryEngine::new().with_container("a.mp4", MemoryContainer::synthetic_av(3.0));
        let stats = engine.stats();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let worker = spawn(engine, options(), tx).unwrap();
        let sender = worker.sender();

        sender
            .send(WorkerMessage::Request(Request::new(
                1,
                RequestPayload::LoadSource {
                    source: Source::from("a.mp4"),
                    asset_path: None,
                },
            )))
            .unwrap();
        sender
            .send(WorkerMessage::Frame(Bytes::from_static(b"garbage")))
            .unwrap();
        sender
            .send(WorkerMessage::Frame(Bytes::from_static(
                br#"{"id":2,"kind":"get_media_info"}"#,
            )))
            .unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!((first.id, first.kind), (1, MessageKind::LoadSource));
        let second = rx.recv().await.unwrap();
        assert_eq!(second.id, 2);
        assert!(matches!(second.result, Ok(Reply::MediaInfo(ref info)) if info.nb_streams == 2));
        assert_eq!(stats.log_level(), LogLevel::Error.code());

        worker.shutdown();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_worker_exits_when_sender_dropped() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let worker = spawn(MemoryEngine::new(), options(), tx).unwrap();
        let WorkerHandle { requests, thread } = worker;
        drop(requests);
        assert!(rx.recv().await.is_none());
        tokio::task::spawn_blocking(move || thread.join().unwrap())
            .await
            .unwrap();
    }
}
