//! Producer side: publishing job progress
//!
//! A long-running job reports each milestone through a [`ProgressPublisher`].
//! Publishing is fire-and-forget: a `false` result only means nobody was
//! listening at that moment.
//!
//! [`spawn_piped_job`] additionally mirrors every event onto an in-memory pipe
//! so the job's own HTTP response can stream it, for platforms where the
//! client reads the response body of the request that started the job.
//!
//! ```text
//!            ┌──► registry.publish() ──► subscribers
//!   job ─────┤
//!            └──► mpsc (bounded) ──► pump ──► DuplexStream ──► response body
//!                           ▲
//!                       heartbeat
//! ```

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::Result;
use crate::registry::StreamRegistry;

use super::config::SseConfig;
use super::consumer::write_frame;
use super::frame::HEARTBEAT;
use super::message::EventMessage;

/// Publishes progress events for one stream
pub struct ProgressPublisher {
    registry: StreamRegistry,
    stream_id: String,
    mirror: Option<mpsc::Sender<Bytes>>,
}

impl ProgressPublisher {
    pub fn new(registry: StreamRegistry, stream_id: impl Into<String>) -> Self {
        Self {
            registry,
            stream_id: stream_id.into(),
            mirror: None,
        }
    }

    fn mirrored(
        registry: StreamRegistry,
        stream_id: String,
        mirror: mpsc::Sender<Bytes>,
    ) -> Self {
        Self {
            registry,
            stream_id,
            mirror: Some(mirror),
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Encode and publish an event
    ///
    /// Returns whether any subscriber accepted it. Only encoding can fail.
    /// Never waits on a slow response pipe: a frame that does not fit in the
    /// mirror queue is dropped.
    pub async fn send(&self, message: &EventMessage) -> Result<bool> {
        let frame = message.to_frame()?;

        if let Some(mirror) = &self.mirror {
            match mirror.try_send(frame.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::debug!(
                        stream = %self.stream_id,
                        event = %message.event,
                        "Response pipe backlogged, event not mirrored"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(
                        stream = %self.stream_id,
                        "Response pipe closed, event not mirrored"
                    );
                }
            }
        }

        let delivered = self.registry.publish_bytes(&self.stream_id, frame).await;
        if !delivered {
            tracing::debug!(
                stream = %self.stream_id,
                event = %message.event,
                "No subscriber accepted event"
            );
        }

        Ok(delivered)
    }
}

/// A job started by [`spawn_piped_job`]
pub struct PipedJob {
    /// Generated stream id; clients may also subscribe to it
    pub stream_id: String,
    /// Read end of the response pipe
    pub body: DuplexStream,
    /// The job task
    pub job: JoinHandle<()>,
}

/// Start a job whose events go both to the registry and to a response pipe
///
/// Creates a temporary stream under a fresh UUID so that other clients can
/// subscribe while the job runs, sends a `ready` event, then runs `job`. The
/// pipe carries heartbeats until the job finishes or `cancel` fires; the
/// job itself keeps running after a cancel.
pub async fn spawn_piped_job<F, Fut>(
    registry: StreamRegistry,
    config: &SseConfig,
    cancel: CancellationToken,
    job: F,
) -> PipedJob
where
    F: FnOnce(ProgressPublisher) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let stream_id = Uuid::new_v4().to_string();
    registry
        .create_temporary_stream(&stream_id, config.temporary_stream_ttl)
        .await;

    let (body, pipe) = tokio::io::duplex(config.pipe_buffer_size);
    let (tx, rx) = mpsc::channel(config.mirror_capacity.max(1));

    let publisher = ProgressPublisher::mirrored(registry, stream_id.clone(), tx);
    let handle = tokio::spawn(async move {
        let ready = EventMessage::ready(publisher.stream_id(), "Stream initialized");
        if let Err(e) = publisher.send(&ready).await {
            tracing::error!(
                stream = %publisher.stream_id(),
                error = %e,
                "Failed to send ready event"
            );
        }
        job(publisher).await;
    });

    tokio::spawn(pump(
        stream_id.clone(),
        pipe,
        rx,
        config.pipe_heartbeat_interval,
        cancel,
    ));

    PipedJob {
        stream_id,
        body,
        job: handle,
    }
}

/// Copy mirrored frames and heartbeats into the pipe
///
/// Ends when every publisher is dropped, the client cancels, or the read end
/// of the pipe is gone.
async fn pump(
    stream_id: String,
    mut pipe: DuplexStream,
    mut frames: mpsc::Receiver<Bytes>,
    heartbeat_interval: Duration,
    cancel: CancellationToken,
) {
    let mut heartbeat = tokio::time::interval_at(
        Instant::now() + heartbeat_interval,
        heartbeat_interval,
    );
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let written = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                tracing::warn!(stream = %stream_id, "Client disconnected from piped stream");
                break;
            }

            frame = frames.recv() => match frame {
                Some(frame) => write_frame(&mut pipe, &frame).await,
                None => break,
            },

            _ = heartbeat.tick() => write_frame(&mut pipe, HEARTBEAT).await,
        };

        if let Err(e) = written {
            tracing::debug!(stream = %stream_id, error = %e, "Response pipe write failed");
            break;
        }
    }

    let _ = pipe.shutdown().await;
    tracing::info!(stream = %stream_id, "Piped stream completed");
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::sse::message::EventKind;

    #[tokio::test]
    async fn test_send_without_subscribers() {
        let registry = StreamRegistry::new();
        let publisher = ProgressPublisher::new(registry, "nobody");

        let message = EventMessage::progress(EventKind::ProcessingImage, "Processing image", 25);
        assert!(!publisher.send(&message).await.unwrap());
    }

    #[tokio::test]
    async fn test_send_reaches_subscriber() {
        let registry = StreamRegistry::new();
        let mailbox = registry.subscribe("job").await.unwrap();
        let publisher = ProgressPublisher::new(registry, "job");

        let message = EventMessage::progress(EventKind::AnalyzingFace, "Analyzing face", 50);
        assert!(publisher.send(&message).await.unwrap());

        let received = mailbox.recv().await.unwrap();
        assert_eq!(received, message.to_frame().unwrap());
    }

    #[tokio::test]
    async fn test_backlogged_mirror_does_not_block() {
        let registry = StreamRegistry::new();
        let mailbox = registry.subscribe("job").await.unwrap();
        let (tx, mut rx) = mpsc::channel(1);
        let publisher = ProgressPublisher::mirrored(registry, "job".to_string(), tx);

        let first = EventMessage::progress(EventKind::ProcessingImage, "Processing image", 25);
        let second = EventMessage::progress(EventKind::AnalyzingFace, "Analyzing face", 50);
        let sent = tokio::time::timeout(Duration::from_secs(1), async {
            publisher.send(&first).await.unwrap() && publisher.send(&second).await.unwrap()
        })
        .await
        .expect("send blocked on a full mirror");
        assert!(sent);

        // The pipe kept the first frame, subscribers still got both
        assert_eq!(rx.try_recv().unwrap(), first.to_frame().unwrap());
        assert!(rx.try_recv().is_err());
        assert_eq!(mailbox.try_recv().unwrap(), first.to_frame().unwrap());
        assert_eq!(mailbox.try_recv().unwrap(), second.to_frame().unwrap());
    }

    #[tokio::test]
    async fn test_closed_mirror_still_publishes() {
        let registry = StreamRegistry::new();
        let mailbox = registry.subscribe("job").await.unwrap();
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let publisher = ProgressPublisher::mirrored(registry, "job".to_string(), tx);

        let done = EventMessage::completed("Scan complete", json!({"ok": true}));
        assert!(publisher.send(&done).await.unwrap());
        assert_eq!(mailbox.try_recv().unwrap(), done.to_frame().unwrap());
    }

    #[tokio::test]
    async fn test_piped_job_streams_to_body() {
        let registry = StreamRegistry::new();
        let config = SseConfig::default();

        let mut piped = spawn_piped_job(
            registry.clone(),
            &config,
            CancellationToken::new(),
            |publisher| async move {
                let done = EventMessage::completed("Scan complete", json!({"ok": true}));
                publisher.send(&done).await.unwrap();
            },
        )
        .await;

        let mut body = String::new();
        piped.body.read_to_string(&mut body).await.unwrap();
        piped.job.await.unwrap();

        let ready = EventMessage::ready(piped.stream_id.clone(), "Stream initialized");
        let done = EventMessage::completed("Scan complete", json!({"ok": true}));
        let expected = [ready.to_frame().unwrap(), done.to_frame().unwrap()].concat();
        assert_eq!(body.as_bytes(), &expected[..]);

        // Temporary stream exists for late subscribers
        assert!(registry.exists(&piped.stream_id).await);
    }

    #[tokio::test]
    async fn test_piped_job_publishes_to_subscribers() {
        let registry = StreamRegistry::new();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let piped = spawn_piped_job(
            registry.clone(),
            &SseConfig::default(),
            CancellationToken::new(),
            |publisher| async move {
                let _ = release_rx.await;
                let step = EventMessage::progress(EventKind::AnalyzingFace, "Analyzing face", 50);
                publisher.send(&step).await.unwrap();
            },
        )
        .await;

        let mailbox = registry.subscribe(&piped.stream_id).await.unwrap();
        release_tx.send(()).unwrap();
        piped.job.await.unwrap();

        let step = EventMessage::progress(EventKind::AnalyzingFace, "Analyzing face", 50);
        // The ready event may or may not have been published before we subscribed
        let mut last = mailbox.recv().await.unwrap();
        while let Some(next) = mailbox.try_recv() {
            last = next;
        }
        assert_eq!(last, step.to_frame().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_piped_job_heartbeats_until_cancelled() {
        let registry = StreamRegistry::new();
        let config = SseConfig::default().pipe_heartbeat_interval(Duration::from_secs(5));
        let cancel = CancellationToken::new();
        let (_hold_tx, hold_rx) = tokio::sync::oneshot::channel::<()>();

        let mut piped = spawn_piped_job(registry, &config, cancel.clone(), |_publisher| async move {
            let _ = hold_rx.await;
        })
        .await;

        let ready = EventMessage::ready(piped.stream_id.clone(), "Stream initialized")
            .to_frame()
            .unwrap();
        let mut buf = vec![0u8; ready.len()];
        piped.body.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, ready);

        let mut beat = vec![0u8; HEARTBEAT.len()];
        piped.body.read_exact(&mut beat).await.unwrap();
        assert_eq!(beat, HEARTBEAT);

        cancel.cancel();
        let mut rest = Vec::new();
        piped.body.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
        piped.job.abort();
    }
}
