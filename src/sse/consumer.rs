//! SSE consumer loop
//!
//! Subscribes one client connection to a stream and forwards everything the
//! mailbox receives to the client's writer:
//!
//! ```text
//! subscribe ──► handshake ──► loop {
//!                               cancelled      → unsubscribe, stop
//!                               mailbox closed → stop
//!                               payload        → write + flush
//!                               tick           → heartbeat
//!                             }
//! ```
//!
//! The registry has no idea when a client goes away; the caller signals it by
//! cancelling the token (usually when the HTTP connection drops).

use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::registry::{Mailbox, MailboxId, StreamRegistry};

use super::config::SseConfig;
use super::frame::{self, HEARTBEAT};

/// Why a consumer loop ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerExit {
    /// The cancellation token fired
    Cancelled,
    /// The registry closed the mailbox (stream closed or registry shut down)
    Closed,
}

/// Forwards one stream to one client
pub struct SseConsumer {
    registry: StreamRegistry,
    stream_id: String,
    heartbeat_interval: Duration,
}

impl SseConsumer {
    pub fn new(
        registry: StreamRegistry,
        stream_id: impl Into<String>,
        config: &SseConfig,
    ) -> Self {
        Self {
            registry,
            stream_id: stream_id.into(),
            heartbeat_interval: config.heartbeat_interval,
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Run until cancelled, closed, or a write fails
    ///
    /// The subscription is released before returning, whichever way the loop
    /// ends. If the future is dropped mid-loop (the HTTP server gave up on the
    /// connection), the release is spawned onto the runtime instead.
    pub async fn run<W>(&self, writer: &mut W, cancel: &CancellationToken) -> Result<ConsumerExit>
    where
        W: AsyncWrite + Unpin,
    {
        let mailbox = self.registry.subscribe(&self.stream_id).await?;
        let mut subscription = Subscription {
            registry: self.registry.clone(),
            stream_id: self.stream_id.clone(),
            mailbox: Some(mailbox.id()),
        };

        let result = self.forward(&mailbox, writer, cancel).await;

        subscription.release().await;

        match &result {
            Ok(exit) => tracing::debug!(stream = %self.stream_id, exit = ?exit, "Consumer done"),
            Err(e) => tracing::debug!(stream = %self.stream_id, error = %e, "Consumer failed"),
        }

        result
    }

    async fn forward<W>(
        &self,
        mailbox: &Mailbox,
        writer: &mut W,
        cancel: &CancellationToken,
    ) -> Result<ConsumerExit>
    where
        W: AsyncWrite + Unpin,
    {
        let handshake = frame::handshake(&self.stream_id)?;
        write_frame(writer, &handshake).await?;

        tracing::info!(
            stream = %self.stream_id,
            mailbox = %mailbox.id(),
            "Connection established"
        );

        // First heartbeat one full interval after the handshake
        let period = self.heartbeat_interval;
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tracing::info!(stream = %self.stream_id, "Client disconnected");
                    return Ok(ConsumerExit::Cancelled);
                }

                payload = mailbox.recv() => match payload {
                    Some(payload) => write_frame(writer, &payload).await?,
                    None => {
                        tracing::info!(stream = %self.stream_id, "Subscription closed");
                        return Ok(ConsumerExit::Closed);
                    }
                },

                _ = heartbeat.tick() => write_frame(writer, HEARTBEAT).await?,
            }
        }
    }
}

/// Releases a subscription exactly once, even if `run` is dropped mid-loop
struct Subscription {
    registry: StreamRegistry,
    stream_id: String,
    mailbox: Option<MailboxId>,
}

impl Subscription {
    async fn release(&mut self) {
        if let Some(id) = self.mailbox.take() {
            self.registry.unsubscribe_id(&self.stream_id, id).await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(id) = self.mailbox.take() else {
            return;
        };

        let registry = self.registry.clone();
        let stream_id = std::mem::take(&mut self.stream_id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!(
                    stream = %stream_id,
                    mailbox = %id,
                    "Consumer dropped, releasing"
                );
                handle.spawn(async move {
                    registry.unsubscribe_id(&stream_id, id).await;
                });
            }
            Err(_) => {
                tracing::warn!(
                    stream = %stream_id,
                    mailbox = %id,
                    "Consumer dropped outside a runtime, subscription not released"
                );
            }
        }
    }
}

pub(crate) async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use std::io;

    use tokio::io::{AsyncRead, AsyncReadExt};

    use super::*;
    use crate::error::Error;

    async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> String {
        let mut buf = Vec::new();
        while !buf.ends_with(b"\n\n") {
            buf.push(reader.read_u8().await.unwrap());
        }
        String::from_utf8(buf).unwrap()
    }

    #[tokio::test]
    async fn test_forwards_payloads_until_cancelled() {
        let registry = StreamRegistry::new();
        let consumer = SseConsumer::new(registry.clone(), "job", &SseConfig::default());
        let (mut client, mut server) = tokio::io::duplex(1024);
        let cancel = CancellationToken::new();

        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move { consumer.run(&mut server, &cancel).await })
        };

        let handshake = read_frame(&mut client).await;
        let expected_prefix = "event: ready\ndata: {\"code\":200,\"stream_id\":\"job\",\"ts\":";
        assert!(handshake.starts_with(expected_prefix));
        assert_eq!(registry.subscriber_count("job").await, 1);

        assert!(registry.publish("job", b"event: x\ndata: 1\n\n").await);
        assert_eq!(read_frame(&mut client).await, "event: x\ndata: 1\n\n");

        cancel.cancel();
        let exit = task.await.unwrap().unwrap();
        assert_eq!(exit, ConsumerExit::Cancelled);
        assert_eq!(registry.subscriber_count("job").await, 0);
        assert!(registry.exists("job").await); // grace period
    }

    #[tokio::test]
    async fn test_stops_when_stream_closed() {
        let registry = StreamRegistry::new();
        let consumer = SseConsumer::new(registry.clone(), "job", &SseConfig::default());
        let (mut client, mut server) = tokio::io::duplex(1024);

        let task = tokio::spawn(async move {
            consumer
                .run(&mut server, &CancellationToken::new())
                .await
        });

        read_frame(&mut client).await;
        registry.close_stream("job").await;

        let exit = task.await.unwrap().unwrap();
        assert_eq!(exit, ConsumerExit::Closed);
        assert!(!registry.exists("job").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sends_heartbeats() {
        let registry = StreamRegistry::new();
        let config = SseConfig::default().heartbeat_interval(Duration::from_secs(15));
        let consumer = SseConsumer::new(registry.clone(), "job", &config);
        let (mut client, mut server) = tokio::io::duplex(1024);
        let cancel = CancellationToken::new();

        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move { consumer.run(&mut server, &cancel).await })
        };

        read_frame(&mut client).await;
        let started = Instant::now();
        assert_eq!(read_frame(&mut client).await, ": heartbeat\n\n");
        assert!(started.elapsed() >= Duration::from_secs(15));
        assert_eq!(read_frame(&mut client).await, ": heartbeat\n\n");

        cancel.cancel();
        assert_eq!(task.await.unwrap().unwrap(), ConsumerExit::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_consumer_releases_subscription() {
        let registry = StreamRegistry::with_config(
            crate::registry::RegistryConfig::default().grace_period(Duration::from_secs(1)),
        );
        let consumer = SseConsumer::new(registry.clone(), "job", &SseConfig::default());
        let (mut client, mut server) = tokio::io::duplex(1024);

        let task = tokio::spawn(async move {
            consumer
                .run(&mut server, &CancellationToken::new())
                .await
        });

        read_frame(&mut client).await;
        assert_eq!(registry.subscriber_count("job").await, 1);

        // The server drops the connection future without cancelling the token
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(registry.subscriber_count("job").await, 0);
        assert!(registry.exists("job").await);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!registry.exists("job").await);
    }

    #[tokio::test]
    async fn test_write_failure_releases_subscription() {
        let registry = StreamRegistry::new();
        let consumer = SseConsumer::new(registry.clone(), "job", &SseConfig::default());
        let mut writer = tokio_test::io::Builder::new()
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "client gone"))
            .build();

        let result = consumer.run(&mut writer, &CancellationToken::new()).await;

        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(registry.subscriber_count("job").await, 0);
    }

    #[tokio::test]
    async fn test_subscribe_failure_is_reported() {
        let registry = StreamRegistry::with_config(
            crate::registry::RegistryConfig::default().max_subscribers_per_stream(1),
        );
        let _existing = registry.subscribe("job").await.unwrap();
        let consumer = SseConsumer::new(registry.clone(), "job", &SseConfig::default());
        let (_client, mut server) = tokio::io::duplex(64);

        let result = consumer.run(&mut server, &CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::Registry(_))));
        assert_eq!(registry.subscriber_count("job").await, 1);
    }
}
