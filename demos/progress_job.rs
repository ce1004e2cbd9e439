//! Progress job demo
//!
//! Run with: cargo run --example progress_job
//!
//! Starts a fake face-analysis job that reports four milestones, and two SSE
//! consumers that print every frame they would send to their client. One
//! consumer disconnects halfway; the stream stays alive for the other.

use std::time::Duration;

use serde_json::json;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use sse_relay::registry::{RegistryConfig, StreamRegistry};
use sse_relay::sse::{EventKind, EventMessage, ProgressPublisher, SseConfig, SseConsumer};

const STREAM: &str = "demo-job";

async fn run_job(publisher: ProgressPublisher) -> sse_relay::Result<()> {
    let steps = [
        EventMessage::progress(EventKind::ProcessingImage, "Processing image", 25),
        EventMessage::progress(EventKind::AnalyzingFace, "Analyzing face", 50),
        EventMessage::completed("Scan complete", json!({"quantitative": {"age": 31}})),
    ];

    for step in &steps {
        tokio::time::sleep(Duration::from_millis(300)).await;
        let delivered = publisher.send(step).await?;
        println!("[job] {} delivered={}", step.event, delivered);
    }
    Ok(())
}

async fn run_client(
    name: &'static str,
    registry: StreamRegistry,
    config: SseConfig,
    cancel: CancellationToken,
) {
    let consumer = SseConsumer::new(registry, STREAM, &config);
    let (mut wire, mut socket) = tokio::io::duplex(16 * 1024);

    let printer = tokio::spawn(async move {
        let mut buf = [0u8; 1024];
        while let Ok(n) = wire.read(&mut buf).await {
            if n == 0 {
                break;
            }
            print!("[{name}] {}", String::from_utf8_lossy(&buf[..n]));
        }
    });

    match consumer.run(&mut socket, &cancel).await {
        Ok(exit) => println!("[{name}] finished: {exit:?}"),
        Err(e) => println!("[{name}] failed: {e}"),
    }
    drop(socket);
    let _ = printer.await;
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sse_relay=debug".parse()?)
                .add_directive("progress_job=debug".parse()?),
        )
        .init();

    let registry =
        StreamRegistry::with_config(RegistryConfig::default().grace_period(Duration::from_secs(2)));
    let config = SseConfig::default().heartbeat_interval(Duration::from_millis(400));

    let steady = CancellationToken::new();
    let flaky = CancellationToken::new();

    let a = tokio::spawn(run_client("steady", registry.clone(), config.clone(), steady.clone()));
    let b = tokio::spawn(run_client("flaky", registry.clone(), config.clone(), flaky.clone()));

    tokio::time::sleep(Duration::from_millis(100)).await;
    let job = tokio::spawn(run_job(ProgressPublisher::new(registry.clone(), STREAM)));

    tokio::time::sleep(Duration::from_millis(450)).await;
    flaky.cancel();

    job.await??;
    registry.close_stream(STREAM).await;

    a.await?;
    b.await?;

    println!("streams left: {:?}", registry.list_streams().await);
    steady.cancel();
    Ok(())
}
