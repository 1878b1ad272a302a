//! Logic store replay tool - Main Entry Point
//!
//! Replays a synthetic capture through the capture worker and prints a
//! summary of the resulting store. The capture is described by an optional
//! TOML file (see [`ReplaySettings`]); without one a two-channel default is
//! used.

use anyhow::Context;
use logicstore_rs::{
    capture::encode::ReplayStream, CaptureEvent, CaptureSession, EdgeKind, LogicSnapshot,
    ReplaySettings,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,logicstore_rs=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = match std::env::args().nth(1) {
        Some(path) => ReplaySettings::load(&path)
            .with_context(|| format!("Failed to load replay settings from {}", path))?,
        None => ReplaySettings::default(),
    };
    tracing::info!(
        "Replaying {} samples on {} channel(s) ({})",
        settings.samples,
        settings.capture.channels.len(),
        settings.capture.format
    );

    let snapshot = Arc::new(LogicSnapshot::new());
    let (thread, handle) = CaptureSession::spawn(Arc::clone(&snapshot))?;

    let started = Instant::now();
    handle.start(settings.capture.clone());
    for chunk in ReplayStream::new(&settings) {
        if !handle.payload(chunk) {
            anyhow::bail!("Capture worker stopped unexpectedly");
        }
    }
    handle.end();

    // Wait for the worker to finish the run
    let mut ended = None;
    while ended.is_none() {
        match handle.recv_timeout(Duration::from_secs(30)) {
            Some(CaptureEvent::Ended { metrics, .. }) => ended = Some(metrics),
            Some(CaptureEvent::Error(message)) => tracing::warn!("Capture error: {}", message),
            Some(_) => {}
            None => anyhow::bail!("Timed out waiting for the capture to end"),
        }
    }
    handle.shutdown();
    if thread.join().is_err() {
        tracing::error!("Capture thread panicked");
    }
    tracing::info!("Capture replayed in {:?}", started.elapsed());

    let written = snapshot.written_samples();
    for channel in snapshot.channel_ids() {
        let last = written.saturating_sub(1);
        let first_edge = snapshot.next_edge(channel, 0, last, 0)?;
        let rising = snapshot
            .edges(channel, 0, last.min(1 << 16), EdgeKind::Rising)?
            .len();
        let view = snapshot.display_edges(channel, 0, last, 100, 8, (written / 100).max(1))?;
        println!(
            "channel {:>2}: first edge {:?}, {} rising edge(s) in the first 64Ki samples, {} busy column(s)",
            channel,
            first_edge,
            rising,
            view.toggles.len()
        );
    }

    let metrics = ended.unwrap_or_else(|| snapshot.metrics());
    println!("written samples: {}", written);
    println!("discarded samples: {}", snapshot.discarded_samples());
    println!("{}", serde_json::to_string_pretty(&metrics)?);
    Ok(())
}
