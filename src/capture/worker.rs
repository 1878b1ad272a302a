//! Capture worker thread implementation
//!
//! The worker owns the writing side of a [`LogicSnapshot`]. It blocks on the
//! command queue with a short timeout so a cleared running flag is noticed
//! even when no commands arrive.
//!
//! # Responsibilities
//!
//! - **Run lifecycle**: `Start` initializes the snapshot, `End` finalizes it
//! - **Ingest**: every `Payload` is appended as it arrives
//! - **Progress**: reports written/discarded counters after each chunk
//! - **Errors**: failed commands are reported as events, the worker keeps running

use super::{CaptureCommand, CaptureEvent};
use crate::store::LogicSnapshot;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How long the worker waits for a command before re-checking its running flag
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Main capture worker
pub struct CaptureWorker {
    snapshot: Arc<LogicSnapshot>,
    command_rx: Receiver<CaptureCommand>,
    event_tx: Sender<CaptureEvent>,
    running: Arc<AtomicBool>,
    /// Chunks appended in the current run
    chunks: u64,
}

impl CaptureWorker {
    pub fn new(
        snapshot: Arc<LogicSnapshot>,
        command_rx: Receiver<CaptureCommand>,
        event_tx: Sender<CaptureEvent>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            snapshot,
            command_rx,
            event_tx,
            running,
            chunks: 0,
        }
    }

    /// Run the main worker loop
    pub fn run(&mut self) {
        tracing::info!("Capture worker started");

        while self.running.load(Ordering::SeqCst) {
            match self.command_rx.recv_timeout(POLL_INTERVAL) {
                Ok(command) => self.handle_command(command),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    self.running.store(false, Ordering::SeqCst);
                }
            }
        }

        let _ = self.event_tx.send(CaptureEvent::Shutdown);
        tracing::info!("Capture worker stopped");
    }

    /// Handle a single command
    fn handle_command(&mut self, command: CaptureCommand) {
        match command {
            CaptureCommand::Start(config) => {
                self.chunks = 0;
                match self.snapshot.first_payload(&config) {
                    Ok(()) => self.send(CaptureEvent::Started {
                        channels: config.channel_count(),
                        total_samples: config.total_samples,
                    }),
                    Err(e) => self.report(format!("Failed to start capture: {}", e)),
                }
            }
            CaptureCommand::Payload(data) => match self.snapshot.append_payload(&data) {
                Ok(()) => {
                    self.chunks += 1;
                    self.progress();
                }
                Err(e) => self.report(format!("Failed to append payload: {}", e)),
            },
            CaptureCommand::End => match self.snapshot.capture_ended() {
                Ok(()) => {
                    tracing::debug!("Capture finished after {} chunk(s)", self.chunks);
                    self.send(CaptureEvent::Ended {
                        written_samples: self.snapshot.written_samples(),
                        metrics: self.snapshot.metrics(),
                    });
                }
                Err(e) => self.report(format!("Failed to end capture: {}", e)),
            },
            CaptureCommand::Shutdown => {
                self.running.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Report counters; skipped when the caller is not keeping up
    fn progress(&self) {
        let event = CaptureEvent::Progress {
            written_samples: self.snapshot.written_samples(),
            discarded_samples: self.snapshot.discarded_samples(),
        };
        match self.event_tx.try_send(event) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => {
                tracing::trace!("Event receiver gone, progress not delivered");
            }
        }
    }

    fn report(&self, message: String) {
        tracing::warn!("{}", message);
        self.send(CaptureEvent::Error(message));
    }

    fn send(&self, event: CaptureEvent) {
        let _ = self.event_tx.send(event);
    }
}
