//! Capture thread feeding a [`LogicSnapshot`]
//!
//! Acquisition data arrives on a producer thread. This module runs that thread
//! and talks to it over crossbeam channels, so the caller (a UI or a replay
//! tool) never blocks on ingest.
//!
//! # Architecture
//!
//! - [`CaptureCommand`] - Messages sent to the worker (start, payload, end)
//! - [`CaptureEvent`] - Messages sent back (progress, end of capture, errors)
//! - [`CaptureHandle`] - Caller-side handle for sending commands and receiving events
//! - [`CaptureSession`] - Owns the worker side and spawns the thread
//! - [`encode`] - Builds acquisition byte streams from synthetic signals
//!
//! # Example
//!
//! ```ignore
//! use logicstore_rs::capture::CaptureSession;
//! use logicstore_rs::store::LogicSnapshot;
//!
//! let snapshot = Arc::new(LogicSnapshot::new());
//! let (thread, handle) = CaptureSession::spawn(Arc::clone(&snapshot))?;
//!
//! handle.start(config);
//! for chunk in chunks {
//!     handle.payload(chunk);
//! }
//! handle.end();
//! handle.shutdown();
//! thread.join().ok();
//! ```

pub mod encode;
pub mod worker;

pub use worker::CaptureWorker;

use crate::config::CaptureConfig;
use crate::error::{Result, ResultExt, StoreError};
use crate::store::LogicSnapshot;
use crate::types::StoreMetrics;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Commands sent to the capture worker
#[derive(Debug, Clone)]
pub enum CaptureCommand {
    /// Start a new run with this geometry
    Start(CaptureConfig),
    /// Next chunk of the acquisition byte stream
    Payload(Vec<u8>),
    /// The device finished the run
    End,
    /// Stop the worker thread
    Shutdown,
}

/// Events reported by the capture worker
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// A run was initialized
    Started {
        channels: usize,
        total_samples: u64,
    },
    /// Samples were appended
    Progress {
        written_samples: u64,
        discarded_samples: u64,
    },
    /// The run was finalized
    Ended {
        written_samples: u64,
        metrics: StoreMetrics,
    },
    /// A command failed; the worker keeps running
    Error(String),
    /// The worker stopped
    Shutdown,
}

/// Caller side of a capture session
#[derive(Debug, Clone)]
pub struct CaptureHandle {
    command_sender: Sender<CaptureCommand>,
    event_receiver: Receiver<CaptureEvent>,
    running: Arc<AtomicBool>,
}

impl CaptureHandle {
    /// Send a command; false when the worker is gone
    pub fn send_command(&self, command: CaptureCommand) -> bool {
        self.command_sender.send(command).is_ok()
    }

    pub fn start(&self, config: CaptureConfig) -> bool {
        self.send_command(CaptureCommand::Start(config))
    }

    pub fn payload(&self, data: Vec<u8>) -> bool {
        self.send_command(CaptureCommand::Payload(data))
    }

    pub fn end(&self) -> bool {
        self.send_command(CaptureCommand::End)
    }

    /// Request shutdown
    pub fn shutdown(&self) {
        let _ = self.command_sender.send(CaptureCommand::Shutdown);
    }

    /// Stop the worker without going through the command queue
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Wait for the next event
    pub fn recv_timeout(&self, timeout: Duration) -> Option<CaptureEvent> {
        match self.event_receiver.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Drain all pending events
    pub fn drain(&self) -> Vec<CaptureEvent> {
        self.event_receiver.try_iter().collect()
    }
}

/// Worker side of a capture session
pub struct CaptureSession {
    snapshot: Arc<LogicSnapshot>,
    command_receiver: Receiver<CaptureCommand>,
    event_sender: Sender<CaptureEvent>,
    running: Arc<AtomicBool>,
}

impl CaptureSession {
    /// Create a session and its caller-side handle
    pub fn new(snapshot: Arc<LogicSnapshot>) -> (Self, CaptureHandle) {
        // payload chunks are large; a short queue keeps memory bounded
        let (cmd_tx, cmd_rx) = bounded(64);
        let (event_tx, event_rx) = bounded(1024);
        let running = Arc::new(AtomicBool::new(true));

        let session = Self {
            snapshot,
            command_receiver: cmd_rx,
            event_sender: event_tx,
            running: Arc::clone(&running),
        };
        let handle = CaptureHandle {
            command_sender: cmd_tx,
            event_receiver: event_rx,
            running,
        };
        (session, handle)
    }

    /// Run the worker loop on the current thread
    pub fn run(self) {
        let mut worker = CaptureWorker::new(
            self.snapshot,
            self.command_receiver,
            self.event_sender,
            self.running,
        );
        worker.run();
    }

    /// Spawn the worker on its own thread
    pub fn spawn(snapshot: Arc<LogicSnapshot>) -> Result<(JoinHandle<()>, CaptureHandle)> {
        let (session, handle) = Self::new(snapshot);
        let thread = std::thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || session.run())
            .map_err(StoreError::from)
            .context("Failed to spawn capture thread")?;
        Ok((thread, handle))
    }

    /// Get a handle to stop the worker
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }
}
