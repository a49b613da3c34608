//! Ingestion adapter
//!
//! The [`Analyzer`] subscribes to a [`FrameSource`], folds every delivered frame
//! into the shared [`FrameSummaryStore`], and then offers the frame to the live
//! tap. The tap is a rendezvous hand-off: a frame is passed on only if a
//! consumer is already waiting for it, otherwise it is dropped. Ingestion never
//! waits on the tap.

use crate::config::AnalyzerConfig;
use crate::source::FrameSource;
use crate::store::FrameSummaryStore;
use crate::types::{AnalyzerError, Frame, Result};
use flume::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Bridges a frame source into the summary store and the live tap
pub struct Analyzer {
    source: Arc<dyn FrameSource>,
    store: Arc<FrameSummaryStore>,
    tap_tx: Sender<Arc<Frame>>,
    tap_rx: Receiver<Arc<Frame>>,
    running: AtomicBool,
    stopping: AtomicBool,
    /// Held while a frame is being folded into the store
    in_flight: Mutex<()>,
}

impl Analyzer {
    /// Create an analyzer over `source` with a fresh store sized from `config`
    pub fn new(source: Arc<dyn FrameSource>, config: &AnalyzerConfig) -> Self {
        let store = Arc::new(FrameSummaryStore::new(config.frame_summary_limit));
        Self::with_store(source, store)
    }

    /// Create an analyzer feeding an existing store
    pub fn with_store(source: Arc<dyn FrameSource>, store: Arc<FrameSummaryStore>) -> Self {
        let (tap_tx, tap_rx) = flume::bounded(0);

        Self {
            source,
            store,
            tap_tx,
            tap_rx,
            running: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            in_flight: Mutex::new(()),
        }
    }

    /// Shared handle to the summary store
    pub fn store(&self) -> Arc<FrameSummaryStore> {
        Arc::clone(&self.store)
    }

    /// Receiver side of the live tap
    ///
    /// Frames are only handed over while a receiver is blocked waiting; frames
    /// arriving at any other time are not queued.
    pub fn frames(&self) -> Receiver<Arc<Frame>> {
        self.tap_rx.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Consume frames from the source until it disconnects
    ///
    /// Blocks for the life of the connection. A stop racing a read on an
    /// already closed descriptor ends the run normally; every other transport
    /// error is returned.
    pub fn run(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(AnalyzerError::AlreadyRunning);
        }

        log::info!("Analyzer started on {}", self.source.name());
        let result = self
            .source
            .connect_and_publish(&mut |frame| self.handle_frame(frame));
        self.running.store(false, Ordering::SeqCst);

        match result {
            Ok(()) => {
                log::info!("Analyzer on {} stopped", self.source.name());
                Ok(())
            }
            Err(e) if e.is_benign_shutdown() => {
                log::debug!("Analyzer on {} stopped during shutdown: {}", self.source.name(), e);
                Ok(())
            }
            Err(e) => {
                log::error!("Analyzer on {} failed: {}", self.source.name(), e);
                Err(e)
            }
        }
    }

    /// Disconnect the source
    ///
    /// Idempotent. Returns once any frame already being folded into the store
    /// has been fully recorded.
    pub fn stop(&self) -> Result<()> {
        if self.stopping.swap(true, Ordering::SeqCst) {
            log::trace!("Analyzer already stopping");
        } else {
            log::debug!("Stopping analyzer on {}", self.source.name());
        }

        match self.source.disconnect() {
            Ok(()) => {}
            Err(e) if e.is_benign_shutdown() => {
                log::debug!("Ignoring disconnect condition: {}", e);
            }
            Err(e) => return Err(e),
        }

        // Wait out an observation already in progress
        drop(self.in_flight.lock());
        Ok(())
    }

    fn handle_frame(&self, frame: Frame) {
        let frame = Arc::new(frame);

        {
            let _guard = self.in_flight.lock();
            if self.stopping.load(Ordering::SeqCst) {
                log::trace!("Dropping frame {:X} received during shutdown", frame.id());
                return;
            }
            self.store.observe(Arc::clone(&frame));
        }

        match self.tap_tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(frame)) => {
                log::trace!("No tap consumer ready, dropped frame {:X}", frame.id());
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
