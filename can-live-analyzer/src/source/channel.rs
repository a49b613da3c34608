//! In-process frame source
//!
//! Frames are pushed through a channel sender instead of being read from a bus.
//! Used for replaying captured traffic, for tests, and on platforms without
//! SocketCAN.

use super::FrameSource;
use crate::types::{AnalyzerError, Frame, Result};
use flume::{Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// How often a blocked source re-checks for a disconnect request
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Frame source fed from a channel
pub struct ChannelSource {
    name: String,
    frames: Receiver<Frame>,
    stopped: AtomicBool,
    poll_interval: Duration,
}

impl ChannelSource {
    /// Create a source and the sender that feeds it
    ///
    /// The source ends its stream once every sender has been dropped and the
    /// queued frames have been delivered.
    pub fn new(name: impl Into<String>) -> (Self, Sender<Frame>) {
        let (sender, frames) = flume::unbounded();
        let source = Self {
            name: name.into(),
            frames,
            stopped: AtomicBool::new(false),
            poll_interval: DEFAULT_POLL_INTERVAL,
        };
        (source, sender)
    }

    /// Builder method: set how often a disconnect request is noticed
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl FrameSource for ChannelSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect_and_publish(&self, handler: &mut dyn FnMut(Frame)) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(AnalyzerError::Disconnected);
        }

        log::debug!("Channel source {} connected", self.name);

        while !self.stopped.load(Ordering::SeqCst) {
            match self.frames.recv_timeout(self.poll_interval) {
                Ok(frame) => handler(frame),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    log::debug!("Channel source {} drained", self.name);
                    return Ok(());
                }
            }
        }

        log::debug!("Channel source {} disconnected", self.name);
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}
