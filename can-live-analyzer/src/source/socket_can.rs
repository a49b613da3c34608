//! SocketCAN frame source (Linux only)
//!
//! Reads classic CAN frames from a kernel CAN interface such as `can0` or
//! `vcan0`. The interface must already be up:
//!
//! ```text
//! sudo ip link set can0 up type can bitrate 500000
//! ```
//!
//! Reads use a timeout so that a disconnect request from another thread is
//! noticed within one poll period.

use super::FrameSource;
use crate::types::{AnalyzerError, Frame, Result};
use socketcan::{CanFrame, CanSocket, EmbeddedFrame, Id, Socket};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Frame source bound to a SocketCAN interface
pub struct SocketCanSource {
    device: String,
    socket: CanSocket,
    stopped: AtomicBool,
}

impl SocketCanSource {
    /// Open the named CAN interface
    ///
    /// Fails with [`AnalyzerError::InterfaceNotFound`] if no such interface
    /// exists and with [`AnalyzerError::Connect`] for any other bind failure.
    pub fn open(device: &str, read_timeout: Duration) -> Result<Self> {
        log::info!("Opening CAN interface: {}", device);

        let socket = CanSocket::open(device).map_err(|e| open_error(device, e))?;
        socket
            .set_read_timeout(read_timeout)
            .map_err(|e| AnalyzerError::Connect(format!("{}: {}", device, e)))?;

        log::info!("CAN interface opened successfully: {}", device);

        Ok(Self {
            device: device.to_string(),
            socket,
            stopped: AtomicBool::new(false),
        })
    }
}

impl FrameSource for SocketCanSource {
    fn name(&self) -> &str {
        &self.device
    }

    fn connect_and_publish(&self, handler: &mut dyn FnMut(Frame)) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(AnalyzerError::Disconnected);
        }

        log::debug!("Reading frames from {}", self.device);

        while !self.stopped.load(Ordering::SeqCst) {
            match self.socket.read_frame() {
                Ok(CanFrame::Data(frame)) => {
                    let id = match frame.id() {
                        Id::Standard(id) => u32::from(id.as_raw()),
                        Id::Extended(id) => id.as_raw(),
                    };
                    match Frame::new(id, frame.data()) {
                        Ok(frame) => handler(frame),
                        Err(e) => log::warn!("Skipping frame from {}: {}", self.device, e),
                    }
                }
                Ok(CanFrame::Remote(_)) => log::trace!("Skipping remote frame on {}", self.device),
                Ok(CanFrame::Error(_)) => log::trace!("Skipping error frame on {}", self.device),
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    continue;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(AnalyzerError::Io(e)),
            }
        }

        log::debug!("Stopped reading frames from {}", self.device);
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            log::debug!("Disconnecting from {}", self.device);
        }
        Ok(())
    }
}

fn open_error(device: &str, e: io::Error) -> AnalyzerError {
    if e.kind() == io::ErrorKind::NotFound || e.raw_os_error() == Some(libc::ENODEV) {
        AnalyzerError::InterfaceNotFound(device.to_string())
    } else {
        AnalyzerError::Connect(format!("{}: {}", device, e))
    }
}
