//! Frame sources
//!
//! A frame source is the transport side of the analyzer: it connects to a bus,
//! blocks while delivering every received frame to a handler, and can be told
//! to disconnect from another thread.

use crate::types::{Frame, Result};

pub mod channel;
#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub mod socket_can;

pub use channel::ChannelSource;
#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub use socket_can::SocketCanSource;

/// Common trait for all frame transports
pub trait FrameSource: Send + Sync {
    /// Name of the bus this source is attached to (e.g. `can0`)
    fn name(&self) -> &str;

    /// Deliver frames to `handler` until the source is disconnected
    ///
    /// Blocks for the life of the connection. Returning `Ok(())` means the
    /// stream ended normally.
    fn connect_and_publish(&self, handler: &mut dyn FnMut(Frame)) -> Result<()>;

    /// Ask a running `connect_and_publish` to return
    ///
    /// Idempotent and safe to call from any thread, before, during or after
    /// the connection.
    fn disconnect(&self) -> Result<()>;
}
