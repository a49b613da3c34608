//! CAN Live Analyzer Library
//!
//! Real-time aggregation of CAN bus traffic for reverse-engineering unknown
//! protocols.
//!
//! # Architecture
//!
//! - A [`FrameSource`] delivers frames from a bus (SocketCAN on Linux, or an
//!   in-process channel)
//! - The [`Analyzer`] folds every frame into a [`FrameSummaryStore`] and offers
//!   it to a best-effort live tap
//! - The store keeps one summary per arbitration ID, bounded by a limit, and
//!   hands out snapshots ordered by ID, count, length or last-seen time
//! - [`render()`] formats a summary's payload in one of several numeric domains,
//!   marking bytes that changed since the previous frame
//!
//! Terminal presentation, argument parsing and logging setup live in the
//! application layer (can-live-cli).
//!
//! # Example Usage
//!
//! ```no_run
//! use can_live_analyzer::{
//!     render, Analyzer, AnalyzerConfig, ChannelSource, DisplayMode, Frame, SortKey,
//! };
//! use std::sync::Arc;
//!
//! let (source, sender) = ChannelSource::new("replay");
//! let analyzer = Arc::new(Analyzer::new(Arc::new(source), &AnalyzerConfig::new()));
//!
//! sender.send(Frame::new(0x1A0, &[0x01, 0x02]).unwrap()).unwrap();
//! drop(sender);
//! analyzer.run().unwrap();
//!
//! for summary in analyzer.store().query(SortKey::LastSeen, true) {
//!     println!("{:04X} x{} {}", summary.id(), summary.count, render(&summary, DisplayMode::Raw));
//! }
//! ```

// Public modules
pub mod analyzer;
pub mod config;
pub mod render;
pub mod source;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use analyzer::Analyzer;
pub use config::AnalyzerConfig;
pub use render::{render, render_segments, DisplayMode, RenderedData, Segment};
pub use source::{ChannelSource, FrameSource};
#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub use source::SocketCanSource;
pub use store::FrameSummaryStore;
pub use types::{AnalyzerError, Frame, FrameSummary, Result, SortKey, Timestamp};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        // Smoke test: a default store starts empty with the default limit
        let store = FrameSummaryStore::default();
        assert!(store.is_empty());
        assert_eq!(store.limit(), 20);
    }
}
