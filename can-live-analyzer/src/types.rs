//! Core types for the live CAN analyzer
//!
//! This module defines the values that flow through the analyzer: raw frames as
//! delivered by a bus transport, the per-identifier summaries kept by the store,
//! the sort dimensions a view can ask for, and the library error type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Timestamp type used throughout the analyzer
pub type Timestamp = DateTime<Utc>;

/// Result type for analyzer operations
pub type Result<T> = std::result::Result<T, AnalyzerError>;

/// Largest arbitration ID representable on the bus (29-bit extended format)
pub const MAX_ARBITRATION_ID: u32 = 0x1FFF_FFFF;

/// Largest payload of a classic CAN frame
pub const MAX_PAYLOAD_LEN: usize = 8;

/// Raw CAN frame as received from the bus
///
/// Frames are immutable once built; the store shares them between the current
/// and previous slot of a summary instead of copying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Frame {
    id: u32,
    length: u8,
    data: Vec<u8>,
}

impl Frame {
    /// Build a frame, checking the ID width and payload size
    pub fn new(id: u32, data: &[u8]) -> Result<Self> {
        if id > MAX_ARBITRATION_ID {
            return Err(AnalyzerError::InvalidFrame(format!(
                "arbitration ID 0x{:X} exceeds 29 bits",
                id
            )));
        }
        if data.len() > MAX_PAYLOAD_LEN {
            return Err(AnalyzerError::InvalidFrame(format!(
                "payload of {} bytes exceeds {} bytes",
                data.len(),
                MAX_PAYLOAD_LEN
            )));
        }

        Ok(Self {
            id,
            length: data.len() as u8,
            data: data.to_vec(),
        })
    }

    /// Arbitration ID (11-bit or 29-bit)
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Data length code - number of payload bytes
    pub fn len(&self) -> usize {
        self.length as usize
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Payload bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Canonical summary key for this frame's identifier (lowercase hex, no prefix)
    pub fn key(&self) -> String {
        format!("{:x}", self.id)
    }
}

/// Aggregated traffic state for one arbitration ID
///
/// A summary is never modified after construction. Every observation of the
/// identifier produces a new summary that carries the old latest frame forward.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSummary {
    /// Canonical key derived from the arbitration ID
    pub key: String,
    /// Number of frames observed for this identifier
    pub count: u64,
    /// Most recent frame
    pub latest_frame: Arc<Frame>,
    /// Frame observed just before `latest_frame`, absent on the first observation
    pub previous_frame: Option<Arc<Frame>>,
    /// Wall-clock time of the most recent observation
    pub last_seen: Timestamp,
}

impl FrameSummary {
    /// Build the summary that follows `existing` once `frame` has been observed
    pub fn advance(existing: Option<&FrameSummary>, frame: Arc<Frame>, seen_at: Timestamp) -> Self {
        let (count, previous_frame) = match existing {
            Some(summary) => (summary.count + 1, Some(Arc::clone(&summary.latest_frame))),
            None => (1, None),
        };

        Self {
            key: frame.key(),
            count,
            latest_frame: frame,
            previous_frame,
            last_seen: seen_at,
        }
    }

    /// Arbitration ID of the summarized identifier
    pub fn id(&self) -> u32 {
        self.latest_frame.id()
    }

    /// Payload length of the latest frame
    pub fn len(&self) -> usize {
        self.latest_frame.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest_frame.is_empty()
    }

    /// Score of this summary in the order index for `sort_key`
    pub fn score(&self, sort_key: SortKey) -> i64 {
        match sort_key {
            SortKey::Id => i64::from(self.id()),
            SortKey::Count => self.count as i64,
            SortKey::Length => self.len() as i64,
            SortKey::LastSeen => self.last_seen.timestamp_millis(),
        }
    }
}

/// Ordering dimension of a summary snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Arbitration ID
    Id,
    /// Number of frames observed
    Count,
    /// Payload length of the latest frame
    Length,
    /// Time of the latest observation
    LastSeen,
}

impl SortKey {
    /// Every sort dimension, in index order
    pub const ALL: [SortKey; 4] = [SortKey::Id, SortKey::Count, SortKey::Length, SortKey::LastSeen];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Id => "id",
            SortKey::Count => "count",
            SortKey::Length => "length",
            SortKey::LastSeen => "lastseen",
        }
    }

    /// Position of this dimension's index inside the store
    pub(crate) fn index(&self) -> usize {
        match self {
            SortKey::Id => 0,
            SortKey::Count => 1,
            SortKey::Length => 2,
            SortKey::LastSeen => 3,
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = AnalyzerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "id" => Ok(SortKey::Id),
            "count" => Ok(SortKey::Count),
            "length" => Ok(SortKey::Length),
            "lastseen" => Ok(SortKey::LastSeen),
            _ => Err(AnalyzerError::InvalidSortKey(s.to_string())),
        }
    }
}

/// Errors that can occur while capturing or presenting bus traffic
#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("CAN interface not found: {0}")]
    InterfaceNotFound(String),

    #[error("Failed to connect to CAN interface: {0}")]
    Connect(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame source disconnected")]
    Disconnected,

    #[error("Analyzer is already running")]
    AlreadyRunning,

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Unknown sort key: {0}")]
    InvalidSortKey(String),

    #[error("Unknown display mode: {0}")]
    InvalidDisplayMode(String),

    #[error("Varint decode failed: {0}")]
    Varint(String),
}

impl AnalyzerError {
    /// True for the conditions that mean "the source was stopped", not "the source failed"
    ///
    /// A read racing a concurrent disconnect can observe the descriptor already
    /// closed (`EBADF`); that is normal termination.
    pub fn is_benign_shutdown(&self) -> bool {
        match self {
            AnalyzerError::Disconnected => true,
            AnalyzerError::Io(e) => e.raw_os_error() == Some(libc::EBADF),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(ms: i64) -> Timestamp {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    #[test]
    fn test_frame_validation() {
        let frame = Frame::new(0x1A0, &[1, 2, 3]).unwrap();
        assert_eq!(frame.id(), 0x1A0);
        assert_eq!(frame.len(), 3);
        assert_eq!(frame.data(), &[1, 2, 3]);
        assert_eq!(frame.key(), "1a0");

        assert!(Frame::new(0x2000_0000, &[]).is_err());
        assert!(Frame::new(0x100, &[0; 9]).is_err());
        assert!(Frame::new(MAX_ARBITRATION_ID, &[0; 8]).is_ok());
    }

    #[test]
    fn test_summary_advance() {
        let first =
            FrameSummary::advance(None, Arc::new(Frame::new(0x10, &[1]).unwrap()), at(1_000));
        assert_eq!(first.count, 1);
        assert!(first.previous_frame.is_none());

        let second = FrameSummary::advance(
            Some(&first),
            Arc::new(Frame::new(0x10, &[2]).unwrap()),
            at(2_000),
        );
        assert_eq!(second.count, 2);
        assert_eq!(second.previous_frame.as_ref().unwrap().data(), &[1]);
        assert_eq!(second.latest_frame.data(), &[2]);
        assert!(Arc::ptr_eq(second.previous_frame.as_ref().unwrap(), &first.latest_frame));
    }

    #[test]
    fn test_summary_scores() {
        let summary = FrameSummary::advance(
            None,
            Arc::new(Frame::new(0x7E8, &[0; 5]).unwrap()),
            at(42_000),
        );
        assert_eq!(summary.score(SortKey::Id), 0x7E8);
        assert_eq!(summary.score(SortKey::Count), 1);
        assert_eq!(summary.score(SortKey::Length), 5);
        assert_eq!(summary.score(SortKey::LastSeen), 42_000);
    }

    #[test]
    fn test_sort_key_names() {
        for key in SortKey::ALL {
            assert_eq!(key.as_str().parse::<SortKey>().unwrap(), key);
        }
        assert_eq!("LastSeen".parse::<SortKey>().unwrap(), SortKey::LastSeen);
        assert!("bogus".parse::<SortKey>().is_err());
    }

    #[test]
    fn test_benign_shutdown_classification() {
        assert!(AnalyzerError::Disconnected.is_benign_shutdown());
        let closed = std::io::Error::from_raw_os_error(libc::EBADF);
        assert!(AnalyzerError::Io(closed).is_benign_shutdown());
        let missing = std::io::Error::from_raw_os_error(libc::ENODEV);
        assert!(!AnalyzerError::Io(missing).is_benign_shutdown());
        assert!(!AnalyzerError::InterfaceNotFound("can9".into()).is_benign_shutdown());
    }
}
