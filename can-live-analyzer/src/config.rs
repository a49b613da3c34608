//! Analyzer configuration types
//!
//! The library only needs a handful of knobs: how many identifiers to track,
//! how often a view should refresh, and how a view starts out sorted. Terminal
//! and CLI concerns are handled by the application layer.

use crate::types::SortKey;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default bound on distinct identifiers kept in memory
pub const DEFAULT_FRAME_SUMMARY_LIMIT: i64 = 20;

/// Default view refresh period in milliseconds
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 100;

/// Configuration for the analyzer library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Maximum number of distinct identifiers to track (<= 0 stops tracking)
    #[serde(default = "default_frame_summary_limit")]
    pub frame_summary_limit: i64,

    /// How often a live view redraws, in milliseconds
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,

    /// Transport poll period used to notice stop requests, in milliseconds
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Sort dimension a view starts with
    #[serde(default = "default_sort")]
    pub default_sort: SortKey,

    /// Whether a view starts in descending order
    #[serde(default = "default_true")]
    pub default_reverse: bool,

    /// Whether changed bytes are highlighted
    #[serde(default = "default_true")]
    pub highlight_changes: bool,
}

fn default_frame_summary_limit() -> i64 {
    DEFAULT_FRAME_SUMMARY_LIMIT
}

fn default_refresh_interval_ms() -> u64 {
    DEFAULT_REFRESH_INTERVAL_MS
}

fn default_read_timeout_ms() -> u64 {
    100
}

fn default_sort() -> SortKey {
    SortKey::LastSeen
}

fn default_true() -> bool {
    true
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            frame_summary_limit: default_frame_summary_limit(),
            refresh_interval_ms: default_refresh_interval_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            default_sort: default_sort(),
            default_reverse: true,
            highlight_changes: true,
        }
    }
}

impl AnalyzerConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the identifier limit
    pub fn with_frame_summary_limit(mut self, limit: i64) -> Self {
        self.frame_summary_limit = limit;
        self
    }

    /// Builder method: set the view refresh interval
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Builder method: set the transport poll period
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Builder method: set the initial sort order
    pub fn with_default_sort(mut self, sort_key: SortKey, reverse: bool) -> Self {
        self.default_sort = sort_key;
        self.default_reverse = reverse;
        self
    }

    /// Builder method: enable or disable change highlighting
    pub fn with_highlight_changes(mut self, enabled: bool) -> Self {
        self.highlight_changes = enabled;
        self
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms.max(1))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(1))
    }
}
