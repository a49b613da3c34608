//! Frame summary store
//!
//! Keeps one [`FrameSummary`] per arbitration ID together with four order
//! indices (by ID, count, payload length and last-seen time). The summaries are
//! owned by a single map; each index only holds `(score, sequence, key)` entries
//! pointing back into it, so all four views always agree on the summary behind a
//! key.
//!
//! The number of tracked identifiers is bounded by a runtime-adjustable limit.
//! When a new identifier would push the store past the limit, the identifiers
//! seen least recently are evicted first.
//!
//! Every public operation takes one lock for its whole duration and never does
//! I/O while holding it.

use crate::types::{Frame, FrameSummary, SortKey, Timestamp};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// One entry of an order index
///
/// The sequence number breaks score ties by observation order, which keeps
/// least-recently-seen eviction exact when two frames share a millisecond.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct IndexEntry {
    score: i64,
    sequence: u64,
    key: String,
}

#[derive(Debug)]
struct Tracked {
    summary: Arc<FrameSummary>,
    sequence: u64,
}

impl Tracked {
    fn entry(&self, sort_key: SortKey) -> IndexEntry {
        IndexEntry {
            score: self.summary.score(sort_key),
            sequence: self.sequence,
            key: self.summary.key.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    limit: usize,
    next_sequence: u64,
    summaries: HashMap<String, Tracked>,
    indices: [BTreeSet<IndexEntry>; 4],
}

impl StoreState {
    fn index(&self, sort_key: SortKey) -> &BTreeSet<IndexEntry> {
        &self.indices[sort_key.index()]
    }

    /// Remove `key` from the map and from every index
    fn remove(&mut self, key: &str) -> Option<Tracked> {
        let tracked = self.summaries.remove(key)?;
        for sort_key in SortKey::ALL {
            self.indices[sort_key.index()].remove(&tracked.entry(sort_key));
        }
        Some(tracked)
    }

    /// Insert or replace the summary for its key in the map and every index
    fn upsert(&mut self, summary: Arc<FrameSummary>) {
        self.remove(&summary.key);

        self.next_sequence += 1;
        let tracked = Tracked {
            summary,
            sequence: self.next_sequence,
        };
        for sort_key in SortKey::ALL {
            self.indices[sort_key.index()].insert(tracked.entry(sort_key));
        }
        self.summaries.insert(tracked.summary.key.clone(), tracked);
    }

    /// Least recently seen key other than `keep`
    fn oldest_except(&self, keep: Option<&str>) -> Option<String> {
        self.index(SortKey::LastSeen)
            .iter()
            .find(|entry| Some(entry.key.as_str()) != keep)
            .map(|entry| entry.key.clone())
    }

    /// Evict least recently seen keys (never `keep`) until at most `max_others`
    /// keys besides `keep` remain
    fn evict_down_to(&mut self, max_others: usize, keep: Option<&str>) -> usize {
        let mut evicted = 0;

        loop {
            let others = match keep {
                Some(key) if self.summaries.contains_key(key) => self.summaries.len() - 1,
                _ => self.summaries.len(),
            };
            if others <= max_others {
                break;
            }

            match self.oldest_except(keep) {
                Some(victim) => {
                    log::debug!("Evicting frame summary {}", victim);
                    self.remove(&victim);
                    evicted += 1;
                }
                None => break,
            }
        }

        evicted
    }

    fn clear(&mut self) {
        self.summaries.clear();
        for index in self.indices.iter_mut() {
            index.clear();
        }
    }

    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        SortKey::ALL.iter().all(|sort_key| {
            let index = self.index(*sort_key);
            index.len() == self.summaries.len()
                && index.iter().all(|entry| {
                    self.summaries
                        .get(&entry.key)
                        .map(|tracked| tracked.entry(*sort_key) == *entry)
                        .unwrap_or(false)
                })
        })
    }
}

/// Bounded, multi-index aggregation of observed frames
///
/// Safe to share between an ingestion thread and a presentation thread.
#[derive(Debug)]
pub struct FrameSummaryStore {
    state: Mutex<StoreState>,
}

impl FrameSummaryStore {
    /// Create an empty store tracking at most `limit` identifiers
    pub fn new(limit: i64) -> Self {
        Self {
            state: Mutex::new(StoreState {
                limit: clamp_limit(limit),
                ..StoreState::default()
            }),
        }
    }

    /// Record a frame observed now
    ///
    /// Returns the summary now held for the frame's identifier, or `None` when
    /// the limit is zero and nothing is tracked.
    pub fn observe(&self, frame: impl Into<Arc<Frame>>) -> Option<Arc<FrameSummary>> {
        self.observe_at(frame, Utc::now())
    }

    /// Record a frame observed at `seen_at`
    pub fn observe_at(
        &self,
        frame: impl Into<Arc<Frame>>,
        seen_at: Timestamp,
    ) -> Option<Arc<FrameSummary>> {
        let frame = frame.into();
        let key = frame.key();

        let mut state = self.state.lock();

        let existing = state.summaries.get(&key).map(|tracked| Arc::clone(&tracked.summary));
        let summary = Arc::new(FrameSummary::advance(existing.as_deref(), frame, seen_at));

        if state.limit == 0 {
            // No room at all, not even for this identifier
            let evicted = state.evict_down_to(0, None);
            if evicted > 0 {
                log::debug!("Limit is zero, dropped {} frame summaries", evicted);
            }
            log::trace!("Not tracking frame {}: limit is zero", key);
            return None;
        }

        // This key occupies one slot; everything else must fit in the rest.
        let max_others = state.limit - 1;
        state.evict_down_to(max_others, Some(&key));
        state.upsert(Arc::clone(&summary));

        log::trace!("Observed frame {} (count {})", key, summary.count);
        Some(summary)
    }

    /// Snapshot of all tracked summaries ordered by `sort_key`
    ///
    /// Ascending by score, or descending when `reverse` is set.
    pub fn query(&self, sort_key: SortKey, reverse: bool) -> Vec<Arc<FrameSummary>> {
        let state = self.state.lock();
        let index = state.index(sort_key);

        let lookup = |entry: &IndexEntry| {
            state
                .summaries
                .get(&entry.key)
                .map(|tracked| Arc::clone(&tracked.summary))
        };

        if reverse {
            index.iter().rev().filter_map(lookup).collect()
        } else {
            index.iter().filter_map(lookup).collect()
        }
    }

    /// Snapshot ordered by a sort key given by name
    ///
    /// An unknown name yields an empty snapshot instead of an error.
    pub fn query_by_name(&self, sort_key: &str, reverse: bool) -> Vec<Arc<FrameSummary>> {
        match sort_key.parse::<SortKey>() {
            Ok(sort_key) => self.query(sort_key, reverse),
            Err(e) => {
                log::debug!("{}; returning empty snapshot", e);
                Vec::new()
            }
        }
    }

    /// Current summary for a canonical key
    pub fn get(&self, key: &str) -> Option<Arc<FrameSummary>> {
        self.state
            .lock()
            .summaries
            .get(key)
            .map(|tracked| Arc::clone(&tracked.summary))
    }

    /// Drop every tracked summary
    pub fn clear(&self) {
        self.state.lock().clear();
        log::info!("Frame summaries cleared");
    }

    /// Number of identifiers currently tracked
    pub fn len(&self) -> usize {
        self.state.lock().summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current identifier limit
    pub fn limit(&self) -> i64 {
        i64::try_from(self.state.lock().limit).unwrap_or(i64::MAX)
    }

    /// Change the identifier limit, trimming right away if it shrank
    ///
    /// Values at or below zero mean nothing is tracked at all.
    pub fn set_limit(&self, limit: i64) {
        let mut state = self.state.lock();
        state.limit = clamp_limit(limit);

        let limit = state.limit;
        let evicted = state.evict_down_to(limit, None);
        log::info!("Frame summary limit set to {} ({} evicted)", limit, evicted);
    }

    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        self.state.lock().is_consistent()
    }
}

impl Default for FrameSummaryStore {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_FRAME_SUMMARY_LIMIT)
    }
}

/// Saturating conversion; anything at or below zero becomes zero
fn clamp_limit(limit: i64) -> usize {
    usize::try_from(limit).unwrap_or(if limit > 0 { usize::MAX } else { 0 })
}
