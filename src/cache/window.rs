//! Bounded window of recent fragments
//!
//! Late joiners and the HLS playlist only ever see the last few fragments.
//! The window keeps them in arrival order and evicts from the front once it
//! is full. Sequence ids inside the window are contiguous, so lookups are an
//! offset from the oldest entry.

use std::collections::VecDeque;
use std::time::Duration;

use super::fragment::MediaFragment;

/// Fixed-capacity window of the most recent fragments
#[derive(Debug)]
pub struct FragmentWindow {
    /// Maximum number of fragments retained
    capacity: usize,
    /// Retained fragments, oldest first
    fragments: VecDeque<MediaFragment>,
    /// Total payload size in bytes
    size: usize,
}

impl FragmentWindow {
    /// Create a window holding at most `capacity` fragments
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            fragments: VecDeque::with_capacity(capacity + 1),
            size: 0,
        }
    }

    /// Append a fragment, evicting the oldest if the window is full
    ///
    /// Returns the evicted fragment, if any.
    pub fn push(&mut self, fragment: MediaFragment) -> Option<MediaFragment> {
        self.size += fragment.size();
        self.fragments.push_back(fragment);

        if self.fragments.len() > self.capacity {
            let evicted = self.fragments.pop_front()?;
            self.size -= evicted.size();
            Some(evicted)
        } else {
            None
        }
    }

    /// Remove all fragments
    pub fn clear(&mut self) {
        self.fragments.clear();
        self.size = 0;
    }

    /// Look up a fragment by sequence id
    pub fn get(&self, sequence: u64) -> Option<&MediaFragment> {
        let first = self.fragments.front()?.sequence;
        let offset = usize::try_from(sequence.checked_sub(first)?).ok()?;
        self.fragments
            .get(offset)
            .filter(|fragment| fragment.sequence == sequence)
    }

    /// Most recent fragment
    pub fn latest(&self) -> Option<&MediaFragment> {
        self.fragments.back()
    }

    /// Iterate retained fragments, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &MediaFragment> {
        self.fragments.iter()
    }

    /// Sequence id of the oldest retained fragment
    pub fn first_sequence(&self) -> Option<u64> {
        self.fragments.front().map(|f| f.sequence)
    }

    /// Sequence ids currently retained, oldest first
    pub fn sequences(&self) -> Vec<u64> {
        self.fragments.iter().map(|f| f.sequence).collect()
    }

    /// Longest fragment duration in the window
    pub fn max_duration(&self) -> Option<Duration> {
        self.fragments.iter().map(|f| f.duration).max()
    }

    /// Number of retained fragments
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// Whether the window is empty
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Maximum number of retained fragments
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total payload size in bytes
    pub fn size(&self) -> usize {
        self.size
    }
}
