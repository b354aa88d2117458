//! Watermarks marking points in the cache's mutation history.
//!
//! The mirror cache bumps its watermark on every applied change, so two reads
//! carrying the same watermark observed the same cache contents.

use chrono::{DateTime, Utc};

/// A point in the cache's mutation history.
///
/// Sequences are monotonically increasing; comparison between watermarks
/// orders by sequence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Watermark {
    /// Number of mutations applied so far.
    pub sequence: u64,
    /// When this watermark was observed.
    pub observed_at: DateTime<Utc>,
}

impl Watermark {
    pub fn new(sequence: u64) -> Self {
        Self {
            sequence,
            observed_at: Utc::now(),
        }
    }

    /// Create a zero watermark (empty cache).
    pub fn zero() -> Self {
        Self {
            sequence: 0,
            observed_at: DateTime::UNIX_EPOCH,
        }
    }

    /// Watermark one mutation after this one.
    pub fn next(&self) -> Self {
        Self::new(self.sequence + 1)
    }

    pub fn is_newer_than(&self, other: &Watermark) -> bool {
        self.sequence > other.sequence
    }
}

impl Default for Watermark {
    fn default() -> Self {
        Self::zero()
    }
}
