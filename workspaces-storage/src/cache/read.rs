//! Point reads carrying entry provenance.
//!
//! Every mirror read is served from memory. Callers that care about
//! freshness get the time the entry was derived, its per-entry generation
//! and the cache watermark the read observed.

use chrono::{DateTime, Utc};
use std::time::Duration;

use super::watermark::Watermark;

#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    derived_at: DateTime<Utc>,
    generation: u64,
    watermark: Watermark,
}

impl<T> CacheRead<T> {
    pub fn new(value: T, derived_at: DateTime<Utc>, generation: u64, watermark: Watermark) -> Self {
        CacheRead {
            value,
            derived_at,
            generation,
            watermark,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    /// When the entry was last rebuilt from its source.
    pub fn derived_at(&self) -> DateTime<Utc> {
        self.derived_at
    }

    /// Bumped each time the entry is replaced; starts at 1.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn watermark(&self) -> &Watermark {
        &self.watermark
    }

    /// Wall-clock age of the entry, zero if the clock moved backwards.
    pub fn age(&self) -> Duration {
        (Utc::now() - self.derived_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Whether the entry was replaced after a read that saw `generation`.
    pub fn changed_since(&self, generation: u64) -> bool {
        self.generation > generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_exposes_provenance() {
        let derived_at = Utc::now();
        let read = CacheRead::new("sp1", derived_at, 3, Watermark::new(7));
        assert_eq!(*read.value(), "sp1");
        assert_eq!(read.generation(), 3);
        assert_eq!(read.watermark().sequence, 7);
        assert_eq!(read.derived_at(), derived_at);
        assert!(read.changed_since(2));
        assert!(!read.changed_since(3));
    }

    #[test]
    fn test_age_of_old_entry() {
        let read = CacheRead::new((), Utc::now() - chrono::Duration::seconds(30), 1, Watermark::zero());
        assert!(read.age() >= Duration::from_secs(29));
    }

    #[test]
    fn test_age_is_zero_for_future_entry() {
        let read = CacheRead::new((), Utc::now() + chrono::Duration::seconds(30), 1, Watermark::zero());
        assert_eq!(read.age(), Duration::ZERO);
    }
}
