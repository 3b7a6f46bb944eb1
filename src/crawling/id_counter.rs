//! Shared id counter
//!
//! Every worker claims ids from one counter initialised to the range start.
//! `fetch_add` hands out each value exactly once; values past the end are
//! never returned, so the counter cannot wrap into the range again.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::value_objects::StudbookId;

#[derive(Debug)]
pub struct IdCounter {
    next: AtomicU64,
    end: u64,
}

impl IdCounter {
    /// Inclusive range `start..=end`
    #[must_use]
    pub fn new(start: StudbookId, end: StudbookId) -> Self {
        Self {
            next: AtomicU64::new(u64::from(start)),
            end: u64::from(end),
        }
    }

    /// Claim the next unprocessed id, `None` once the range is exhausted
    pub fn claim(&self) -> Option<StudbookId> {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        if id > self.end {
            return None;
        }
        StudbookId::try_from(id).ok()
    }

    /// Ids not yet claimed
    #[must_use]
    pub fn remaining(&self) -> u64 {
        let next = self.next.load(Ordering::Relaxed);
        (self.end + 1).saturating_sub(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    #[test]
    fn claims_inclusive_range_then_stops() {
        let counter = IdCounter::new(5, 7);
        assert_eq!(counter.claim(), Some(5));
        assert_eq!(counter.remaining(), 2);
        assert_eq!(counter.claim(), Some(6));
        assert_eq!(counter.claim(), Some(7));
        assert_eq!(counter.claim(), None);
        assert_eq!(counter.claim(), None);
        assert_eq!(counter.remaining(), 0);
    }

    #[test]
    fn single_id_range() {
        let counter = IdCounter::new(42, 42);
        assert_eq!(counter.claim(), Some(42));
        assert_eq!(counter.claim(), None);
    }

    #[test]
    fn range_ending_at_max_id_does_not_wrap() {
        let counter = IdCounter::new(StudbookId::MAX - 1, StudbookId::MAX);
        assert_eq!(counter.claim(), Some(StudbookId::MAX - 1));
        assert_eq!(counter.claim(), Some(StudbookId::MAX));
        assert_eq!(counter.claim(), None);
    }

    proptest! {
        #[test]
        fn concurrent_claims_cover_range_exactly_once(
            start in 0u32..10_000,
            len in 0u32..400,
            threads in 1usize..8,
        ) {
            let end = start + len;
            let counter = Arc::new(IdCounter::new(start, end));

            let handles: Vec<_> = (0..threads)
                .map(|_| {
                    let counter = Arc::clone(&counter);
                    std::thread::spawn(move || {
                        let mut claimed = Vec::new();
                        while let Some(id) = counter.claim() {
                            claimed.push(id);
                        }
                        claimed
                    })
                })
                .collect();

            let mut all = Vec::new();
            for handle in handles {
                all.extend(handle.join().unwrap());
            }

            let unique: BTreeSet<_> = all.iter().copied().collect();
            prop_assert_eq!(unique.len(), all.len());
            prop_assert_eq!(unique, (start..=end).collect::<BTreeSet<_>>());
        }
    }
}
