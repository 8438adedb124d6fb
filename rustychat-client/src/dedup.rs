//! Bounded recency window over inbound event ids.
//!
//! The push transport is at-least-once: after a reconnect the same event can
//! be redelivered, and a reconnection storm would otherwise duplicate
//! messages and double-increment thread counters. The window remembers
//! recently applied event ids and rejects repeats. Eviction happens on
//! insert only — no timers, no background work.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tracing::debug;

/// Event classes carry different redelivery windows: creations are worth
/// guarding longer than patches, which a refetch corrects anyway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    Creation,
    Mutation,
}

/// Bounded set of recently applied event ids.
#[derive(Debug)]
pub struct DedupWindow {
    capacity: usize,
    creation_ttl: Duration,
    mutation_ttl: Duration,
    expires: HashMap<String, Instant>,
    order: VecDeque<String>,
}

impl DedupWindow {
    #[must_use]
    pub fn new(capacity: usize, creation_ttl: Duration, mutation_ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            creation_ttl,
            mutation_ttl,
            expires: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// True exactly when `event_id` has not been seen within its window; the
    /// id is recorded as a side effect.
    pub fn should_apply(&mut self, event_id: &str, class: EventClass) -> bool {
        self.should_apply_at(event_id, class, Instant::now())
    }

    fn should_apply_at(&mut self, event_id: &str, class: EventClass, now: Instant) -> bool {
        self.evict(now);

        if let Some(deadline) = self.expires.get(event_id)
            && *deadline > now
        {
            debug!(event_id, "suppressing redelivered event");
            return false;
        }

        let ttl = match class {
            EventClass::Creation => self.creation_ttl,
            EventClass::Mutation => self.mutation_ttl,
        };
        if self.expires.insert(event_id.to_string(), now + ttl).is_none() {
            self.order.push_back(event_id.to_string());
        }
        true
    }

    fn evict(&mut self, now: Instant) {
        while self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.expires.remove(&oldest);
            }
        }
        self.order.retain(|id| {
            let live = self.expires.get(id).is_some_and(|deadline| *deadline > now);
            if !live {
                self.expires.remove(id);
            }
            live
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> DedupWindow {
        DedupWindow::new(4, Duration::from_secs(30), Duration::from_secs(5))
    }

    #[test]
    fn first_sight_applies_repeat_does_not() {
        let mut dedup = window();
        let now = Instant::now();

        assert!(dedup.should_apply_at("evt-1", EventClass::Creation, now));
        assert!(!dedup.should_apply_at("evt-1", EventClass::Creation, now));
        assert!(dedup.should_apply_at("evt-2", EventClass::Creation, now));
    }

    #[test]
    fn entries_expire_by_class_ttl() {
        let mut dedup = window();
        let start = Instant::now();

        assert!(dedup.should_apply_at("create", EventClass::Creation, start));
        assert!(dedup.should_apply_at("patch", EventClass::Mutation, start));

        let later = start + Duration::from_secs(6);
        // The mutation window has lapsed; the creation window has not.
        assert!(dedup.should_apply_at("patch", EventClass::Mutation, later));
        assert!(!dedup.should_apply_at("create", EventClass::Creation, later));

        let much_later = start + Duration::from_secs(31);
        assert!(dedup.should_apply_at("create", EventClass::Creation, much_later));
    }

    #[test]
    fn capacity_trims_oldest_first() {
        let mut dedup = window();
        let now = Instant::now();

        for i in 0..4 {
            assert!(dedup.should_apply_at(&format!("evt-{i}"), EventClass::Creation, now));
        }
        assert_eq!(dedup.len(), 4);

        // Inserting a fifth evicts evt-0, which then applies again.
        assert!(dedup.should_apply_at("evt-4", EventClass::Creation, now));
        assert!(dedup.should_apply_at("evt-0", EventClass::Creation, now));
        assert!(!dedup.should_apply_at("evt-4", EventClass::Creation, now));
    }

    #[test]
    fn eviction_runs_on_insert_not_on_lookup() {
        let mut dedup = window();
        let start = Instant::now();

        dedup.should_apply_at("evt-1", EventClass::Mutation, start);
        assert_eq!(dedup.len(), 1);

        // Next insert after the TTL sweeps the stale entry out.
        dedup.should_apply_at("evt-2", EventClass::Mutation, start + Duration::from_secs(6));
        assert_eq!(dedup.len(), 1);
    }
}
