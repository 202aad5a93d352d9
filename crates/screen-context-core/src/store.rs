//! Bounded recency buffer of fingerprints.
//!
//! Records are kept in insertion order. Once the store holds more than
//! `capacity` records the oldest are evicted first (FIFO); a match does not
//! refresh a record's position. An optional age bound drops records older
//! than `max_age` relative to the newest insert or an explicit clock read.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::models::{Fingerprint, HashRecord};

#[derive(Debug, Clone)]
pub struct HashStore {
    records: VecDeque<HashRecord>,
    capacity: usize,
    max_age: Option<Duration>,
}

impl HashStore {
    pub fn new(capacity: usize, max_age: Option<Duration>) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
            max_age,
        }
    }

    /// Append a record, then evict by capacity and age.
    pub fn insert(&mut self, record: HashRecord) {
        let now = record.timestamp;
        self.records.push_back(record);
        self.evict_over_capacity();
        self.prune_expired(now);
    }

    /// Closest retained record by Hamming distance, or `None` when the store
    /// is empty. Ties go to the most recently inserted record.
    pub fn nearest(&self, fingerprint: &Fingerprint) -> Option<(u32, &HashRecord)> {
        let mut best: Option<(u32, &HashRecord)> = None;
        for record in self.records.iter().rev() {
            let distance = record.fingerprint.hamming_distance(*fingerprint);
            match best {
                Some((d, _)) if d <= distance => {}
                _ => best = Some((distance, record)),
            }
            if distance == 0 {
                break;
            }
        }
        best
    }

    /// Drop records older than `now - max_age`. Returns how many were removed.
    pub fn prune_expired(&mut self, now: DateTime<Utc>) -> usize {
        let Some(max_age) = self.max_age else {
            return 0;
        };
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return 0;
        };
        let cutoff = now - max_age;
        let before = self.records.len();
        while self
            .records
            .front()
            .is_some_and(|oldest| oldest.timestamp < cutoff)
        {
            self.records.pop_front();
        }
        before - self.records.len()
    }

    /// Change the capacity; shrinking evicts the oldest records immediately.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.evict_over_capacity();
    }

    pub fn set_max_age(&mut self, max_age: Option<Duration>) {
        self.max_age = max_age;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Retained records, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &HashRecord> {
        self.records.iter()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    fn evict_over_capacity(&mut self) {
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn record(bits: u64, secs: i64, id: i64) -> HashRecord {
        HashRecord::new(Fingerprint(bits), at(secs), Some(id))
    }

    #[test]
    fn test_nearest_on_empty_store() {
        let store = HashStore::new(10, None);
        assert!(store.nearest(&Fingerprint(42)).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_nearest_returns_minimum_distance() {
        let mut store = HashStore::new(10, None);
        store.insert(record(0b0000, 0, 1));
        store.insert(record(0b1111, 1, 2));
        store.insert(record(0b0111, 2, 3));

        let (distance, rec) = store.nearest(&Fingerprint(0b1110)).unwrap();
        assert_eq!(distance, 1);
        assert_eq!(rec.reference_id, Some(2));
    }

    #[test]
    fn test_nearest_tie_prefers_newest() {
        let mut store = HashStore::new(10, None);
        store.insert(record(0b01, 0, 1));
        store.insert(record(0b10, 1, 2));

        let (distance, rec) = store.nearest(&Fingerprint(0b00)).unwrap();
        assert_eq!(distance, 1);
        assert_eq!(rec.reference_id, Some(2));
    }

    #[test]
    fn test_capacity_overflow_evicts_exactly_the_oldest() {
        let n = 5;
        let mut store = HashStore::new(n, None);
        for i in 0..=n as i64 {
            store.insert(record(1 << i, i, i));
        }
        assert_eq!(store.len(), n);
        let ids: Vec<_> = store.iter().map(|r| r.reference_id.unwrap()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_fifo_scenario_abcd_capacity_three() {
        let (a, b, c, d) = (0x0000_0000_0000_00ff, 0x0000_ff00_0000_0000, 0xff00, 0xff00_0000_0000_0000);
        let mut store = HashStore::new(3, None);
        store.insert(record(a, 0, 1));
        store.insert(record(b, 1, 2));
        store.insert(record(c, 2, 3));
        store.insert(record(d, 3, 4));

        let ids: Vec<_> = store.iter().map(|r| r.reference_id.unwrap()).collect();
        assert_eq!(ids, vec![2, 3, 4]);

        let (distance, rec) = store.nearest(&Fingerprint(a)).unwrap();
        assert_ne!(rec.reference_id, Some(1));
        assert!(distance > 0);
    }

    #[test]
    fn test_match_does_not_promote() {
        let mut store = HashStore::new(2, None);
        store.insert(record(1, 0, 1));
        store.insert(record(2, 1, 2));
        // Query the oldest repeatedly; it must still be evicted first.
        for _ in 0..3 {
            assert_eq!(store.nearest(&Fingerprint(1)).unwrap().0, 0);
        }
        store.insert(record(4, 2, 3));
        assert!(store.iter().all(|r| r.reference_id != Some(1)));
    }

    #[test]
    fn test_shrinking_capacity_evicts_oldest() {
        let mut store = HashStore::new(4, None);
        for i in 0..4 {
            store.insert(record(1 << i, i, i));
        }
        store.set_capacity(2);
        assert_eq!(store.capacity(), 2);
        let ids: Vec<_> = store.iter().map(|r| r.reference_id.unwrap()).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn test_age_bound_drops_stale_records() {
        let mut store = HashStore::new(10, Some(Duration::from_secs(60)));
        store.insert(record(1, 0, 1));
        store.insert(record(2, 30, 2));
        store.insert(record(4, 90, 3));

        let ids: Vec<_> = store.iter().map(|r| r.reference_id.unwrap()).collect();
        assert_eq!(ids, vec![2, 3]);

        assert_eq!(store.prune_expired(at(200)), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_prune_without_age_bound_is_noop() {
        let mut store = HashStore::new(10, None);
        store.insert(record(1, 0, 1));
        assert_eq!(store.prune_expired(at(1_000_000)), 0);
        assert_eq!(store.len(), 1);
    }
}
