//! Caller-owned result cache.
//!
//! Aggregation and scoring never consult a cache. Callers that want
//! memoization wrap calls with [`cached`] and decide eviction themselves.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use chrono::NaiveDate;

use crate::models::DerivedDailyRecord;

/// Content hash of a record batch. Stable within one process only.
pub fn fingerprint(records: &[DerivedDailyRecord]) -> u64 {
    let mut hasher = DefaultHasher::new();
    records.hash(&mut hasher);
    hasher.finish()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub fingerprint: u64,
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Scope plus the kind of result, e.g. `organization/period`.
    pub grouping: String,
}

impl CacheKey {
    pub fn new(fingerprint: u64, start: NaiveDate, end: NaiveDate, grouping: impl Into<String>) -> Self {
        Self {
            fingerprint,
            start,
            end,
            grouping: grouping.into(),
        }
    }
}

pub trait ResultCache<V> {
    fn get(&self, key: &CacheKey) -> Option<V>;
    fn put(&mut self, key: CacheKey, value: V);
    fn clear(&mut self);
}

#[derive(Debug, Clone)]
pub struct MemoryCache<V> {
    entries: HashMap<CacheKey, V>,
    hits: usize,
    misses: usize,
}

impl<V> Default for MemoryCache<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }
}

impl<V> MemoryCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// (hits, misses) recorded by [`cached`].
    pub fn stats(&self) -> (usize, usize) {
        (self.hits, self.misses)
    }
}

impl<V: Clone> ResultCache<V> for MemoryCache<V> {
    fn get(&self, key: &CacheKey) -> Option<V> {
        self.entries.get(key).cloned()
    }

    fn put(&mut self, key: CacheKey, value: V) {
        self.entries.insert(key, value);
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<V: Clone> MemoryCache<V> {
    fn record(&mut self, hit: bool) {
        if hit {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
    }
}

/// Returns the cached value for `key`, computing and storing it on a miss.
pub fn cached<V, C, F>(cache: &mut C, key: CacheKey, compute: F) -> V
where
    V: Clone,
    C: ResultCache<V> + ?Sized,
    F: FnOnce() -> V,
{
    if let Some(value) = cache.get(&key) {
        return value;
    }
    let value = compute();
    cache.put(key, value.clone());
    value
}

/// [`cached`] for a [`MemoryCache`], keeping hit/miss counts.
pub fn cached_counted<V, F>(cache: &mut MemoryCache<V>, key: CacheKey, compute: F) -> V
where
    V: Clone,
    F: FnOnce() -> V,
{
    let hit = cache.entries.contains_key(&key);
    cache.record(hit);
    cached(cache, key, compute)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DayKind;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, d).unwrap()
    }

    fn record(census: i64) -> DerivedDailyRecord {
        DerivedDailyRecord {
            date: date(1),
            ward: "3A".to_string(),
            department: None,
            census_count: census,
            admissions: 0,
            emergency_admissions: 0,
            discharges: 0,
            deaths: 0,
            total_admissions: 0,
            total_discharges: 0,
            patient_days: census,
            day_kind: DayKind::Weekday,
        }
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = vec![record(10)];
        let b = vec![record(10)];
        let c = vec![record(11)];
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_ne!(fingerprint(&a), fingerprint(&c));
    }

    #[test]
    fn computes_once_per_key() {
        let mut cache: MemoryCache<f64> = MemoryCache::new();
        let key = CacheKey::new(7, date(1), date(7), "organization/period");
        let mut calls = 0;
        let first = cached_counted(&mut cache, key.clone(), || {
            calls += 1;
            42.0
        });
        let second = cached_counted(&mut cache, key, || {
            calls += 1;
            0.0
        });
        assert_eq!((first, second), (42.0, 42.0));
        assert_eq!(calls, 1);
        assert_eq!(cache.stats(), (1, 1));
    }

    #[test]
    fn different_window_is_a_miss() {
        let mut cache: MemoryCache<u32> = MemoryCache::new();
        cached(&mut cache, CacheKey::new(1, date(1), date(7), "ward:3A/period"), || 1);
        let other = cached(&mut cache, CacheKey::new(1, date(1), date(8), "ward:3A/period"), || 2);
        assert_eq!(other, 2);
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }
}
