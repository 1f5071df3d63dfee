//! Synchronized averaging buffer for push-fed sources.
//!
//! A feed thread pushes samples as they arrive; the probing thread drains
//! them once per tick. Samples sharing a [`Value::key`] are folded into a
//! running average until the next flush.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::Value;

/// Running sum/count for one key. The first sample is kept as the template.
#[derive(Debug)]
struct Accumulator {
    base: Value,
    sum: f64,
    count: u32,
}

impl Accumulator {
    fn new(value: Value) -> Self {
        Self {
            sum: value.value,
            count: 1,
            base: value,
        }
    }

    fn fold(&mut self, value: &Value) {
        self.sum += value.value;
        self.count += 1;
    }

    fn finish(mut self) -> Value {
        self.base.value = self.sum / f64::from(self.count);
        self.base
    }
}

type Items = BTreeMap<String, Accumulator>;

/// Thread-safe value cache.
///
/// Cloning is cheap and yields a handle to the same cache.
#[derive(Debug, Clone, Default)]
pub struct ValueCache {
    items: Arc<Mutex<Items>>,
}

impl ValueCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sample.
    ///
    /// With `average` set, a sample whose key is already cached is folded into
    /// that key's running average; otherwise it replaces the cached entry.
    pub fn add(&self, value: Value, average: bool) {
        self.lock().add(value, average);
    }

    /// Drain the cache, returning one averaged value per key.
    pub fn flush_values(&self) -> Vec<Value> {
        self.lock().flush_values()
    }

    /// Number of distinct keys currently cached.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take the cache lock for a multi-step update.
    ///
    /// The lock is released when the guard is dropped.
    pub fn lock(&self) -> ValueCacheGuard<'_> {
        ValueCacheGuard {
            items: self.items.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Callback that feeds this cache, for registering with a push producer.
    pub fn sink(&self, average: bool) -> impl Fn(Value) + Send + Sync + 'static {
        let cache = self.clone();
        move |value| cache.add(value, average)
    }
}

/// Exclusive access to a [`ValueCache`].
pub struct ValueCacheGuard<'a> {
    items: MutexGuard<'a, Items>,
}

impl ValueCacheGuard<'_> {
    /// Add a sample while holding the lock. See [`ValueCache::add`].
    pub fn add(&mut self, value: Value, average: bool) {
        let key = value.key();
        if average && let Some(existing) = self.items.get_mut(&key) {
            existing.fold(&value);
            return;
        }
        self.items.insert(key, Accumulator::new(value));
    }

    /// Drain while holding the lock. See [`ValueCache::flush_values`].
    pub fn flush_values(&mut self) -> Vec<Value> {
        std::mem::take(&mut *self.items)
            .into_values()
            .map(Accumulator::finish)
            .collect()
    }

    /// Current average for `key`, if cached.
    pub fn average(&self, key: &str) -> Option<f64> {
        self.items
            .get(key)
            .map(|acc| acc.sum / f64::from(acc.count))
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether no keys are cached.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn temp(value: f64) -> Value {
        Value::new(value).with_name("temp").with_labels(["1"])
    }

    #[test]
    fn test_average_and_flush() {
        let cache = ValueCache::new();
        cache.add(temp(10.0), true);
        cache.add(temp(20.0), true);

        let values = cache.flush_values();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].value, 15.0);
        assert_eq!(values[0].key(), "temp|1");

        assert!(cache.flush_values().is_empty());
    }

    #[test]
    fn test_add_without_average_replaces() {
        let cache = ValueCache::new();
        cache.add(temp(10.0), false);
        cache.add(temp(20.0), false);

        let values = cache.flush_values();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].value, 20.0);
    }

    #[test]
    fn test_distinct_keys_kept_apart() {
        let cache = ValueCache::new();
        cache.add(temp(10.0), true);
        cache.add(Value::new(3.0).with_name("temp").with_labels(["2"]), true);
        assert_eq!(cache.len(), 2);

        let values = cache.flush_values();
        assert_eq!(values.len(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_explicit_lock_multi_step() {
        let cache = ValueCache::new();
        {
            let mut guard = cache.lock();
            guard.add(temp(1.0), true);
            guard.add(temp(3.0), true);
            assert_eq!(guard.average("temp|1"), Some(2.0));
            assert_eq!(guard.len(), 1);
        }
        assert_eq!(cache.flush_values()[0].value, 2.0);
    }

    #[test]
    fn test_concurrent_feed() {
        let cache = ValueCache::new();
        let feeders: Vec<_> = (0..4)
            .map(|_| {
                let sink = cache.sink(true);
                thread::spawn(move || {
                    for _ in 0..250 {
                        sink(temp(4.0));
                    }
                })
            })
            .collect();
        for feeder in feeders {
            feeder.join().unwrap();
        }

        let values = cache.flush_values();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].value, 4.0);
    }
}
