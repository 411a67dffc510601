use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

/// A bounded `key -> value` map with FIFO eviction, used by the OpenAI
/// Responses adapter to map `response_id -> session_id` so that a later
/// request's `previous_response_id` can continue the session without
/// resending history. Capacity default is 10,000 entries.
pub struct FifoCache<K, V> {
    capacity: usize,
    order: VecDeque<K>,
    map: HashMap<K, V>,
}

impl<K: Eq + Hash + Clone, V> FifoCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            map: HashMap::new(),
        }
    }

    pub fn insert(&mut self, key: K, value: V) {
        if !self.map.contains_key(&key) {
            self.order.push_back(key.clone());
        }
        self.map.insert(key, value);
        while self.map.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.map.remove(&oldest);
            } else {
                break;
            }
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.map.get(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_return_inserted_values() {
        let mut cache: FifoCache<String, String> = FifoCache::new(2);
        cache.insert("resp-1".to_string(), "session-1".to_string());
        assert_eq!(cache.get(&"resp-1".to_string()), Some(&"session-1".to_string()));
    }

    #[test]
    fn evicts_oldest_entry_once_over_capacity() {
        let mut cache: FifoCache<u32, u32> = FifoCache::new(2);
        cache.insert(1, 100);
        cache.insert(2, 200);
        cache.insert(3, 300);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some(&200));
        assert_eq!(cache.get(&3), Some(&300));
    }

    #[test]
    fn reinserting_an_existing_key_does_not_grow_order() {
        let mut cache: FifoCache<u32, u32> = FifoCache::new(2);
        cache.insert(1, 1);
        cache.insert(1, 2);
        cache.insert(2, 2);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&1), Some(&2));
    }
}
