use itertools::Itertools;
use rustc_hash::FxHashMap;

/// A map that issues its own keys. Keys are handed out from a counter and are
/// never reused, even after the value they named has been removed.
#[derive(Debug, Clone)]
pub struct Arena<V> {
    items: FxHashMap<usize, V>,
    next: usize,
}

impl<V> Default for Arena<V> {
    fn default() -> Self {
        Self {
            items: FxHashMap::default(),
            next: 0,
        }
    }
}

impl<V> Arena<V> {
    /// Stores `value` under a fresh key and returns the key.
    pub fn issue(&mut self, value: V) -> usize {
        let key = self.next;
        self.next += 1;
        let previous = self.items.insert(key, value);
        debug_assert!(previous.is_none(), "key {key} was issued twice");
        key
    }

    #[inline]
    pub fn get(&self, key: usize) -> Option<&V> {
        self.items.get(&key)
    }

    #[inline]
    pub fn contains(&self, key: usize) -> bool {
        self.items.contains_key(&key)
    }

    #[inline]
    pub fn remove(&mut self, key: usize) -> Option<V> {
        self.items.remove(&key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Live keys in ascending order.
    pub fn keys(&self) -> Vec<usize> {
        self.items.keys().copied().sorted_unstable().collect_vec()
    }

    /// Live keys whose value satisfies `pred`, in ascending order.
    pub fn keys_where(&self, pred: impl Fn(&V) -> bool) -> Vec<usize> {
        self.items
            .iter()
            .filter(|(_, value)| pred(value))
            .map(|(&key, _)| key)
            .sorted_unstable()
            .collect_vec()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.items.values()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> + '_ {
        self.items.values_mut()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&V) -> bool) {
        self.items.retain(|_, value| keep(value));
    }
}

#[cfg(test)]
mod tests {
    use super::Arena;

    #[test]
    fn test_keys_are_not_reused() {
        let mut arena = Arena::default();
        let a = arena.issue("a");
        let b = arena.issue("b");
        assert_eq!((a, b), (0, 1));
        assert_eq!(arena.remove(b), Some("b"));
        let c = arena.issue("c");
        assert_eq!(c, 2);
        assert_eq!(arena.keys(), vec![0, 2]);
        assert!(!arena.contains(b));
    }

    #[test]
    fn test_keys_where() {
        let mut arena = Arena::default();
        for x in [5, 2, 8, 3] {
            arena.issue(x);
        }
        assert_eq!(arena.keys_where(|&x| x > 2), vec![0, 2, 3]);
        arena.retain(|&x| x % 2 == 0);
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(1), Some(&2));
    }
}
