use std::collections::{HashMap, VecDeque};

use crate::types::UserId;

/// Fixed-capacity FIFO of the most recent records for one subject.
#[derive(Debug, Clone)]
pub struct RollingWindow<T> {
    capacity: usize,
    records: VecDeque<T>,
}

impl<T> RollingWindow<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: VecDeque::with_capacity(capacity),
        }
    }

    /// Appends a record, returning the evicted oldest one once capacity is exceeded.
    pub fn push(&mut self, record: T) -> Option<T> {
        self.records.push_back(record);
        if self.records.len() > self.capacity {
            self.records.pop_front()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&T> {
        self.records.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.records.iter()
    }

    pub fn count_where(&self, predicate: impl Fn(&T) -> bool) -> usize {
        self.records.iter().filter(|r| predicate(r)).count()
    }

    pub fn all(&self, predicate: impl Fn(&T) -> bool) -> bool {
        self.records.iter().all(predicate)
    }
}

#[derive(Debug)]
struct UserEntry<T> {
    window: RollingWindow<T>,
    last_seen: u64,
}

/// One rolling window per user, all sharing the same capacity. At most
/// `max_users` windows are kept; a new user displaces the one pushed to
/// least recently.
#[derive(Debug)]
pub struct UserWindows<T> {
    capacity: usize,
    max_users: usize,
    clock: u64,
    windows: HashMap<UserId, UserEntry<T>>,
    evicted: Option<UserId>,
}

impl<T> UserWindows<T> {
    pub fn new(capacity: usize) -> Self {
        Self::with_max_users(capacity, usize::MAX)
    }

    pub fn with_max_users(capacity: usize, max_users: usize) -> Self {
        Self {
            capacity,
            max_users: max_users.max(1),
            clock: 0,
            windows: HashMap::new(),
            evicted: None,
        }
    }

    pub fn push(&mut self, user_id: &str, record: T) -> &RollingWindow<T> {
        self.clock += 1;
        if !self.windows.contains_key(user_id) && self.windows.len() >= self.max_users {
            self.evict_least_recent();
        }

        let (capacity, clock) = (self.capacity, self.clock);
        let entry = self
            .windows
            .entry(user_id.to_string())
            .or_insert_with(|| UserEntry {
                window: RollingWindow::new(capacity),
                last_seen: clock,
            });
        entry.last_seen = clock;
        entry.window.push(record);
        &entry.window
    }

    fn evict_least_recent(&mut self) {
        let oldest = self
            .windows
            .iter()
            .min_by_key(|(_, entry)| entry.last_seen)
            .map(|(id, _)| id.clone());
        if let Some(id) = oldest {
            self.windows.remove(&id);
            self.evicted = Some(id);
        }
    }

    /// The user whose window the most recent `push` displaced, if any.
    pub fn take_evicted(&mut self) -> Option<UserId> {
        self.evicted.take()
    }

    pub fn get(&self, user_id: &str) -> Option<&RollingWindow<T>> {
        self.windows.get(user_id).map(|entry| &entry.window)
    }

    pub fn clear(&mut self) {
        self.windows.clear();
        self.evicted = None;
    }

    pub fn user_count(&self) -> usize {
        self.windows.len()
    }

    pub fn max_users(&self) -> usize {
        self.max_users
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest_first() {
        let mut window = RollingWindow::new(3);
        assert_eq!(window.push(1), None);
        assert_eq!(window.push(2), None);
        assert_eq!(window.push(3), None);
        assert!(window.is_full());

        assert_eq!(window.push(4), Some(1));
        assert_eq!(window.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(window.len(), 3);
        assert_eq!(window.latest(), Some(&4));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut window = RollingWindow::new(0);
        window.push("a");
        window.push("b");
        assert_eq!(window.capacity(), 1);
        assert_eq!(window.latest(), Some(&"b"));
    }

    #[test]
    fn test_predicates() {
        let mut window = RollingWindow::new(4);
        for v in [0.05, 0.02, 0.5] {
            window.push(v);
        }
        assert_eq!(window.count_where(|v| *v < 0.1), 2);
        assert!(!window.all(|v| *v < 0.1));
    }

    #[test]
    fn test_windows_are_per_user() {
        let mut windows = UserWindows::new(2);
        windows.push("alice", 1);
        windows.push("alice", 2);
        windows.push("alice", 3);
        windows.push("bob", 10);

        assert_eq!(windows.user_count(), 2);
        assert_eq!(
            windows.get("alice").unwrap().iter().copied().collect::<Vec<_>>(),
            vec![2, 3]
        );
        assert_eq!(windows.get("bob").unwrap().len(), 1);
        assert!(windows.get("carol").is_none());
    }

    #[test]
    fn test_least_recent_user_is_displaced() {
        let mut windows = UserWindows::with_max_users(3, 2);
        windows.push("alice", 1);
        windows.push("bob", 2);
        windows.push("alice", 3);
        assert_eq!(windows.take_evicted(), None);

        // bob was seen least recently.
        windows.push("carol", 4);
        assert_eq!(windows.take_evicted(), Some("bob".to_string()));
        assert_eq!(windows.take_evicted(), None);
        assert_eq!(windows.user_count(), 2);
        assert!(windows.get("bob").is_none());
        assert_eq!(windows.get("alice").unwrap().len(), 2);

        for i in 0..100 {
            windows.push(&format!("visitor_{i}"), i);
        }
        assert_eq!(windows.user_count(), 2);
        assert!(windows.get("visitor_99").is_some());
    }
}
