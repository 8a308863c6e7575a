use crate::TabRecord;
use std::collections::VecDeque;

pub const DEFAULT_RECENTLY_CLOSED_COUNT: usize = 5;

/// Most-recent-first list of closed tabs, capped at `capacity`.
#[derive(Debug, Clone)]
pub struct RecentlyClosed {
    capacity: usize,
    entries: VecDeque<TabRecord>,
}

impl Default for RecentlyClosed {
    fn default() -> Self {
        Self::new(DEFAULT_RECENTLY_CLOSED_COUNT)
    }
}

impl RecentlyClosed {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, entries: VecDeque::new() }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.entries.truncate(capacity);
    }

    pub fn push(&mut self, record: TabRecord) {
        if self.capacity == 0 {
            return;
        }

        self.entries.push_front(record);
        self.entries.truncate(self.capacity);
    }

    /// Removes and returns the entry at `index` (0 is the most recent).
    pub fn take(&mut self, index: usize) -> Option<TabRecord> {
        self.entries.remove(index)
    }

    pub fn take_most_recent(&mut self) -> Option<TabRecord> {
        self.entries.pop_front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TabRecord> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ViewState;

    fn record(name: &str) -> TabRecord {
        TabRecord::new(format!("/docs/{name}.pdf"), ViewState::default())
    }

    #[test]
    fn newest_entry_comes_first_and_oldest_falls_off() {
        let mut closed = RecentlyClosed::new(2);
        closed.push(record("a"));
        closed.push(record("b"));
        closed.push(record("c"));

        let names: Vec<_> = closed
            .iter()
            .filter_map(|r| r.file_path.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect();
        assert_eq!(names, vec!["c", "b"]);
    }

    #[test]
    fn take_removes_the_entry() {
        let mut closed = RecentlyClosed::default();
        closed.push(record("a"));
        closed.push(record("b"));

        let taken = closed.take(1).expect("entry should exist");
        assert!(taken.file_path.ends_with("a.pdf"));
        assert_eq!(closed.len(), 1);
        assert!(closed.take(5).is_none());
    }

    #[test]
    fn shrinking_capacity_truncates() {
        let mut closed = RecentlyClosed::new(4);
        for name in ["a", "b", "c"] {
            closed.push(record(name));
        }

        closed.set_capacity(1);
        assert_eq!(closed.len(), 1);
        assert!(closed.take_most_recent().is_some_and(|r| r.file_path.ends_with("c.pdf")));
    }

    #[test]
    fn zero_capacity_records_nothing() {
        let mut closed = RecentlyClosed::new(0);
        closed.push(record("a"));
        assert!(closed.is_empty());
    }
}
