/// Ordered tabs with an optional current tab.
///
/// Removing the current tab selects the tab that slides into its place, or
/// the new last tab when the removed one was last.
#[derive(Debug, Clone)]
pub struct TabList<T> {
    tabs: Vec<T>,
    current: Option<usize>,
}

impl<T> Default for TabList<T> {
    fn default() -> Self {
        Self { tabs: Vec::new(), current: None }
    }
}

impl<T> TabList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.tabs.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.tabs.iter_mut()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.tabs.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.tabs.get_mut(index)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current(&self) -> Option<&T> {
        self.tabs.get(self.current?)
    }

    pub fn current_mut(&mut self) -> Option<&mut T> {
        let index = self.current?;
        self.tabs.get_mut(index)
    }

    pub fn position(&self, predicate: impl FnMut(&T) -> bool) -> Option<usize> {
        self.tabs.iter().position(predicate)
    }

    /// Appends `tab`, makes it current and returns its index.
    pub fn push(&mut self, tab: T) -> usize {
        self.tabs.push(tab);
        let index = self.tabs.len() - 1;
        self.current = Some(index);
        index
    }

    pub fn activate(&mut self, index: usize) -> bool {
        if index >= self.tabs.len() {
            return false;
        }

        self.current = Some(index);
        true
    }

    /// Moves to the next tab, wrapping from the last to the first.
    pub fn next(&mut self) -> Option<usize> {
        let current = self.current?;
        let next = if current + 1 < self.tabs.len() { current + 1 } else { 0 };
        self.current = Some(next);
        Some(next)
    }

    /// Moves to the previous tab, wrapping from the first to the last.
    pub fn previous(&mut self) -> Option<usize> {
        let current = self.current?;
        let previous = if current > 0 { current - 1 } else { self.tabs.len() - 1 };
        self.current = Some(previous);
        Some(previous)
    }

    pub fn remove(&mut self, index: usize) -> Option<T> {
        if index >= self.tabs.len() {
            return None;
        }

        let removed = self.tabs.remove(index);

        self.current = match self.current {
            _ if self.tabs.is_empty() => None,
            Some(current) if current > index => Some(current - 1),
            Some(current) if current == index => Some(index.min(self.tabs.len() - 1)),
            other => other,
        };

        Some(removed)
    }

    pub fn remove_all(&mut self) -> Vec<T> {
        self.current = None;
        std::mem::take(&mut self.tabs)
    }

    pub fn move_tab(&mut self, from: usize, to: usize) -> bool {
        if from >= self.tabs.len() || to >= self.tabs.len() {
            return false;
        }

        if from == to {
            return true;
        }

        let tab = self.tabs.remove(from);
        self.tabs.insert(to, tab);

        if self.current == Some(from) {
            self.current = Some(to);
        } else if let Some(current) = self.current {
            // Shift the current index across the gap left by `from`.
            let shifted = if from < current && current <= to {
                current - 1
            } else if to <= current && current < from {
                current + 1
            } else {
                current
            };
            self.current = Some(shifted);
        }

        true
    }
}

impl<'a, T> IntoIterator for &'a TabList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(names: &[&'static str]) -> TabList<&'static str> {
        let mut tabs = TabList::new();
        for name in names {
            tabs.push(*name);
        }
        tabs
    }

    #[test]
    fn push_activates_new_tab() {
        let tabs = list(&["a", "b"]);
        assert_eq!(tabs.current_index(), Some(1));
        assert_eq!(tabs.current(), Some(&"b"));
    }

    #[test]
    fn next_and_previous_wrap_around() {
        let mut tabs = list(&["a", "b", "c"]);

        assert_eq!(tabs.next(), Some(0));
        assert_eq!(tabs.previous(), Some(2));
        assert_eq!(tabs.previous(), Some(1));
    }

    #[test]
    fn removing_current_selects_right_neighbour() {
        let mut tabs = list(&["a", "b", "c"]);
        tabs.activate(1);

        assert_eq!(tabs.remove(1), Some("b"));
        assert_eq!(tabs.current(), Some(&"c"));

        assert_eq!(tabs.remove(1), Some("c"));
        assert_eq!(tabs.current(), Some(&"a"));

        assert_eq!(tabs.remove(0), Some("a"));
        assert_eq!(tabs.current_index(), None);
    }

    #[test]
    fn removing_tab_before_current_keeps_current_tab() {
        let mut tabs = list(&["a", "b", "c"]);

        tabs.remove(0);
        assert_eq!(tabs.current(), Some(&"c"));
    }

    #[test]
    fn move_tab_keeps_current_tab_selected() {
        let mut tabs = list(&["a", "b", "c"]);
        tabs.activate(0);

        assert!(tabs.move_tab(0, 2));
        assert_eq!(tabs.iter().copied().collect::<Vec<_>>(), vec!["b", "c", "a"]);
        assert_eq!(tabs.current(), Some(&"a"));

        tabs.activate(0);
        assert!(tabs.move_tab(2, 0));
        assert_eq!(tabs.current(), Some(&"b"));
        assert!(!tabs.move_tab(0, 3));
    }
}
