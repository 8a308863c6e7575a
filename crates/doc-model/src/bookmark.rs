use crate::absolute_path;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Jump-to-page markers for one file. Page 1 is implicit and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    file_path: PathBuf,
    pages: Vec<u32>,
}

impl Bookmark {
    pub fn new(file_path: impl AsRef<Path>) -> Self {
        Self { file_path: absolute_path(file_path), pages: Vec::new() }
    }

    pub fn with_pages(file_path: impl AsRef<Path>, pages: impl IntoIterator<Item = u32>) -> Self {
        let mut bookmark = Self::new(file_path);
        for page in pages {
            bookmark.add_page(page);
        }
        bookmark
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn pages(&self) -> &[u32] {
        &self.pages
    }

    /// Appends `page` unless it is the implicit first page. Repeated pages are
    /// kept.
    pub fn add_page(&mut self, page: u32) -> bool {
        if page == 1 {
            return false;
        }

        self.pages.push(page);
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookmarkChange {
    Created,
    PageAppended,
    Unchanged,
}

/// Bookmarks in menu order with at most one entry per absolute path.
#[derive(Debug, Clone, Default)]
pub struct BookmarkList {
    bookmarks: Vec<Bookmark>,
    by_path: HashMap<PathBuf, usize>,
}

impl BookmarkList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, file_path: impl AsRef<Path>, page: u32) -> BookmarkChange {
        let file_path = absolute_path(file_path);

        if let Some(&index) = self.by_path.get(&file_path) {
            return if self.bookmarks[index].add_page(page) {
                BookmarkChange::PageAppended
            } else {
                BookmarkChange::Unchanged
            };
        }

        let mut bookmark = Bookmark::new(&file_path);
        bookmark.add_page(page);
        self.by_path.insert(file_path, self.bookmarks.len());
        self.bookmarks.push(bookmark);
        BookmarkChange::Created
    }

    /// Inserts a bookmark read back from disk. A second entry for a path that
    /// is already present has its pages merged into the first.
    pub fn insert(&mut self, bookmark: Bookmark) {
        if let Some(&index) = self.by_path.get(bookmark.file_path()) {
            let existing = &mut self.bookmarks[index];
            for page in bookmark.pages {
                existing.add_page(page);
            }
            return;
        }

        self.by_path.insert(bookmark.file_path.clone(), self.bookmarks.len());
        self.bookmarks.push(bookmark);
    }

    pub fn get(&self, file_path: impl AsRef<Path>) -> Option<&Bookmark> {
        let index = *self.by_path.get(&absolute_path(file_path))?;
        self.bookmarks.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bookmark> {
        self.bookmarks.iter()
    }

    pub fn as_slice(&self) -> &[Bookmark] {
        &self.bookmarks
    }

    pub fn len(&self) -> usize {
        self.bookmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookmarks.is_empty()
    }

    pub fn remove_all(&mut self) {
        self.bookmarks.clear();
        self.by_path.clear();
    }
}

impl FromIterator<Bookmark> for BookmarkList {
    fn from_iter<I: IntoIterator<Item = Bookmark>>(iter: I) -> Self {
        let mut list = Self::new();
        for bookmark in iter {
            list.insert(bookmark);
        }
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_add_for_same_path_appends_page() {
        let mut list = BookmarkList::new();

        assert_eq!(list.add("/a.pdf", 5), BookmarkChange::Created);
        assert_eq!(list.add("/a.pdf", 9), BookmarkChange::PageAppended);

        assert_eq!(list.len(), 1);
        assert_eq!(list.get("/a.pdf").map(Bookmark::pages), Some(&[5, 9][..]));
    }

    #[test]
    fn first_page_is_never_recorded() {
        let mut list = BookmarkList::new();

        assert_eq!(list.add("/b.pdf", 1), BookmarkChange::Created);
        assert_eq!(list.add("/b.pdf", 1), BookmarkChange::Unchanged);

        let bookmark = list.get("/b.pdf").expect("bookmark should exist");
        assert!(bookmark.pages().is_empty());
    }

    #[test]
    fn repeated_pages_are_appended_again() {
        let mut list = BookmarkList::new();
        list.add("/c.pdf", 3);
        list.add("/c.pdf", 3);

        assert_eq!(list.get("/c.pdf").map(Bookmark::pages), Some(&[3, 3][..]));
    }

    #[test]
    fn relative_and_absolute_spellings_share_one_bookmark() {
        let mut list = BookmarkList::new();
        let absolute = absolute_path("docs/manual.pdf");

        list.add("docs/manual.pdf", 2);
        assert_eq!(list.add(&absolute, 4), BookmarkChange::PageAppended);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn remove_all_clears_lookup_too() {
        let mut list = BookmarkList::new();
        list.add("/a.pdf", 2);
        list.remove_all();

        assert!(list.is_empty());
        assert!(list.get("/a.pdf").is_none());
        assert_eq!(list.add("/a.pdf", 2), BookmarkChange::Created);
    }

    #[test]
    fn insertion_order_is_preserved() {
        let list: BookmarkList = vec![
            Bookmark::with_pages("/z.pdf", [2]),
            Bookmark::with_pages("/a.pdf", [7, 3]),
            Bookmark::with_pages("/z.pdf", [4]),
        ]
        .into_iter()
        .collect();

        let paths: Vec<_> = list.iter().map(|b| b.file_path().to_path_buf()).collect();
        assert_eq!(paths, vec![PathBuf::from("/z.pdf"), PathBuf::from("/a.pdf")]);
        assert_eq!(list.get("/z.pdf").map(Bookmark::pages), Some(&[2, 4][..]));
        assert_eq!(list.get("/a.pdf").map(Bookmark::pages), Some(&[7, 3][..]));
    }
}
