//! `tabs.xml` and `bookmarks.xml`.
//!
//! Attributes are read as text and parsed leniently: a malformed number reads
//! as `0`, a malformed flag as `false`. A file that is not well-formed XML is
//! skipped as a whole.

use crate::{PersistOutcome, Storage, StorageError};
use pageturn_model::{Bookmark, BookmarkList, Rotation, ScaleMode, TabRecord, ViewState};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

#[derive(Debug, Default, Serialize, Deserialize)]
struct TabsDocument {
    #[serde(rename = "tab", default)]
    tabs: Vec<TabElement>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TabElement {
    #[serde(rename = "@filePath", default)]
    file_path: String,
    #[serde(rename = "@currentPage", default)]
    current_page: String,
    #[serde(rename = "@continuousMode", default)]
    continuous_mode: String,
    #[serde(rename = "@twoPagesMode", default)]
    two_pages_mode: String,
    #[serde(rename = "@scaleMode", default)]
    scale_mode: String,
    #[serde(rename = "@scaleFactor", default)]
    scale_factor: String,
    #[serde(rename = "@rotation", default)]
    rotation: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct BookmarksDocument {
    #[serde(rename = "bookmark", default)]
    bookmarks: Vec<BookmarkElement>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct BookmarkElement {
    #[serde(rename = "@filePath", default)]
    file_path: String,
    #[serde(rename = "jumpToPage", default)]
    pages: Vec<JumpToPage>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JumpToPage {
    #[serde(rename = "@page", default)]
    page: String,
}

impl From<&TabRecord> for TabElement {
    fn from(record: &TabRecord) -> Self {
        let view = &record.view;
        Self {
            file_path: record.file_path.to_string_lossy().into_owned(),
            current_page: view.current_page.to_string(),
            continuous_mode: flag(view.continuous_mode),
            two_pages_mode: flag(view.two_pages_mode),
            scale_mode: view.scale_mode.as_index().to_string(),
            scale_factor: view.scale_factor.to_string(),
            rotation: view.rotation.as_index().to_string(),
        }
    }
}

impl TabElement {
    fn into_record(self) -> TabRecord {
        let view = ViewState {
            current_page: parse_u32(&self.current_page),
            continuous_mode: parse_flag(&self.continuous_mode),
            two_pages_mode: parse_flag(&self.two_pages_mode),
            scale_mode: ScaleMode::from_index(parse_u32(&self.scale_mode)),
            scale_factor: self.scale_factor.trim().parse().unwrap_or(0.0),
            rotation: Rotation::from_index(parse_u32(&self.rotation)),
        };

        TabRecord::new(self.file_path, view)
    }
}

fn flag(value: bool) -> String {
    u8::from(value).to_string()
}

fn parse_u32(text: &str) -> u32 {
    text.trim().parse().unwrap_or(0)
}

fn parse_flag(text: &str) -> bool {
    text.trim().parse::<i64>().is_ok_and(|value| value != 0)
}

fn xml_error(err: impl std::fmt::Display) -> StorageError {
    StorageError::Xml(err.to_string())
}

fn to_xml<T: Serialize>(root: &str, value: &T) -> Result<String, StorageError> {
    let mut body = String::new();
    let mut serializer =
        quick_xml::se::Serializer::with_root(&mut body, Some(root)).map_err(xml_error)?;
    serializer.indent(' ', 4);
    value.serialize(serializer).map_err(xml_error)?;

    Ok(format!("{XML_DECLARATION}{body}\n"))
}

fn from_xml<T: for<'de> Deserialize<'de> + Default>(path: &Path) -> Result<T, StorageError> {
    if !path.exists() {
        return Ok(T::default());
    }

    let text = fs::read_to_string(path)?;
    quick_xml::de::from_str(&text).map_err(xml_error)
}

impl Storage {
    /// Writes one `<tab>` per record when `enabled`; otherwise deletes any
    /// existing `tabs.xml`.
    pub fn save_tabs(&self, enabled: bool, tabs: &[TabRecord]) -> PersistOutcome<usize> {
        let path = self.tabs_path();
        if !enabled {
            return match Self::remove_file(&path) {
                Ok(()) => PersistOutcome::Disabled,
                Err(err) => PersistOutcome::from_result("remove tabs", Err(err)),
            };
        }

        let document = TabsDocument { tabs: tabs.iter().map(TabElement::from).collect() };
        let result = to_xml("tabs", &document).and_then(|xml| self.write_file(&path, &xml));

        PersistOutcome::from_result("save tabs", result.map(|()| tabs.len()))
    }

    /// Tab records in file order. Records without a path are dropped.
    pub fn load_tabs(&self, enabled: bool) -> PersistOutcome<Vec<TabRecord>> {
        if !enabled {
            return PersistOutcome::Disabled;
        }

        let result = from_xml::<TabsDocument>(&self.tabs_path()).map(|document| {
            document
                .tabs
                .into_iter()
                .filter(|tab| {
                    let keep = !tab.file_path.trim().is_empty();
                    if !keep {
                        tracing::warn!("skipping tab record without a file path");
                    }
                    keep
                })
                .map(TabElement::into_record)
                .collect()
        });

        PersistOutcome::from_result("load tabs", result)
    }

    /// Writes one `<bookmark>` per entry when `enabled`; otherwise deletes any
    /// existing `bookmarks.xml`.
    pub fn save_bookmarks(&self, enabled: bool, bookmarks: &BookmarkList) -> PersistOutcome<usize> {
        let path = self.bookmarks_path();
        if !enabled {
            return match Self::remove_file(&path) {
                Ok(()) => PersistOutcome::Disabled,
                Err(err) => PersistOutcome::from_result("remove bookmarks", Err(err)),
            };
        }

        let document = BookmarksDocument {
            bookmarks: bookmarks
                .iter()
                .map(|bookmark| BookmarkElement {
                    file_path: bookmark.file_path().to_string_lossy().into_owned(),
                    pages: bookmark
                        .pages()
                        .iter()
                        .map(|page| JumpToPage { page: page.to_string() })
                        .collect(),
                })
                .collect(),
        };
        let result = to_xml("bookmarks", &document).and_then(|xml| self.write_file(&path, &xml));

        PersistOutcome::from_result("save bookmarks", result.map(|()| bookmarks.len()))
    }

    pub fn load_bookmarks(&self, enabled: bool) -> PersistOutcome<BookmarkList> {
        if !enabled {
            return PersistOutcome::Disabled;
        }

        let result = from_xml::<BookmarksDocument>(&self.bookmarks_path()).map(|document| {
            document
                .bookmarks
                .into_iter()
                .filter(|bookmark| !bookmark.file_path.trim().is_empty())
                .map(|bookmark| {
                    Bookmark::with_pages(
                        bookmark.file_path,
                        bookmark.pages.iter().map(|jump| parse_u32(&jump.page)),
                    )
                })
                .collect()
        });

        PersistOutcome::from_result("load bookmarks", result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn storage() -> (tempfile::TempDir, Storage) {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let storage = Storage::with_root(temp.path());
        (temp, storage)
    }

    fn record(path: &str, page: u32) -> TabRecord {
        TabRecord::new(
            path,
            ViewState {
                current_page: page,
                continuous_mode: false,
                two_pages_mode: true,
                scale_mode: ScaleMode::FitToPageWidth,
                scale_factor: 1.5,
                rotation: Rotation::RotateBy270,
            },
        )
    }

    #[test]
    fn tabs_round_trip_in_order() {
        let (_temp, storage) = storage();
        let tabs = vec![record("/docs/b.pdf", 4), record("/docs/a.pdf", 12)];

        assert!(matches!(storage.save_tabs(true, &tabs), PersistOutcome::Done(2)));
        let loaded = storage.load_tabs(true).done().expect("tabs should load");

        assert_eq!(loaded, tabs);
    }

    #[test]
    fn tabs_file_uses_documented_attributes() {
        let (_temp, storage) = storage();
        storage.save_tabs(true, &[record("/docs/a.pdf", 3)]);

        let xml = fs::read_to_string(storage.tabs_path()).expect("tabs.xml should exist");
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<tabs>"));
        assert!(xml.contains(r#"filePath="/docs/a.pdf""#));
        assert!(xml.contains(r#"currentPage="3""#));
        assert!(xml.contains(r#"continuousMode="0""#));
        assert!(xml.contains(r#"twoPagesMode="1""#));
        assert!(xml.contains(r#"scaleMode="1""#));
        assert!(xml.contains(r#"scaleFactor="1.5""#));
        assert!(xml.contains(r#"rotation="3""#));
    }

    #[test]
    fn disabled_save_deletes_existing_file_and_load_is_noop() {
        let (_temp, storage) = storage();
        storage.save_tabs(true, &[record("/docs/a.pdf", 3)]);
        assert!(storage.tabs_path().exists());

        assert!(storage.save_tabs(false, &[record("/docs/a.pdf", 3)]).is_disabled());
        assert!(!storage.tabs_path().exists());
        assert!(storage.load_tabs(false).is_disabled());

        // Nothing to delete is fine too.
        assert!(storage.save_tabs(false, &[]).is_disabled());
    }

    #[test]
    fn missing_file_restores_nothing() {
        let (_temp, storage) = storage();

        assert_eq!(storage.load_tabs(true).done(), Some(Vec::new()));
        assert!(storage.load_bookmarks(true).done().is_some_and(|list| list.is_empty()));
    }

    #[test]
    fn malformed_attributes_read_as_zero() {
        let (_temp, storage) = storage();
        fs::write(
            storage.tabs_path(),
            r#"<tabs>
    <tab filePath="/docs/a.pdf" currentPage="seven" continuousMode="yes"
         scaleMode="9" scaleFactor="big" rotation="-1"/>
    <tab currentPage="2"/>
</tabs>"#,
        )
        .expect("write");

        let loaded = storage.load_tabs(true).done().expect("tabs should load");
        assert_eq!(loaded.len(), 1);

        let view = loaded[0].view;
        assert_eq!(view.current_page, 0);
        assert!(!view.continuous_mode);
        assert!(!view.two_pages_mode);
        assert_eq!(view.scale_mode, ScaleMode::ScaleFactor);
        assert_eq!(view.scale_factor, 0.0);
        assert_eq!(view.rotation, Rotation::RotateBy0);
    }

    #[test]
    fn unparsable_file_is_ignored() {
        let (_temp, storage) = storage();
        fs::write(storage.tabs_path(), "<tabs><tab filePath=").expect("write");

        assert!(matches!(storage.load_tabs(true), PersistOutcome::Ignored(StorageError::Xml(_))));
    }

    #[test]
    fn bookmarks_round_trip_with_pages_in_order() {
        let (_temp, storage) = storage();
        let mut bookmarks = BookmarkList::new();
        bookmarks.add("/docs/a.pdf", 5);
        bookmarks.add("/docs/a.pdf", 9);
        bookmarks.add("/docs/b.pdf", 1);

        assert!(matches!(storage.save_bookmarks(true, &bookmarks), PersistOutcome::Done(2)));
        let loaded = storage.load_bookmarks(true).done().expect("bookmarks should load");

        assert_eq!(loaded.as_slice(), bookmarks.as_slice());
        assert_eq!(
            loaded.iter().map(|b| b.file_path().to_path_buf()).collect::<Vec<_>>(),
            vec![PathBuf::from("/docs/a.pdf"), PathBuf::from("/docs/b.pdf")]
        );
    }

    #[test]
    fn bookmarks_file_layout() {
        let (_temp, storage) = storage();
        let mut bookmarks = BookmarkList::new();
        bookmarks.add("/docs/a.pdf", 5);
        storage.save_bookmarks(true, &bookmarks);

        let xml = fs::read_to_string(storage.bookmarks_path()).expect("bookmarks.xml should exist");
        assert!(xml.contains(r#"<bookmark filePath="/docs/a.pdf">"#));
        assert!(xml.contains(r#"<jumpToPage page="5"/>"#));
    }

    #[test]
    fn remove_all_then_save_restores_nothing() {
        let (_temp, storage) = storage();
        let mut bookmarks = BookmarkList::new();
        bookmarks.add("/docs/a.pdf", 5);
        storage.save_bookmarks(true, &bookmarks);

        bookmarks.remove_all();
        storage.save_bookmarks(true, &bookmarks);

        let loaded = storage.load_bookmarks(true).done().expect("bookmarks should load");
        assert!(loaded.is_empty());
    }

    #[test]
    fn disabled_bookmarks_delete_the_file() {
        let (_temp, storage) = storage();
        let mut bookmarks = BookmarkList::new();
        bookmarks.add("/docs/a.pdf", 5);
        storage.save_bookmarks(true, &bookmarks);

        assert!(storage.save_bookmarks(false, &bookmarks).is_disabled());
        assert!(!storage.bookmarks_path().exists());
        assert!(storage.load_bookmarks(false).is_disabled());
    }
}
