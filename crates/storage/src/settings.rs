use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Setting keys. Slash-separated, grouped by the component that reads them.
pub mod keys {
    pub const CACHE_SIZE: &str = "pageItem/cacheSize";
    pub const DECORATE_PAGES: &str = "pageItem/decoratePages";
    pub const DECORATE_LINKS: &str = "pageItem/decorateLinks";

    pub const PAGE_SPACING: &str = "documentView/pageSpacing";
    pub const THUMBNAIL_SPACING: &str = "documentView/thumbnailSpacing";
    pub const THUMBNAIL_SIZE: &str = "documentView/thumbnailSize";

    pub const RESTORE_TABS: &str = "mainWindow/restoreTabs";
    pub const RESTORE_BOOKMARKS: &str = "mainWindow/restoreBookmarks";
    pub const TAB_POSITION: &str = "mainWindow/tabPosition";
    pub const TAB_VISIBILITY: &str = "mainWindow/tabVisibility";
    pub const PATH: &str = "mainWindow/path";
    pub const ICON_THEME: &str = "mainWindow/iconTheme";
    pub const GEOMETRY: &str = "mainWindow/geometry";
    pub const STATE: &str = "mainWindow/state";
    pub const FILE_TOOL_BAR: &str = "mainWindow/fileToolBar";
    pub const EDIT_TOOL_BAR: &str = "mainWindow/editToolBar";
    pub const VIEW_TOOL_BAR: &str = "mainWindow/viewToolBar";
    pub const RECENTLY_CLOSED_COUNT: &str = "mainWindow/recentlyClosedCount";
}

pub const DEFAULT_CACHE_SIZE: usize = 32 * 1024 * 1024;
pub const DEFAULT_PAGE_SPACING: f64 = 5.0;
pub const DEFAULT_THUMBNAIL_SPACING: f64 = 3.0;
pub const DEFAULT_THUMBNAIL_SIZE: f64 = 150.0;
pub use pageturn_model::DEFAULT_RECENTLY_CLOSED_COUNT;
pub const DEFAULT_FILE_TOOL_BAR: &[&str] = &["openInNewTab", "refresh"];
pub const DEFAULT_EDIT_TOOL_BAR: &[&str] =
    &["currentPage", "numberOfPages", "previousPage", "nextPage"];
pub const DEFAULT_VIEW_TOOL_BAR: &[&str] = &["scaleFactor", "zoomIn", "zoomOut"];

/// Flat key/value settings. Last write wins; reads of absent keys or of
/// values with the wrong type return the caller's default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsStore {
    values: BTreeMap<String, Value>,
}

impl SettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.values.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    pub fn get_i64(&self, key: &str, default: i64) -> i64 {
        self.values.get(key).and_then(Value::as_i64).unwrap_or(default)
    }

    /// Non-negative integer; negative or fractional values read as `default`.
    pub fn get_usize(&self, key: &str, default: usize) -> usize {
        self.values
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|value| usize::try_from(value).ok())
            .unwrap_or(default)
    }

    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        self.values.get(key).and_then(Value::as_f64).unwrap_or(default)
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn get_string_list(&self, key: &str, default: &[&str]) -> Vec<String> {
        let list = self.values.get(key).and_then(Value::as_array).and_then(|items| {
            items.iter().map(|item| item.as_str().map(str::to_owned)).collect::<Option<Vec<_>>>()
        });

        list.unwrap_or_else(|| default.iter().map(|item| (*item).to_owned()).collect())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Stores `text` as JSON when it parses as JSON, otherwise as a string,
    /// so `true`, `42` and `["a"]` keep their types.
    pub fn set_from_str(&mut self, key: impl Into<String>, text: &str) {
        let value = serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_owned()));
        self.set(key, value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The value a reader sees for `key`: the stored one, else its default.
    pub fn effective(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned().or_else(|| default_value(key))
    }
}

impl FromIterator<(String, Value)> for SettingsStore {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self { values: iter.into_iter().collect() }
    }
}

/// Default of a known key; `None` for unknown keys and for keys without a
/// default such as `mainWindow/geometry`.
pub fn default_value(key: &str) -> Option<Value> {
    let value = match key {
        keys::CACHE_SIZE => Value::from(DEFAULT_CACHE_SIZE),
        keys::DECORATE_PAGES | keys::DECORATE_LINKS => Value::from(true),
        keys::PAGE_SPACING => Value::from(DEFAULT_PAGE_SPACING),
        keys::THUMBNAIL_SPACING => Value::from(DEFAULT_THUMBNAIL_SPACING),
        keys::THUMBNAIL_SIZE => Value::from(DEFAULT_THUMBNAIL_SIZE),
        keys::RESTORE_TABS | keys::RESTORE_BOOKMARKS => Value::from(false),
        keys::TAB_POSITION | keys::TAB_VISIBILITY => Value::from(0),
        keys::PATH => Value::from(default_document_dir().to_string_lossy().into_owned()),
        keys::FILE_TOOL_BAR => Value::from(DEFAULT_FILE_TOOL_BAR.to_vec()),
        keys::EDIT_TOOL_BAR => Value::from(DEFAULT_EDIT_TOOL_BAR.to_vec()),
        keys::VIEW_TOOL_BAR => Value::from(DEFAULT_VIEW_TOOL_BAR.to_vec()),
        keys::RECENTLY_CLOSED_COUNT => Value::from(DEFAULT_RECENTLY_CLOSED_COUNT),
        _ => return None,
    };

    Some(value)
}

fn default_document_dir() -> PathBuf {
    directories::UserDirs::new()
        .and_then(|dirs| dirs.document_dir().map(Path::to_path_buf))
        .unwrap_or_default()
}

/// Typed snapshot of every setting the viewer reads.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerSettings {
    pub cache_size: usize,
    pub decorate_pages: bool,
    pub decorate_links: bool,
    pub page_spacing: f64,
    pub thumbnail_spacing: f64,
    pub thumbnail_size: f64,
    pub restore_tabs: bool,
    pub restore_bookmarks: bool,
    pub tab_position: i64,
    pub tab_visibility: i64,
    pub path: PathBuf,
    pub icon_theme: Option<String>,
    pub file_tool_bar: Vec<String>,
    pub edit_tool_bar: Vec<String>,
    pub view_tool_bar: Vec<String>,
    pub recently_closed_count: usize,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self::from_store(&SettingsStore::default())
    }
}

impl ViewerSettings {
    pub fn from_store(store: &SettingsStore) -> Self {
        Self {
            cache_size: store.get_usize(keys::CACHE_SIZE, DEFAULT_CACHE_SIZE),
            decorate_pages: store.get_bool(keys::DECORATE_PAGES, true),
            decorate_links: store.get_bool(keys::DECORATE_LINKS, true),
            page_spacing: store.get_f64(keys::PAGE_SPACING, DEFAULT_PAGE_SPACING),
            thumbnail_spacing: store.get_f64(keys::THUMBNAIL_SPACING, DEFAULT_THUMBNAIL_SPACING),
            thumbnail_size: store.get_f64(keys::THUMBNAIL_SIZE, DEFAULT_THUMBNAIL_SIZE),
            restore_tabs: store.get_bool(keys::RESTORE_TABS, false),
            restore_bookmarks: store.get_bool(keys::RESTORE_BOOKMARKS, false),
            tab_position: store.get_i64(keys::TAB_POSITION, 0),
            tab_visibility: store.get_i64(keys::TAB_VISIBILITY, 0),
            path: store
                .get_string(keys::PATH)
                .map(PathBuf::from)
                .unwrap_or_else(default_document_dir),
            icon_theme: store.get_string(keys::ICON_THEME).map(str::to_owned),
            file_tool_bar: store.get_string_list(keys::FILE_TOOL_BAR, DEFAULT_FILE_TOOL_BAR),
            edit_tool_bar: store.get_string_list(keys::EDIT_TOOL_BAR, DEFAULT_EDIT_TOOL_BAR),
            view_tool_bar: store.get_string_list(keys::VIEW_TOOL_BAR, DEFAULT_VIEW_TOOL_BAR),
            recently_closed_count: store
                .get_usize(keys::RECENTLY_CLOSED_COUNT, DEFAULT_RECENTLY_CLOSED_COUNT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_keys_fall_back_to_defaults() {
        let settings = ViewerSettings::from_store(&SettingsStore::new());

        assert_eq!(settings.cache_size, 33_554_432);
        assert!(settings.decorate_pages);
        assert!(settings.decorate_links);
        assert_eq!(settings.page_spacing, 5.0);
        assert_eq!(settings.thumbnail_spacing, 3.0);
        assert_eq!(settings.thumbnail_size, 150.0);
        assert!(!settings.restore_tabs);
        assert!(!settings.restore_bookmarks);
        assert_eq!(settings.file_tool_bar, vec!["openInNewTab", "refresh"]);
        assert_eq!(settings.edit_tool_bar, DEFAULT_EDIT_TOOL_BAR);
        assert_eq!(settings.view_tool_bar, vec!["scaleFactor", "zoomIn", "zoomOut"]);
        assert_eq!(settings.recently_closed_count, 5);
        assert_eq!(settings.icon_theme, None);
    }

    #[test]
    fn wrong_type_reads_as_default() {
        let mut store = SettingsStore::new();
        store.set(keys::RESTORE_TABS, "yes");
        store.set(keys::CACHE_SIZE, -1);
        store.set(keys::RECENTLY_CLOSED_COUNT, -3);
        store.set(keys::FILE_TOOL_BAR, json!(["refresh", 3]));

        let settings = ViewerSettings::from_store(&store);
        assert!(!settings.restore_tabs);
        assert_eq!(settings.cache_size, DEFAULT_CACHE_SIZE);
        assert_eq!(settings.recently_closed_count, DEFAULT_RECENTLY_CLOSED_COUNT);
        assert_eq!(settings.file_tool_bar, vec!["openInNewTab", "refresh"]);
    }

    #[test]
    fn count_settings_reject_negative_and_fractional_values() {
        let mut store = SettingsStore::new();
        store.set(keys::CACHE_SIZE, 2048);
        assert_eq!(store.get_usize(keys::CACHE_SIZE, 7), 2048);

        store.set(keys::CACHE_SIZE, 1.5);
        assert_eq!(store.get_usize(keys::CACHE_SIZE, 7), 7);

        store.set(keys::CACHE_SIZE, -2048);
        assert_eq!(store.get_usize(keys::CACHE_SIZE, 7), 7);
    }

    #[test]
    fn recently_closed_default_matches_the_model() {
        let settings = ViewerSettings::default();
        let list = pageturn_model::RecentlyClosed::default();

        assert_eq!(settings.recently_closed_count, list.capacity());
        assert_eq!(
            default_value(keys::RECENTLY_CLOSED_COUNT),
            Some(json!(DEFAULT_RECENTLY_CLOSED_COUNT))
        );
    }

    #[test]
    fn last_write_wins() {
        let mut store = SettingsStore::new();
        store.set(keys::PAGE_SPACING, 1.0);
        store.set(keys::PAGE_SPACING, 8.5);

        assert_eq!(store.get_f64(keys::PAGE_SPACING, 0.0), 8.5);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn set_from_str_keeps_json_types() {
        let mut store = SettingsStore::new();
        store.set_from_str(keys::RESTORE_BOOKMARKS, "true");
        store.set_from_str(keys::CACHE_SIZE, "1048576");
        store.set_from_str(keys::ICON_THEME, "breeze");

        assert!(store.get_bool(keys::RESTORE_BOOKMARKS, false));
        assert_eq!(store.get_i64(keys::CACHE_SIZE, 0), 1_048_576);
        assert_eq!(store.get_string(keys::ICON_THEME), Some("breeze"));
    }

    #[test]
    fn effective_value_prefers_stored_then_default() {
        let mut store = SettingsStore::new();
        assert_eq!(store.effective(keys::TAB_POSITION), Some(json!(0)));
        assert_eq!(store.effective(keys::GEOMETRY), None);
        assert_eq!(store.effective("unknown/key"), None);

        store.set(keys::TAB_POSITION, 2);
        assert_eq!(store.effective(keys::TAB_POSITION), Some(json!(2)));

        store.remove(keys::TAB_POSITION);
        assert!(!store.contains(keys::TAB_POSITION));
    }
}
