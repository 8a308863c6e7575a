use crate::{DocumentView, RenderOptions, ViewerError};
use pageturn_cache::PageCache;
use pageturn_engine::LoaderRegistry;
use pageturn_model::{
    absolute_path, BookmarkChange, BookmarkList, RecentlyClosed, TabId, TabList, TabRecord,
    ViewAction,
};
use pageturn_storage::{keys, PersistOutcome, SettingsStore, Storage, ViewerSettings};
use std::path::Path;

/// What a session restore or save did with each file.
#[derive(Debug)]
pub struct SessionReport {
    /// Settings file read or written.
    pub settings: PersistOutcome<()>,
    /// Tabs opened (restore) or written (save).
    pub tabs: PersistOutcome<usize>,
    /// Bookmarks read or written.
    pub bookmarks: PersistOutcome<usize>,
}

/// Tabs, bookmarks and settings of one viewer window.
#[derive(Debug)]
pub struct Viewer {
    registry: LoaderRegistry,
    storage: Storage,
    settings_store: SettingsStore,
    settings: ViewerSettings,
    cache: PageCache,
    tabs: TabList<DocumentView>,
    next_tab_id: u64,
    bookmarks: BookmarkList,
    recently_closed: RecentlyClosed,
}

impl Viewer {
    /// A viewer with default settings; call [`Viewer::restore_session`] to
    /// pick up the files in `storage`.
    pub fn new(storage: Storage) -> Self {
        Self::with_registry(storage, LoaderRegistry::default())
    }

    pub fn with_registry(storage: Storage, registry: LoaderRegistry) -> Self {
        let settings = ViewerSettings::default();

        Self {
            registry,
            storage,
            settings_store: SettingsStore::default(),
            cache: PageCache::new(settings.cache_size),
            recently_closed: RecentlyClosed::new(settings.recently_closed_count),
            settings,
            tabs: TabList::new(),
            next_tab_id: 1,
            bookmarks: BookmarkList::new(),
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn settings(&self) -> &ViewerSettings {
        &self.settings
    }

    pub fn settings_store(&self) -> &SettingsStore {
        &self.settings_store
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    pub fn tabs(&self) -> &TabList<DocumentView> {
        &self.tabs
    }

    pub fn current_tab(&self) -> Option<&DocumentView> {
        self.tabs.current()
    }

    pub fn current_tab_mut(&mut self) -> Option<&mut DocumentView> {
        self.tabs.current_mut()
    }

    pub fn bookmarks(&self) -> &BookmarkList {
        &self.bookmarks
    }

    pub fn recently_closed(&self) -> &RecentlyClosed {
        &self.recently_closed
    }

    fn render_options(&self) -> RenderOptions {
        RenderOptions {
            decorate_pages: self.settings.decorate_pages,
            decorate_links: self.settings.decorate_links,
        }
    }

    fn remember_directory(&mut self, file_path: &Path) {
        if let Some(parent) = file_path.parent() {
            self.settings_store.set(keys::PATH, parent.to_string_lossy().into_owned());
            self.settings.path = parent.to_path_buf();
        }
    }

    /// Replaces the current tab's document, then jumps to `page` if given.
    pub fn open(
        &mut self,
        file_path: impl AsRef<Path>,
        page: Option<u32>,
    ) -> Result<(), ViewerError> {
        let tab = self.tabs.current_mut().ok_or(ViewerError::NoCurrentTab)?;
        tab.replace_document(file_path, &self.registry, &self.cache)?;
        if let Some(page) = page {
            tab.jump_to_page(page);
        }

        let opened = tab.file_path().to_path_buf();
        self.remember_directory(&opened);
        Ok(())
    }

    /// Opens `file_path` in a new, current tab and returns its index.
    pub fn open_in_new_tab(
        &mut self,
        file_path: impl AsRef<Path>,
        page: Option<u32>,
    ) -> Result<usize, ViewerError> {
        let id = TabId(self.next_tab_id);
        let mut tab = DocumentView::open(id, file_path, &self.registry, self.render_options())?;
        self.next_tab_id += 1;

        if let Some(page) = page {
            tab.jump_to_page(page);
        }

        let opened = tab.file_path().to_path_buf();
        let index = self.tabs.push(tab);
        self.remember_directory(&opened);
        Ok(index)
    }

    /// Refreshes the first tab showing `file_path` that reloads cleanly, or
    /// opens the file in a new tab when none does.
    pub fn refresh_or_open_in_new_tab(
        &mut self,
        file_path: impl AsRef<Path>,
        page: Option<u32>,
    ) -> Result<usize, ViewerError> {
        let file_path = absolute_path(file_path);

        for (index, tab) in self.tabs.iter_mut().enumerate() {
            if tab.file_path() != file_path {
                continue;
            }
            if let Err(err) = tab.refresh(&self.registry, &self.cache) {
                tracing::warn!(
                    path = %file_path.display(),
                    index,
                    error = %err,
                    "refresh of open tab failed"
                );
                continue;
            }
            if let Some(page) = page {
                tab.jump_to_page(page);
            }
            self.tabs.activate(index);
            return Ok(index);
        }

        self.open_in_new_tab(&file_path, page)
    }

    pub fn refresh(&mut self) -> Result<(), ViewerError> {
        let tab = self.tabs.current_mut().ok_or(ViewerError::NoCurrentTab)?;
        tab.refresh(&self.registry, &self.cache)
    }

    pub fn save_copy(
        &self,
        target: impl AsRef<Path>,
        with_changes: bool,
    ) -> Result<(), ViewerError> {
        let tab = self.tabs.current().ok_or(ViewerError::NoCurrentTab)?;
        tab.save_copy(target.as_ref(), with_changes)
    }

    /// Applies a view action to the current tab.
    pub fn apply(&mut self, action: ViewAction) -> Result<bool, ViewerError> {
        let tab = self.tabs.current_mut().ok_or(ViewerError::NoCurrentTab)?;
        Ok(tab.apply(action))
    }

    pub fn activate_tab(&mut self, index: usize) -> Result<(), ViewerError> {
        if self.tabs.activate(index) {
            Ok(())
        } else {
            Err(ViewerError::NoSuchTab(index))
        }
    }

    pub fn next_tab(&mut self) -> Option<usize> {
        self.tabs.next()
    }

    pub fn previous_tab(&mut self) -> Option<usize> {
        self.tabs.previous()
    }

    /// Closes a tab and records it as recently closed.
    pub fn close_tab(&mut self, index: usize) -> Result<TabRecord, ViewerError> {
        let tab = self.tabs.remove(index).ok_or(ViewerError::NoSuchTab(index))?;
        let record = tab.to_record();

        self.cache.invalidate_document(tab.document().id());
        self.recently_closed.push(record.clone());
        tracing::debug!(tab = tab.id().0, path = %record.file_path.display(), "tab closed");
        Ok(record)
    }

    pub fn close_current_tab(&mut self) -> Result<TabRecord, ViewerError> {
        let index = self.tabs.current_index().ok_or(ViewerError::NoCurrentTab)?;
        self.close_tab(index)
    }

    pub fn close_all_tabs(&mut self) {
        while !self.tabs.is_empty() {
            let last = self.tabs.len() - 1;
            if self.close_tab(last).is_err() {
                break;
            }
        }
    }

    /// Reopens the recently closed entry at `index` (0 is the most recent)
    /// with its view state. `Ok(None)` when there is no such entry.
    pub fn restore_recently_closed(
        &mut self,
        index: usize,
    ) -> Result<Option<usize>, ViewerError> {
        let Some(record) = self.recently_closed.take(index) else {
            return Ok(None);
        };

        self.open_record(&record).map(Some)
    }

    pub fn clear_recently_closed(&mut self) {
        self.recently_closed.clear();
    }

    /// Opens a record in a new tab and applies its view state in a fixed
    /// order: modes, scale, rotation, then the page.
    fn open_record(&mut self, record: &TabRecord) -> Result<usize, ViewerError> {
        let index = self.open_in_new_tab(&record.file_path, None)?;
        let tab = self.tabs.get_mut(index).ok_or(ViewerError::NoSuchTab(index))?;
        let view = record.view;

        for action in [
            ViewAction::SetContinuousMode(view.continuous_mode),
            ViewAction::SetTwoPagesMode(view.two_pages_mode),
            ViewAction::SetScaleMode(view.scale_mode),
            ViewAction::SetScaleFactor(view.scale_factor),
            ViewAction::SetRotation(view.rotation),
            ViewAction::JumpToPage(view.current_page),
        ] {
            tab.apply(action);
        }

        Ok(index)
    }

    /// Bookmarks the current tab's page.
    pub fn add_bookmark(&mut self) -> Result<BookmarkChange, ViewerError> {
        let tab = self.tabs.current().ok_or(ViewerError::NoCurrentTab)?;
        Ok(self.bookmarks.add(tab.file_path(), tab.current_page()))
    }

    pub fn add_bookmark_for(&mut self, file_path: impl AsRef<Path>, page: u32) -> BookmarkChange {
        self.bookmarks.add(file_path, page)
    }

    pub fn remove_all_bookmarks(&mut self) {
        self.bookmarks.remove_all();
    }

    pub fn jump_to_bookmark(
        &mut self,
        file_path: impl AsRef<Path>,
        page: u32,
    ) -> Result<usize, ViewerError> {
        self.refresh_or_open_in_new_tab(file_path, Some(page))
    }

    /// Stores a setting; it takes effect on the next [`Viewer::apply_settings`].
    pub fn set_setting(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.settings_store.set(key, value);
    }

    /// Re-reads every setting, pushes it into the cache and the tabs, and
    /// refreshes every tab. Returns the tabs that failed to refresh.
    pub fn apply_settings(&mut self) -> Vec<ViewerError> {
        self.apply_settings_without_refresh();

        let mut failures = Vec::new();
        for tab in self.tabs.iter_mut() {
            if let Err(err) = tab.refresh(&self.registry, &self.cache) {
                tracing::warn!(
                    path = %tab.file_path().display(),
                    error = %err,
                    "refresh after settings change failed"
                );
                failures.push(err);
            }
        }

        failures
    }

    fn apply_settings_without_refresh(&mut self) {
        self.settings = ViewerSettings::from_store(&self.settings_store);
        self.cache.set_memory_limit(self.settings.cache_size);
        self.recently_closed.set_capacity(self.settings.recently_closed_count);

        let options = self.render_options();
        for tab in self.tabs.iter_mut() {
            tab.set_render_options(options);
        }
    }

    /// Loads settings, then reopens saved tabs and bookmarks if the settings
    /// ask for it. Tabs whose file no longer opens are skipped.
    pub fn restore_session(&mut self) -> SessionReport {
        let settings = match self.storage.load_settings() {
            Ok(store) => {
                self.settings_store = store;
                PersistOutcome::Done(())
            }
            Err(err) => PersistOutcome::from_result("load settings", Err(err)),
        };
        self.apply_settings_without_refresh();

        let tabs = match self.storage.load_tabs(self.settings.restore_tabs) {
            PersistOutcome::Done(records) => {
                let mut restored = 0;
                for record in &records {
                    match self.open_record(record) {
                        Ok(_) => restored += 1,
                        Err(err) => {
                            tracing::warn!(
                                path = %record.file_path.display(),
                                error = %err,
                                "skipping saved tab"
                            );
                        }
                    }
                }
                PersistOutcome::Done(restored)
            }
            other => other.map(|records| records.len()),
        };

        let bookmarks = self.storage.load_bookmarks(self.settings.restore_bookmarks).map(|list| {
            let count = list.len();
            self.bookmarks = list;
            count
        });

        tracing::info!(?tabs, ?bookmarks, "session restored");
        SessionReport { settings, tabs, bookmarks }
    }

    /// Writes tabs, bookmarks and settings. Disabled features remove their
    /// files. Failures are logged and reported, never returned as errors.
    pub fn save_session(&self) -> SessionReport {
        let records: Vec<TabRecord> = self.tabs.iter().map(DocumentView::to_record).collect();

        let tabs = self.storage.save_tabs(self.settings.restore_tabs, &records);
        let bookmarks =
            self.storage.save_bookmarks(self.settings.restore_bookmarks, &self.bookmarks);
        let settings = PersistOutcome::from_result(
            "save settings",
            self.storage.save_settings(&self.settings_store),
        );

        SessionReport { settings, tabs, bookmarks }
    }
}
