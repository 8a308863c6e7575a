use crate::{fit_page_scale, fit_width_scale, ViewerError};
use pageturn_cache::{PageCache, PageKey};
use pageturn_engine::{LoaderRegistry, RenderRequest, RgbaImage, SharedDocument, POINTS_PER_INCH};
use pageturn_model::{apply_view_action, ScaleMode, TabId, TabRecord, ViewAction, ViewState};
use pageturn_scheduler::{SearchEvent, SearchRequest, SearchTask};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Decorations drawn on rendered pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub decorate_pages: bool,
    pub decorate_links: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self { decorate_pages: true, decorate_links: true }
    }
}

/// One tab: an open document and how it is being looked at.
#[derive(Debug)]
pub struct DocumentView {
    id: TabId,
    file_path: PathBuf,
    document: SharedDocument,
    page_count: u32,
    view: ViewState,
    render_options: RenderOptions,
    search: Option<SearchTask>,
    search_matches: BTreeMap<u32, usize>,
    search_progress: u8,
}

fn load(
    registry: &LoaderRegistry,
    path: &Path,
) -> Result<(SharedDocument, u32), pageturn_engine::EngineError> {
    let document = registry.open(path)?;
    let page_count = document.page_count()?;
    Ok((document, page_count))
}

impl DocumentView {
    /// Opens `file_path` (made absolute) with a default view.
    pub fn open(
        id: TabId,
        file_path: impl AsRef<Path>,
        registry: &LoaderRegistry,
        render_options: RenderOptions,
    ) -> Result<Self, ViewerError> {
        let file_path = pageturn_model::absolute_path(file_path);
        let (document, page_count) = load(registry, &file_path)
            .map_err(|source| ViewerError::Open { path: file_path.clone(), source })?;

        tracing::debug!(tab = id.0, path = %file_path.display(), page_count, "document opened");

        Ok(Self {
            id,
            file_path,
            document,
            page_count,
            view: ViewState::default(),
            render_options,
            search: None,
            search_matches: BTreeMap::new(),
            search_progress: 0,
        })
    }

    /// Replaces the document shown by this tab. The page goes back to 1, the
    /// display modes are kept. On failure the tab is left untouched.
    pub fn replace_document(
        &mut self,
        file_path: impl AsRef<Path>,
        registry: &LoaderRegistry,
        cache: &PageCache,
    ) -> Result<(), ViewerError> {
        let file_path = pageturn_model::absolute_path(file_path);
        let (document, page_count) = load(registry, &file_path)
            .map_err(|source| ViewerError::Open { path: file_path.clone(), source })?;

        self.swap_document(document, page_count, cache);
        self.file_path = file_path;
        self.view.current_page = 1;
        self.view.clamp_to(page_count);
        Ok(())
    }

    /// Reloads the file from disk, keeping the view state.
    pub fn refresh(
        &mut self,
        registry: &LoaderRegistry,
        cache: &PageCache,
    ) -> Result<(), ViewerError> {
        let (document, page_count) = load(registry, &self.file_path)
            .map_err(|source| ViewerError::Refresh { path: self.file_path.clone(), source })?;

        self.swap_document(document, page_count, cache);
        self.view.clamp_to(page_count);
        tracing::debug!(tab = self.id.0, path = %self.file_path.display(), "document refreshed");
        Ok(())
    }

    fn swap_document(&mut self, document: SharedDocument, page_count: u32, cache: &PageCache) {
        self.clear_search();
        cache.invalidate_document(self.document.id());
        self.document = document;
        self.page_count = page_count;
    }

    pub fn save_copy(&self, target: &Path, with_changes: bool) -> Result<(), ViewerError> {
        self.document.save(target, with_changes).map_err(|source| ViewerError::SaveCopy {
            path: self.file_path.clone(),
            target: target.to_path_buf(),
            source,
        })
    }

    pub fn id(&self) -> TabId {
        self.id
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn document(&self) -> &SharedDocument {
        &self.document
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn current_page(&self) -> u32 {
        self.view.current_page
    }

    pub fn render_options(&self) -> RenderOptions {
        self.render_options
    }

    pub fn set_render_options(&mut self, render_options: RenderOptions) {
        self.render_options = render_options;
    }

    pub fn apply(&mut self, action: ViewAction) -> bool {
        apply_view_action(&mut self.view, action, self.page_count)
    }

    /// Jumps to a 1-based page; out-of-range pages are ignored.
    pub fn jump_to_page(&mut self, page: u32) -> bool {
        self.apply(ViewAction::JumpToPage(page))
    }

    pub fn to_record(&self) -> TabRecord {
        TabRecord { file_path: self.file_path.clone(), view: self.view }
    }

    /// Scale factor in effect for a viewport, resolving the fit modes.
    /// Page sizes are taken from the current page, rotation included.
    pub fn effective_scale(
        &self,
        viewport_width_px: f64,
        viewport_height_px: f64,
        dpi: f64,
    ) -> Result<f64, ViewerError> {
        if self.view.scale_mode == ScaleMode::ScaleFactor {
            return Ok(self.view.scale_factor);
        }

        let size = self
            .document
            .page_size(self.view.current_page.saturating_sub(1))
            .map_err(|source| self.render_error(self.view.current_page, source))?;
        let to_px = dpi / f64::from(POINTS_PER_INCH);
        let (width, height) =
            (f64::from(size.width_pt) * to_px, f64::from(size.height_pt) * to_px);
        let (mut width, height) =
            if self.view.rotation.is_sideways() { (height, width) } else { (width, height) };
        if self.view.two_pages_mode {
            width *= 2.0;
        }

        Ok(match self.view.scale_mode {
            ScaleMode::FitToPageWidth => fit_width_scale(viewport_width_px, width),
            _ => fit_page_scale(viewport_width_px, viewport_height_px, width, height),
        })
    }

    /// Renders a 1-based page at `dpi` (scale already applied) with the tab's
    /// rotation and decorations, going through `cache`.
    pub fn render_page(
        &self,
        page: u32,
        dpi: f32,
        cache: &PageCache,
    ) -> Result<Arc<RgbaImage>, ViewerError> {
        if page == 0 || page > self.page_count {
            return Err(ViewerError::PageOutOfRange { page, page_count: self.page_count });
        }

        let request = RenderRequest {
            page_index: page - 1,
            horizontal_dpi: dpi,
            vertical_dpi: dpi,
            rotation: self.view.rotation,
            clip: None,
            decorate_page: self.render_options.decorate_pages,
            decorate_links: self.render_options.decorate_links,
        };

        let size = self
            .document
            .page_size(request.page_index)
            .map_err(|source| self.render_error(page, source))?;
        let (width_px, height_px) = request.output_pixel_size(size);
        let key = PageKey::for_request(self.document.id(), &request, width_px, height_px);

        cache
            .get_or_insert_with(key, || self.document.render(&request))
            .map_err(|source| self.render_error(page, source))
    }

    fn render_error(&self, page: u32, source: pageturn_engine::EngineError) -> ViewerError {
        ViewerError::Render { path: self.file_path.clone(), page, source }
    }

    /// Starts searching every page; a running search is canceled first.
    pub fn start_search(&mut self, request: SearchRequest) -> Result<(), ViewerError> {
        self.clear_search();
        let task = SearchTask::spawn(self.document.clone(), request).map_err(ViewerError::Search)?;
        self.search = Some(task);
        Ok(())
    }

    pub fn cancel_search(&mut self) {
        if let Some(task) = &self.search {
            task.cancel();
        }
    }

    pub fn is_searching(&self) -> bool {
        self.search.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Applies the events the search produced since the last poll.
    pub fn poll_search(&mut self) -> Vec<SearchEvent> {
        let events = self.search.as_ref().map(SearchTask::try_events).unwrap_or_default();
        self.absorb(&events);
        events
    }

    /// Blocks until the running search ends and applies its remaining events.
    pub fn wait_for_search(&mut self) -> Vec<SearchEvent> {
        let events = self.search.take().map(SearchTask::wait).unwrap_or_default();
        self.absorb(&events);
        events
    }

    fn absorb(&mut self, events: &[SearchEvent]) {
        for event in events {
            match event {
                SearchEvent::Matches { page, count } => {
                    self.search_matches.insert(*page, *count);
                }
                SearchEvent::Progress(progress) => self.search_progress = *progress,
                SearchEvent::Finished | SearchEvent::Canceled | SearchEvent::Failed(_) => {}
            }
        }
    }

    fn clear_search(&mut self) {
        // Dropping the task cancels it and waits for the worker.
        self.search = None;
        self.search_matches.clear();
        self.search_progress = 0;
    }

    /// Match counts by 1-based page.
    pub fn search_matches(&self) -> &BTreeMap<u32, usize> {
        &self.search_matches
    }

    pub fn search_progress(&self) -> u8 {
        self.search_progress
    }

    /// Pages shown together with the current page: the spread in two-pages
    /// mode, the page alone otherwise.
    fn visible_spread(&self) -> (u32, u32) {
        let current = self.view.current_page;
        if self.view.two_pages_mode {
            (current, current + 1)
        } else {
            (current, current)
        }
    }

    /// Jumps to the next page with matches after the visible page or spread,
    /// wrapping around to the first.
    pub fn find_next(&mut self) -> Option<u32> {
        let (_, last_visible) = self.visible_spread();
        let page = self
            .search_matches
            .range(last_visible + 1..)
            .next()
            .or_else(|| self.search_matches.iter().next())
            .map(|(page, _)| *page)?;

        self.jump_to_page(page);
        Some(page)
    }

    /// Jumps to the previous page with matches before the visible page or
    /// spread, wrapping around to the last.
    pub fn find_previous(&mut self) -> Option<u32> {
        let (first_visible, _) = self.visible_spread();
        let page = self
            .search_matches
            .range(..first_visible)
            .next_back()
            .or_else(|| self.search_matches.iter().next_back())
            .map(|(page, _)| *page)?;

        self.jump_to_page(page);
        Some(page)
    }
}
