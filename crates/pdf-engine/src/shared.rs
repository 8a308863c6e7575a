use crate::{DocumentBackend, EngineError, PageSize, RenderRequest, RgbaImage};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Reference-counted handle to an open document.
///
/// All clones share one backend behind one mutex, so at most one backend call
/// runs at a time no matter how many threads hold a clone. The backend lives
/// until the last clone, including every [`PageHandle`], is dropped.
#[derive(Clone)]
pub struct SharedDocument {
    id: u64,
    backend: Arc<Mutex<Box<dyn DocumentBackend>>>,
}

impl fmt::Debug for SharedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedDocument").field("id", &self.id).finish_non_exhaustive()
    }
}

impl SharedDocument {
    pub fn new(backend: Box<dyn DocumentBackend>) -> Self {
        Self {
            id: NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed),
            backend: Arc::new(Mutex::new(backend)),
        }
    }

    /// Process-unique id, stable across clones. Used to key cached pages.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Runs `call` with exclusive access to the backend.
    pub fn with<R>(
        &self,
        call: impl FnOnce(&dyn DocumentBackend) -> Result<R, EngineError>,
    ) -> Result<R, EngineError> {
        let backend = self.backend.lock().map_err(|_| EngineError::Poisoned)?;
        call(&**backend)
    }

    pub fn page_count(&self) -> Result<u32, EngineError> {
        self.with(|backend| Ok(backend.page_count()))
    }

    pub fn page_size(&self, page_index: u32) -> Result<PageSize, EngineError> {
        self.with(|backend| backend.page_size(page_index))
    }

    pub fn page(&self, page_index: u32) -> Result<PageHandle, EngineError> {
        let size = self.page_size(page_index)?;
        Ok(PageHandle { document: self.clone(), index: page_index, size })
    }

    pub fn render(&self, request: &RenderRequest) -> Result<RgbaImage, EngineError> {
        self.with(|backend| backend.render(request))
    }

    pub fn page_text(&self, page_index: u32) -> Result<String, EngineError> {
        self.with(|backend| backend.page_text(page_index))
    }

    pub fn can_save(&self) -> Result<bool, EngineError> {
        self.with(|backend| Ok(backend.can_save()))
    }

    pub fn save(&self, path: &Path, with_changes: bool) -> Result<(), EngineError> {
        self.with(|backend| {
            if !backend.can_save() {
                return Err(EngineError::Backend("document format cannot be saved".to_owned()));
            }
            backend.save(path, with_changes)
        })
    }

    /// Number of live handles sharing the backend.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.backend)
    }
}

/// One page of a [`SharedDocument`]. Keeps the document alive.
#[derive(Debug, Clone)]
pub struct PageHandle {
    document: SharedDocument,
    index: u32,
    size: PageSize,
}

impl PageHandle {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn size(&self) -> PageSize {
        self.size
    }

    pub fn document(&self) -> &SharedDocument {
        &self.document
    }

    /// Renders this page; `request.page_index` is overridden.
    pub fn render(&self, request: &RenderRequest) -> Result<RgbaImage, EngineError> {
        let request = RenderRequest { page_index: self.index, ..*request };
        self.document.render(&request)
    }

    pub fn text(&self) -> Result<String, EngineError> {
        self.document.page_text(self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::thread;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        inside: AtomicBool,
        overlaps: AtomicUsize,
        calls: AtomicUsize,
        dropped: AtomicBool,
    }

    struct RecordingBackend(Arc<Recorder>);

    impl Drop for RecordingBackend {
        fn drop(&mut self) {
            self.0.dropped.store(true, Ordering::SeqCst);
        }
    }

    impl DocumentBackend for RecordingBackend {
        fn page_count(&self) -> u32 {
            3
        }

        fn page_size(&self, page_index: u32) -> Result<PageSize, EngineError> {
            if page_index < 3 {
                Ok(PageSize { width_pt: 10.0, height_pt: 20.0 })
            } else {
                Err(EngineError::PageOutOfRange { page: page_index, page_count: 3 })
            }
        }

        fn render(&self, request: &RenderRequest) -> Result<RgbaImage, EngineError> {
            if self.0.inside.swap(true, Ordering::SeqCst) {
                self.0.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            thread::sleep(Duration::from_micros(200));
            self.0.calls.fetch_add(1, Ordering::SeqCst);
            self.0.inside.store(false, Ordering::SeqCst);

            let size = self.page_size(request.page_index)?;
            let (width, height) = request.unrotated_pixel_size(size);
            Ok(RgbaImage::new(width, height))
        }

        fn page_text(&self, page_index: u32) -> Result<String, EngineError> {
            Ok(format!("page {page_index}"))
        }

        fn save(&self, _path: &Path, _with_changes: bool) -> Result<(), EngineError> {
            Ok(())
        }
    }

    fn recorded_document() -> (SharedDocument, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        (SharedDocument::new(Box::new(RecordingBackend(Arc::clone(&recorder)))), recorder)
    }

    #[test]
    fn backend_calls_never_overlap() {
        let (document, recorder) = recorded_document();

        let workers: Vec<_> = (0..4)
            .map(|worker| {
                let document = document.clone();
                thread::spawn(move || {
                    for _ in 0..20 {
                        document.render(&RenderRequest::page(worker % 3)).expect("render");
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("worker should not panic");
        }

        assert_eq!(recorder.calls.load(Ordering::SeqCst), 80);
        assert_eq!(recorder.overlaps.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn page_handle_keeps_document_alive() {
        let (document, recorder) = recorded_document();
        let page = document.page(2).expect("page exists");
        drop(document);

        assert!(!recorder.dropped.load(Ordering::SeqCst));
        assert_eq!(page.text().expect("text"), "page 2");
        assert_eq!(page.render(&RenderRequest::page(0)).expect("render").dimensions(), (10, 20));

        drop(page);
        assert!(recorder.dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn clones_share_identity() {
        let (document, _) = recorded_document();
        let other = SharedDocument::new(Box::new(RecordingBackend(Arc::new(Recorder::default()))));
        let clone = document.clone();

        assert_eq!(clone.id(), document.id());
        assert_ne!(other.id(), document.id());
        assert_eq!(document.handle_count(), 2);
    }

    #[test]
    fn missing_page_is_reported() {
        let (document, _) = recorded_document();
        assert!(matches!(document.page(7), Err(EngineError::PageOutOfRange { page: 7, .. })));
    }

    #[test]
    fn backend_without_save_support_refuses() {
        let (document, _) = recorded_document();
        let err = document.save(Path::new("/nonexistent/out.pdf"), false).expect_err("unsupported");

        assert!(matches!(err, EngineError::Backend(_)));
    }
}
