//! Document backends for the viewer.
//!
//! A [`DocumentLoader`] turns a path into a [`DocumentBackend`]; the
//! [`LoaderRegistry`] picks the loader from the file extension. Backends are
//! not assumed to be thread-safe, so every open document is handed out as a
//! [`SharedDocument`] that serialises calls into it.

#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;
mod pdf;
mod shared;

pub use pageturn_model::Rotation;
pub use pdf::{PdfDocument, PdfLoader};
pub use shared::{PageHandle, SharedDocument};

use image::{ImageBuffer, Rgba};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// Resolution at which one PDF point maps to one pixel.
pub const POINTS_PER_INCH: f32 = 72.0;

/// Largest page raster a backend allocates, in pixels (1 GiB of RGBA).
pub const MAX_RENDER_PIXELS: u64 = 1 << 28;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

impl Default for PageSize {
    fn default() -> Self {
        Self { width_pt: 612.0, height_pt: 792.0 }
    }
}

/// Pixel rectangle within the rendered (already rotated) page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    /// Zero-based page index.
    pub page_index: u32,
    pub horizontal_dpi: f32,
    pub vertical_dpi: f32,
    pub rotation: Rotation,
    pub clip: Option<ClipRect>,
    pub decorate_page: bool,
    pub decorate_links: bool,
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self {
            page_index: 0,
            horizontal_dpi: POINTS_PER_INCH,
            vertical_dpi: POINTS_PER_INCH,
            rotation: Rotation::RotateBy0,
            clip: None,
            decorate_page: true,
            decorate_links: true,
        }
    }
}

impl RenderRequest {
    pub fn page(page_index: u32) -> Self {
        Self { page_index, ..Self::default() }
    }

    pub fn with_dpi(mut self, dpi: f32) -> Self {
        self.horizontal_dpi = dpi;
        self.vertical_dpi = dpi;
        self
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// Pixel size of the page before rotation is applied.
    pub fn unrotated_pixel_size(&self, size: PageSize) -> (u32, u32) {
        let horizontal = sanitize_dpi(self.horizontal_dpi) / POINTS_PER_INCH;
        let vertical = sanitize_dpi(self.vertical_dpi) / POINTS_PER_INCH;

        let width = (size.width_pt * horizontal).round().max(1.0) as u32;
        let height = (size.height_pt * vertical).round().max(1.0) as u32;
        (width, height)
    }

    /// Pixel size of the finished image, rotation and clip included.
    pub fn output_pixel_size(&self, size: PageSize) -> (u32, u32) {
        let (width, height) = self.unrotated_pixel_size(size);
        let (width, height) =
            if self.rotation.is_sideways() { (height, width) } else { (width, height) };

        match self.clip {
            Some(clip) => clip_bounds(clip, width, height).map_or((width, height), |c| (c.2, c.3)),
            None => (width, height),
        }
    }
}

pub(crate) fn ensure_renderable(width: u32, height: u32) -> Result<(), EngineError> {
    if u64::from(width) * u64::from(height) > MAX_RENDER_PIXELS {
        return Err(EngineError::PageTooLarge { width, height });
    }

    Ok(())
}

fn sanitize_dpi(dpi: f32) -> f32 {
    if dpi.is_finite() && dpi > 0.0 {
        dpi
    } else {
        POINTS_PER_INCH
    }
}

/// Clamps `clip` to a `width` x `height` image as `(x, y, w, h)`; `None` when
/// nothing of the page is left.
pub(crate) fn clip_bounds(clip: ClipRect, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let x = clip.x.max(0.0).round() as u32;
    let y = clip.y.max(0.0).round() as u32;
    if x >= width || y >= height {
        return None;
    }

    let w = (clip.width.max(0.0).round() as u32).min(width - x);
    let h = (clip.height.max(0.0).round() as u32).min(height - y);
    if w == 0 || h == 0 {
        return None;
    }

    Some((x, y, w, h))
}

#[derive(Debug, Clone)]
pub enum OpenSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl From<PathBuf> for OpenSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for OpenSource {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<Vec<u8>> for OpenSource {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("encrypted PDFs are not supported in the default backend")]
    EncryptedUnsupported,
    #[error("no document backend for '{0}'")]
    UnsupportedFormat(String),
    #[error("page of {width}x{height} pixels is too large to render")]
    PageTooLarge { width: u32, height: u32 },
    #[error("clip rectangle lies outside the page")]
    EmptyClip,
    #[error("document handle is unusable after a backend panic")]
    Poisoned,
    #[error("backend error: {0}")]
    Backend(String),
}

/// One opened document. Implementations need not be `Sync`; callers reach
/// them through [`SharedDocument`], which allows one call at a time.
pub trait DocumentBackend: Send {
    fn page_count(&self) -> u32;

    fn page_size(&self, page_index: u32) -> Result<PageSize, EngineError>;

    fn render(&self, request: &RenderRequest) -> Result<RgbaImage, EngineError>;

    fn page_text(&self, page_index: u32) -> Result<String, EngineError>;

    fn can_save(&self) -> bool {
        false
    }

    /// Writes the document to `path`. `with_changes` re-serialises the
    /// in-memory document instead of copying the original bytes.
    fn save(&self, path: &Path, with_changes: bool) -> Result<(), EngineError>;
}

pub trait DocumentLoader: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lower-case file extensions this loader accepts.
    fn extensions(&self) -> &'static [&'static str];

    fn load(&self, path: &Path) -> Result<Box<dyn DocumentBackend>, EngineError>;
}

/// Loaders by file extension. `LoaderRegistry::default()` knows PDF only.
#[derive(Clone)]
pub struct LoaderRegistry {
    loaders: Vec<Arc<dyn DocumentLoader>>,
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(PdfLoader);
        registry
    }
}

impl std::fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.loaders.iter().map(|loader| loader.name())).finish()
    }
}

impl LoaderRegistry {
    pub fn empty() -> Self {
        Self { loaders: Vec::new() }
    }

    /// Later registrations win for extensions claimed twice.
    pub fn register(&mut self, loader: impl DocumentLoader + 'static) {
        self.loaders.insert(0, Arc::new(loader));
    }

    pub fn loader_for(&self, path: &Path) -> Option<&dyn DocumentLoader> {
        let extension = path.extension()?.to_string_lossy().to_ascii_lowercase();

        self.loaders
            .iter()
            .find(|loader| loader.extensions().iter().any(|ext| *ext == extension))
            .map(|loader| loader.as_ref())
    }

    pub fn open(&self, path: &Path) -> Result<SharedDocument, EngineError> {
        let loader = self
            .loader_for(path)
            .ok_or_else(|| EngineError::UnsupportedFormat(path.display().to_string()))?;

        tracing::debug!(loader = loader.name(), path = %path.display(), "loading document");
        let backend = loader.load(path)?;
        Ok(SharedDocument::new(backend))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_dispatches_on_case_insensitive_extension() {
        let registry = LoaderRegistry::default();

        assert_eq!(registry.loader_for(Path::new("/tmp/a.PDF")).map(|l| l.name()), Some("pdf"));
        assert!(registry.loader_for(Path::new("/tmp/a.djvu")).is_none());
        assert!(registry.loader_for(Path::new("/tmp/no-extension")).is_none());
    }

    #[test]
    fn unknown_format_is_reported_with_path() {
        let registry = LoaderRegistry::default();
        let err = registry.open(Path::new("/tmp/book.djvu")).expect_err("djvu has no backend");

        assert!(matches!(
            err,
            EngineError::UnsupportedFormat(ref path) if path.ends_with("book.djvu")
        ));
    }

    #[test]
    fn pixel_size_follows_resolution_and_rotation() {
        let size = PageSize { width_pt: 72.0, height_pt: 144.0 };
        let request = RenderRequest::page(0).with_dpi(144.0);

        assert_eq!(request.unrotated_pixel_size(size), (144, 288));
        assert_eq!(request.with_rotation(Rotation::RotateBy90).output_pixel_size(size), (288, 144));
    }

    #[test]
    fn invalid_resolution_falls_back_to_points() {
        let size = PageSize { width_pt: 100.0, height_pt: 50.0 };
        let request = RenderRequest::page(0).with_dpi(f32::NAN);

        assert_eq!(request.unrotated_pixel_size(size), (100, 50));
    }

    #[test]
    fn clip_is_clamped_to_the_page() {
        let clip = ClipRect { x: 90.0, y: -5.0, width: 50.0, height: 20.0 };
        assert_eq!(clip_bounds(clip, 100, 100), Some((90, 0, 10, 20)));

        let outside = ClipRect { x: 120.0, y: 0.0, width: 5.0, height: 5.0 };
        assert_eq!(clip_bounds(outside, 100, 100), None);
    }
}
