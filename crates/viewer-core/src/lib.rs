//! The viewer without a window: tabs of open documents, bookmarks, settings
//! and the session files that carry them across restarts.

mod view;
mod viewer;

pub use view::{DocumentView, RenderOptions};
pub use viewer::{SessionReport, Viewer};

use pageturn_engine::EngineError;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("could not open '{path}'")]
    Open {
        path: PathBuf,
        #[source]
        source: EngineError,
    },
    #[error("could not refresh '{path}'")]
    Refresh {
        path: PathBuf,
        #[source]
        source: EngineError,
    },
    #[error("could not save a copy of '{path}' to '{target}'")]
    SaveCopy {
        path: PathBuf,
        target: PathBuf,
        #[source]
        source: EngineError,
    },
    #[error("could not render page {page} of '{path}'")]
    Render {
        path: PathBuf,
        page: u32,
        #[source]
        source: EngineError,
    },
    #[error("page {page} is out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("no document is open")]
    NoCurrentTab,
    #[error("no tab at index {0}")]
    NoSuchTab(usize),
    #[error("could not start search")]
    Search(#[source] std::io::Error),
}

/// Scale factor that makes a page of `page_width_px` (at scale 1.0) fill
/// `viewport_width_px`. Degenerate sizes give `1.0`.
pub fn fit_width_scale(viewport_width_px: f64, page_width_px: f64) -> f64 {
    if viewport_width_px <= 0.0 || page_width_px <= 0.0 {
        return 1.0;
    }

    pageturn_model::clamp_scale_factor(viewport_width_px / page_width_px)
}

/// Scale factor that fits a whole page into the viewport.
pub fn fit_page_scale(
    viewport_width_px: f64,
    viewport_height_px: f64,
    page_width_px: f64,
    page_height_px: f64,
) -> f64 {
    if viewport_width_px <= 0.0
        || viewport_height_px <= 0.0
        || page_width_px <= 0.0
        || page_height_px <= 0.0
    {
        return 1.0;
    }

    let width = viewport_width_px / page_width_px;
    let height = viewport_height_px / page_height_px;

    pageturn_model::clamp_scale_factor(width.min(height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_width_respects_expected_scale() {
        assert_eq!(fit_width_scale(1000.0, 500.0), 2.0);
        assert_eq!(fit_width_scale(100_000.0, 100.0), 10.0);
        assert_eq!(fit_width_scale(0.0, 100.0), 1.0);
    }

    #[test]
    fn fit_page_uses_smallest_dimension_ratio() {
        assert_eq!(fit_page_scale(1000.0, 800.0, 500.0, 2000.0), 0.4);
    }
}
