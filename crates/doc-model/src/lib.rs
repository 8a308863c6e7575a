mod bookmark;
mod recently_closed;
mod tabs;

pub use bookmark::{Bookmark, BookmarkChange, BookmarkList};
pub use recently_closed::{RecentlyClosed, DEFAULT_RECENTLY_CLOSED_COUNT};
pub use tabs::TabList;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const MINIMUM_SCALE_FACTOR: f64 = 0.1;
pub const MAXIMUM_SCALE_FACTOR: f64 = 10.0;
pub const ZOOM_STEP: f64 = 1.1;

/// How the rendered size of a page is derived.
///
/// The discriminants are the integers written to `tabs.xml`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ScaleMode {
    #[default]
    ScaleFactor,
    FitToPageWidth,
    FitToPageSize,
}

impl ScaleMode {
    pub fn as_index(self) -> u32 {
        match self {
            Self::ScaleFactor => 0,
            Self::FitToPageWidth => 1,
            Self::FitToPageSize => 2,
        }
    }

    /// Unknown values fall back to a fixed scale factor.
    pub fn from_index(index: u32) -> Self {
        match index {
            1 => Self::FitToPageWidth,
            2 => Self::FitToPageSize,
            _ => Self::ScaleFactor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    RotateBy0,
    RotateBy90,
    RotateBy180,
    RotateBy270,
}

impl Rotation {
    pub fn as_index(self) -> u32 {
        match self {
            Self::RotateBy0 => 0,
            Self::RotateBy90 => 1,
            Self::RotateBy180 => 2,
            Self::RotateBy270 => 3,
        }
    }

    pub fn from_index(index: u32) -> Self {
        match index {
            1 => Self::RotateBy90,
            2 => Self::RotateBy180,
            3 => Self::RotateBy270,
            _ => Self::RotateBy0,
        }
    }

    pub fn degrees(self) -> u32 {
        self.as_index() * 90
    }

    /// Quarter turn counter-clockwise.
    pub fn rotated_left(self) -> Self {
        Self::from_index((self.as_index() + 3) % 4)
    }

    /// Quarter turn clockwise.
    pub fn rotated_right(self) -> Self {
        Self::from_index((self.as_index() + 1) % 4)
    }

    /// True when the page's width and height trade places on screen.
    pub fn is_sideways(self) -> bool {
        matches!(self, Self::RotateBy90 | Self::RotateBy270)
    }
}

/// Per-tab view settings: everything `tabs.xml` records besides the path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub current_page: u32,
    pub continuous_mode: bool,
    pub two_pages_mode: bool,
    pub scale_mode: ScaleMode,
    pub scale_factor: f64,
    pub rotation: Rotation,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            current_page: 1,
            continuous_mode: true,
            two_pages_mode: false,
            scale_mode: ScaleMode::ScaleFactor,
            scale_factor: 1.0,
            rotation: Rotation::RotateBy0,
        }
    }
}

impl ViewState {
    /// Pulls the current page back into `1..=page_count`, e.g. after the
    /// document shrank on refresh.
    pub fn clamp_to(&mut self, page_count: u32) {
        let last = page_count.max(1);
        self.current_page = self.current_page.clamp(1, last);
        if self.two_pages_mode {
            self.current_page = left_page(self.current_page);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewAction {
    SetContinuousMode(bool),
    SetTwoPagesMode(bool),
    SetScaleMode(ScaleMode),
    SetScaleFactor(f64),
    ZoomIn,
    ZoomOut,
    OriginalSize,
    FitToPageWidth(bool),
    FitToPageSize(bool),
    SetRotation(Rotation),
    RotateLeft,
    RotateRight,
    JumpToPage(u32),
    NextPage,
    PreviousPage,
    FirstPage,
    LastPage,
}

/// Applies `action` to `state` for a document of `page_count` pages and
/// reports whether anything changed.
pub fn apply_view_action(state: &mut ViewState, action: ViewAction, page_count: u32) -> bool {
    let before = *state;

    match action {
        ViewAction::SetContinuousMode(enabled) => state.continuous_mode = enabled,
        ViewAction::SetTwoPagesMode(enabled) => {
            state.two_pages_mode = enabled;
            if enabled {
                state.current_page = left_page(state.current_page);
            }
        }
        ViewAction::SetScaleMode(mode) => state.scale_mode = mode,
        ViewAction::SetScaleFactor(factor) => state.scale_factor = clamp_scale_factor(factor),
        ViewAction::ZoomIn => {
            state.scale_mode = ScaleMode::ScaleFactor;
            state.scale_factor = clamp_scale_factor(state.scale_factor * ZOOM_STEP);
        }
        ViewAction::ZoomOut => {
            state.scale_mode = ScaleMode::ScaleFactor;
            state.scale_factor = clamp_scale_factor(state.scale_factor / ZOOM_STEP);
        }
        ViewAction::OriginalSize => {
            state.scale_mode = ScaleMode::ScaleFactor;
            state.scale_factor = 1.0;
        }
        ViewAction::FitToPageWidth(checked) => {
            state.scale_mode =
                if checked { ScaleMode::FitToPageWidth } else { ScaleMode::ScaleFactor };
        }
        ViewAction::FitToPageSize(checked) => {
            state.scale_mode =
                if checked { ScaleMode::FitToPageSize } else { ScaleMode::ScaleFactor };
        }
        ViewAction::SetRotation(rotation) => state.rotation = rotation,
        ViewAction::RotateLeft => state.rotation = state.rotation.rotated_left(),
        ViewAction::RotateRight => state.rotation = state.rotation.rotated_right(),
        ViewAction::JumpToPage(page) => {
            if (1..=page_count).contains(&page) {
                state.current_page = if state.two_pages_mode { left_page(page) } else { page };
            }
        }
        ViewAction::NextPage => {
            let step = if state.two_pages_mode { 2 } else { 1 };
            if state.current_page + step <= page_count {
                state.current_page += step;
            }
        }
        ViewAction::PreviousPage => {
            let step = if state.two_pages_mode { 2 } else { 1 };
            if state.current_page > step {
                state.current_page -= step;
            }
        }
        ViewAction::FirstPage => {
            if page_count > 0 {
                state.current_page = 1;
            }
        }
        ViewAction::LastPage => {
            if page_count > 0 {
                state.current_page =
                    if state.two_pages_mode { left_page(page_count) } else { page_count };
            }
        }
    }

    *state != before
}

pub fn clamp_scale_factor(factor: f64) -> f64 {
    if factor.is_nan() {
        return 1.0;
    }

    factor.clamp(MINIMUM_SCALE_FACTOR, MAXIMUM_SCALE_FACTOR)
}

// Two-page spreads always start on an odd page.
fn left_page(page: u32) -> u32 {
    if page > 1 && page % 2 == 0 {
        page - 1
    } else {
        page.max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TabId(pub u64);

/// A tab reduced to what survives a session: its path and view state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabRecord {
    pub file_path: PathBuf,
    pub view: ViewState,
}

impl TabRecord {
    pub fn new(file_path: impl AsRef<Path>, view: ViewState) -> Self {
        Self { file_path: absolute_path(file_path), view }
    }
}

/// Makes `path` absolute against the working directory without touching the
/// filesystem. Paths that cannot be resolved are returned unchanged.
pub fn absolute_path(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
