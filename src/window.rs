//! Game window lookup, activation and capture
//!
//! The traits here are the seam between the automation core and the desktop.
//! The xcap-backed implementation lives in `desktop` behind the `desktop`
//! feature.

use image::RgbaImage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("no window titled {title:?} ({} other windows visible)", available.len())]
    NotFound {
        title: String,
        available: Vec<String>,
    },
    #[error("failed to enumerate windows: {0}")]
    Enumerate(String),
    #[error("failed to activate {title:?}: {reason}")]
    Activate { title: String, reason: String },
    #[error("failed to capture {title:?}: {reason}")]
    Capture { title: String, reason: String },
}

/// Screen position and size of a window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowGeometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Handle to a foreign top-level window.
///
/// Geometry is re-read on every call since the window may move between cycles.
pub trait GameWindow: Send + Sync {
    fn title(&self) -> &str;

    /// Bring the window to the foreground so it receives keystrokes.
    fn activate(&self) -> Result<(), WindowError>;

    fn geometry(&self) -> Result<WindowGeometry, WindowError>;

    fn capture(&self) -> Result<RgbaImage, WindowError>;
}

/// Finds windows by exact title
pub trait WindowLocator: Send + Sync {
    fn find(&self, title: &str) -> Result<Box<dyn GameWindow>, WindowError>;
}
