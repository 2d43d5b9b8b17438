//! xcap-backed window lookup and capture
//!
//! Windows are matched by exact title. Activation is platform specific:
//! `SetForegroundWindow` on Windows, AppleScript on macOS and `xdotool` on X11.

use crate::window::{GameWindow, WindowError, WindowGeometry, WindowLocator};
use image::RgbaImage;
use xcap::Window;

fn all_windows() -> Result<Vec<Window>, WindowError> {
    Window::all().map_err(|e| WindowError::Enumerate(e.to_string()))
}

/// Titles of every visible top-level window, for `windows` and diagnostics.
pub fn list_titles() -> Result<Vec<String>, WindowError> {
    Ok(all_windows()?
        .iter()
        .filter_map(|w| w.title().ok())
        .filter(|t| !t.trim().is_empty())
        .collect())
}

/// Finds game windows among the desktop's top-level windows
#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopLocator;

impl DesktopLocator {
    pub fn new() -> Self {
        Self
    }
}

impl WindowLocator for DesktopLocator {
    fn find(&self, title: &str) -> Result<Box<dyn GameWindow>, WindowError> {
        let windows = all_windows()?;

        let found = windows
            .iter()
            .find(|w| w.title().is_ok_and(|t| t == title));

        let Some(window) = found else {
            let available = windows
                .iter()
                .filter_map(|w| w.title().ok())
                .filter(|t| !t.trim().is_empty())
                .collect();
            return Err(WindowError::NotFound {
                title: title.to_string(),
                available,
            });
        };

        let id = window
            .id()
            .map_err(|e| WindowError::Enumerate(e.to_string()))?;

        Ok(Box::new(DesktopWindow {
            id,
            title: title.to_string(),
            app_name: window.app_name().unwrap_or_default(),
        }))
    }
}

/// A located window, re-resolved by id on each call
#[derive(Debug, Clone)]
pub struct DesktopWindow {
    id: u32,
    title: String,
    app_name: String,
}

impl DesktopWindow {
    fn resolve(&self) -> Result<Window, WindowError> {
        all_windows()?
            .into_iter()
            .find(|w| w.id().is_ok_and(|id| id == self.id))
            .ok_or_else(|| WindowError::NotFound {
                title: self.title.clone(),
                available: vec![],
            })
    }

    fn activate_error(&self, reason: impl ToString) -> WindowError {
        WindowError::Activate {
            title: self.title.clone(),
            reason: reason.to_string(),
        }
    }

    #[cfg(target_os = "windows")]
    fn bring_to_front(&self) -> Result<(), WindowError> {
        use windows_sys::Win32::Foundation::HWND;
        use windows_sys::Win32::UI::WindowsAndMessaging::{
            IsIconic, SW_RESTORE, SetForegroundWindow, ShowWindow,
        };

        let hwnd = self.id as usize as HWND;
        // SAFETY: the handle came from the window enumeration; the calls
        // tolerate stale handles by returning zero.
        let ok = unsafe {
            if IsIconic(hwnd) != 0 {
                ShowWindow(hwnd, SW_RESTORE);
            }
            SetForegroundWindow(hwnd)
        };
        if ok == 0 {
            return Err(self.activate_error("SetForegroundWindow refused"));
        }
        Ok(())
    }

    #[cfg(target_os = "macos")]
    fn bring_to_front(&self) -> Result<(), WindowError> {
        if self.app_name.is_empty() {
            return Err(self.activate_error("owning application unknown"));
        }
        let script = format!(
            "tell application \"{}\" to activate",
            self.app_name.replace('"', "\\\"")
        );
        let output = std::process::Command::new("osascript")
            .arg("-e")
            .arg(&script)
            .output()
            .map_err(|e| self.activate_error(format!("osascript: {e}")))?;
        if !output.status.success() {
            return Err(self.activate_error(String::from_utf8_lossy(&output.stderr).trim()));
        }
        Ok(())
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    fn bring_to_front(&self) -> Result<(), WindowError> {
        let output = std::process::Command::new("xdotool")
            .args(["windowactivate", "--sync", &self.id.to_string()])
            .output()
            .map_err(|e| self.activate_error(format!("xdotool: {e}")))?;
        if !output.status.success() {
            return Err(self.activate_error(String::from_utf8_lossy(&output.stderr).trim()));
        }
        Ok(())
    }
}

impl GameWindow for DesktopWindow {
    fn title(&self) -> &str {
        &self.title
    }

    fn activate(&self) -> Result<(), WindowError> {
        self.bring_to_front()?;
        tracing::debug!(window = %self.title, app = %self.app_name, "activated");
        Ok(())
    }

    fn geometry(&self) -> Result<WindowGeometry, WindowError> {
        let window = self.resolve()?;
        let read = |e: xcap::XCapError| WindowError::Enumerate(e.to_string());
        Ok(WindowGeometry {
            x: window.x().map_err(read)?,
            y: window.y().map_err(read)?,
            width: window.width().map_err(read)?,
            height: window.height().map_err(read)?,
        })
    }

    fn capture(&self) -> Result<RgbaImage, WindowError> {
        let window = self.resolve()?;
        if window.is_minimized().unwrap_or(false) {
            return Err(WindowError::Capture {
                title: self.title.clone(),
                reason: "window is minimized".into(),
            });
        }
        window.capture_image().map_err(|e| WindowError::Capture {
            title: self.title.clone(),
            reason: e.to_string(),
        })
    }
}
