//! Diagnostic screenshots taken when an action fails.
//!
//! Capturing is best-effort: errors are logged and never reach the caller of
//! the failed action.

use crate::errors::AutomationError;
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub trait ScreenCapture: Send + Sync {
    /// Captures the screen into `dir` and returns the written file.
    fn capture(&self, dir: &Path, label: &str) -> Result<PathBuf, AutomationError>;
}

/// Default folder for diagnostic captures.
pub fn default_screenshot_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("uiscout")
        .join("error_screenshots")
}

/// `<label>_<YYYYmmdd_HHMMSS>.png`, with the label reduced to file-safe characters.
pub fn screenshot_file_name(label: &str) -> String {
    let safe: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(60)
        .collect();
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    if safe.is_empty() {
        format!("error_{stamp}.png")
    } else {
        format!("{safe}_{stamp}.png")
    }
}

/// Primary-monitor capture through xcap.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonitorCapture;

impl ScreenCapture for MonitorCapture {
    #[cfg(any(target_os = "windows", target_os = "macos"))]
    fn capture(&self, dir: &Path, label: &str) -> Result<PathBuf, AutomationError> {
        let monitors = xcap::Monitor::all()
            .map_err(|e| AutomationError::PlatformError(format!("Failed to get monitors: {e}")))?;
        let mut primary = None;
        for monitor in monitors {
            if monitor.is_primary().unwrap_or(false) {
                primary = Some(monitor);
                break;
            }
        }
        let monitor = primary.ok_or_else(|| {
            AutomationError::PlatformError("Could not find primary monitor".to_string())
        })?;
        let image = monitor
            .capture_image()
            .map_err(|e| AutomationError::PlatformError(format!("Failed to capture screen: {e}")))?;
        std::fs::create_dir_all(dir)?;
        let path = dir.join(screenshot_file_name(label));
        image
            .save_with_format(&path, image::ImageFormat::Png)
            .map_err(|e| AutomationError::PlatformError(format!("Failed to save screenshot: {e}")))?;
        Ok(path)
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    fn capture(&self, _dir: &Path, _label: &str) -> Result<PathBuf, AutomationError> {
        Err(AutomationError::UnsupportedPlatform(
            "Screen capture is not available on this platform".to_string(),
        ))
    }
}

/// Capture that does nothing; used when screenshots are disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCapture;

impl ScreenCapture for NoopCapture {
    fn capture(&self, _dir: &Path, _label: &str) -> Result<PathBuf, AutomationError> {
        Err(AutomationError::UnsupportedOperation(
            "Screenshots are disabled".to_string(),
        ))
    }
}

/// Takes a capture, logging instead of failing.
pub fn take_error_screenshot(capture: &dyn ScreenCapture, dir: &Path, label: &str) -> Option<PathBuf> {
    match capture.capture(dir, label) {
        Ok(path) => {
            info!("Error screenshot saved to {}", path.display());
            Some(path)
        }
        Err(e) => {
            warn!("Could not take error screenshot: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FileCapture;

    impl ScreenCapture for FileCapture {
        fn capture(&self, dir: &Path, label: &str) -> Result<PathBuf, AutomationError> {
            let path = dir.join(screenshot_file_name(label));
            std::fs::write(&path, b"png")?;
            Ok(path)
        }
    }

    #[test]
    fn file_names_are_sanitized() {
        let name = screenshot_file_name("click: 'OK' button");
        assert!(name.starts_with("click___OK__button_"));
        assert!(name.ends_with(".png"));
        assert!(screenshot_file_name("").starts_with("error_"));
    }

    #[test]
    fn capture_failures_are_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        assert!(take_error_screenshot(&NoopCapture, dir.path(), "x").is_none());
        let written = take_error_screenshot(&FileCapture, dir.path(), "failed").unwrap();
        assert!(written.exists());
    }
}
