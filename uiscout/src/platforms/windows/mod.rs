//! Windows platform implementation for UI automation
//!
//! This module provides Windows-specific UI automation functionality using
//! the Windows UI Automation API through the uiautomation crate.

pub mod element;
pub mod engine;

pub use element::WindowsUIElement;
pub use engine::WindowsEngine;

use crate::errors::AutomationError;
use std::sync::Arc;

/// Thread-safe wrapper for UIAutomation COM object
#[derive(Clone)]
pub(crate) struct ThreadSafeWinUIAutomation(pub(crate) Arc<uiautomation::UIAutomation>);

// Safety: UIAutomation is thread-safe after proper COM initialization
unsafe impl Send for ThreadSafeWinUIAutomation {}
unsafe impl Sync for ThreadSafeWinUIAutomation {}

/// Thread-safe wrapper for UIElement
#[derive(Clone)]
pub(crate) struct ThreadSafeWinUIElement(pub(crate) Arc<uiautomation::UIElement>);

// Safety: UIElement is thread-safe when wrapped properly
unsafe impl Send for ThreadSafeWinUIElement {}
unsafe impl Sync for ThreadSafeWinUIElement {}

impl From<uiautomation::Error> for AutomationError {
    fn from(error: uiautomation::Error) -> Self {
        AutomationError::PlatformError(format!("UIAutomation error: {error}"))
    }
}

/// Initializes COM for the calling thread, tolerating an existing apartment.
pub(crate) fn init_com() -> Result<(), AutomationError> {
    use windows::core::HRESULT;
    use windows::Win32::System::Com::{CoInitializeEx, COINIT_MULTITHREADED};

    unsafe {
        let hr = CoInitializeEx(None, COINIT_MULTITHREADED);
        // RPC_E_CHANGED_MODE: already initialized with another model
        if hr.is_err() && hr != HRESULT(0x80010106u32 as i32) {
            return Err(AutomationError::PlatformError(format!(
                "Failed to initialize COM in multithreaded mode: {hr}"
            )));
        }
    }
    Ok(())
}

/// Identity token derived from the UIA runtime id.
pub(crate) fn generate_element_id(element: &uiautomation::UIElement) -> usize {
    let to_hash = match element.get_runtime_id() {
        Ok(runtime_id) => format!("{runtime_id:?}"),
        // No runtime id: hash the descriptive properties and position instead.
        Err(_) => {
            let rect = element
                .get_bounding_rectangle()
                .map(|r| format!("{}:{}:{}:{}", r.get_left(), r.get_top(), r.get_width(), r.get_height()))
                .unwrap_or_default();
            format!(
                "{}|{}|{}|{}",
                element.get_automation_id().unwrap_or_default(),
                element.get_classname().unwrap_or_default(),
                element.get_name().unwrap_or_default(),
                rect
            )
        }
    };
    let hash = blake3::hash(to_hash.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes) as usize
}
