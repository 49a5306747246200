//! Windows UI Element implementation

use super::{generate_element_id, ThreadSafeWinUIAutomation, ThreadSafeWinUIElement};
use crate::element::{PatternProperty, Rect, ScrollDirection, StateFlag, UIElement, UIElementImpl};
use crate::errors::AutomationError;
use serde_json::{json, Value};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uiautomation::inputs::Mouse;
use uiautomation::patterns;
use uiautomation::types::{Point, ScrollAmount, ToggleState, TreeScope, UIProperty, WindowVisualState};
use windows::Win32::Foundation::{HWND, LPARAM};
use windows::Win32::UI::WindowsAndMessaging::{
    GetForegroundWindow, GetWindowLongW, GetWindowThreadProcessId, IsIconic, IsZoomed,
    SendMessageW, ShowWindow, GWL_EXSTYLE, GWL_STYLE, SW_MAXIMIZE, WM_SETTEXT,
};

/// Wheel notches sent by `mouse_scroll`.
const WHEEL_NOTCHES: i32 = 5;
const WHEEL_DELTA: i32 = 120;
/// How far up the tree `scroll` looks for a scrollable container.
const SCROLL_SEARCH_LEVELS: usize = 7;

pub struct WindowsUIElement {
    pub(crate) element: ThreadSafeWinUIElement,
    automation: ThreadSafeWinUIAutomation,
}

impl WindowsUIElement {
    #[allow(clippy::arc_with_non_send_sync)]
    pub(crate) fn new(element: uiautomation::UIElement, automation: ThreadSafeWinUIAutomation) -> Self {
        Self {
            element: ThreadSafeWinUIElement(Arc::new(element)),
            automation,
        }
    }

    pub(crate) fn from_parts(
        element: ThreadSafeWinUIElement,
        automation: ThreadSafeWinUIAutomation,
    ) -> Self {
        Self {
            element,
            automation,
        }
    }

    /// Get the raw UI element for direct automation
    pub fn get_raw_element(&self) -> &uiautomation::UIElement {
        &self.element.0
    }

    fn wrap(&self, element: uiautomation::UIElement) -> UIElement {
        UIElement::new(Box::new(WindowsUIElement::new(
            element,
            self.automation.clone(),
        )))
    }

    fn hwnd(&self) -> Option<HWND> {
        let handle = self.element.0.get_native_window_handle().ok()?;
        let hwnd: HWND = handle.into();
        if hwnd.0.is_null() {
            None
        } else {
            Some(hwnd)
        }
    }

    fn bool_property(&self, property: UIProperty) -> Result<bool, AutomationError> {
        let variant = self.element.0.get_property_value(property)?;
        variant.try_into().map_err(|e| {
            AutomationError::PlatformError(format!("Failed to convert {property:?} to bool: {e:?}"))
        })
    }

    fn click_point(&self) -> Result<Point, AutomationError> {
        if let Ok(Some(point)) = self.element.0.get_clickable_point() {
            return Ok(point);
        }
        let rect = self.element.0.get_bounding_rectangle()?;
        Ok(Point::new(
            rect.get_left() + rect.get_width() / 2,
            rect.get_top() + rect.get_height() / 2,
        ))
    }

    fn names_of(elements: Vec<uiautomation::UIElement>) -> Value {
        Value::from(
            elements
                .iter()
                .map(|e| e.get_name().unwrap_or_default())
                .collect::<Vec<_>>(),
        )
    }

    fn read_pattern(&self, pattern: PatternProperty) -> Result<Option<Value>, AutomationError> {
        let element = &self.element.0;
        Ok(match pattern {
            PatternProperty::Value => match element.get_pattern::<patterns::UIValuePattern>() {
                Ok(p) => Some(json!(p.get_value()?)),
                Err(_) => None,
            },
            PatternProperty::ToggleState => match element.get_pattern::<patterns::UITogglePattern>() {
                Ok(p) => Some(json!(match p.get_toggle_state()? {
                    ToggleState::On => "On",
                    ToggleState::Off => "Off",
                    _ => "Indeterminate",
                })),
                Err(_) => None,
            },
            PatternProperty::ExpandState => {
                if element
                    .get_pattern::<patterns::UIExpandCollapsePattern>()
                    .is_err()
                {
                    return Ok(None);
                }
                let state: i32 = element
                    .get_property_value(UIProperty::ExpandCollapseExpandCollapseState)?
                    .try_into()
                    .map_err(|_| {
                        AutomationError::PlatformError(
                            "Failed to convert expand/collapse state variant to i32".to_string(),
                        )
                    })?;
                Some(json!(match state {
                    0 => "Collapsed",
                    1 => "Expanded",
                    2 => "PartiallyExpanded",
                    _ => "LeafNode",
                }))
            }
            PatternProperty::SelectionItems => match element.get_pattern::<patterns::UISelectionPattern>() {
                Ok(p) => Some(Self::names_of(p.get_selection()?)),
                Err(_) => None,
            },
            PatternProperty::RangeValueInfo => match element.get_pattern::<patterns::UIRangeValuePattern>() {
                Ok(p) => Some(json!({
                    "value": p.get_value()?,
                    "min": p.get_minimum()?,
                    "max": p.get_maximum()?,
                })),
                Err(_) => None,
            },
            PatternProperty::GridCellInfo => match element.get_pattern::<patterns::UIGridItemPattern>() {
                Ok(p) => Some(json!({
                    "row": p.get_row()?,
                    "column": p.get_column()?,
                })),
                Err(_) => None,
            },
            PatternProperty::TableRowHeaders => match element.get_pattern::<patterns::UITablePattern>() {
                Ok(p) => Some(Self::names_of(p.get_row_headers()?)),
                Err(_) => None,
            },
        })
    }

    fn find_scrollable(&self) -> Option<uiautomation::UIElement> {
        let walker = self.automation.0.get_raw_view_walker().ok()?;
        let mut current = self.element.0.as_ref().clone();
        for _ in 0..SCROLL_SEARCH_LEVELS {
            if current.get_pattern::<patterns::UIScrollPattern>().is_ok() {
                return Some(current);
            }
            current = walker.get_parent(&current).ok()?;
        }
        None
    }
}

impl Debug for WindowsUIElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowsUIElement")
            .field("name", &self.element.0.get_name().unwrap_or_default())
            .finish()
    }
}

impl UIElementImpl for WindowsUIElement {
    fn object_id(&self) -> usize {
        generate_element_id(&self.element.0)
    }

    fn name(&self) -> Result<String, AutomationError> {
        Ok(self.element.0.get_name()?)
    }

    fn class_name(&self) -> Result<String, AutomationError> {
        Ok(self.element.0.get_classname()?)
    }

    fn automation_id(&self) -> Result<String, AutomationError> {
        Ok(self.element.0.get_automation_id()?)
    }

    fn control_type(&self) -> Result<String, AutomationError> {
        Ok(self.element.0.get_control_type()?.to_string())
    }

    fn framework_id(&self) -> Result<String, AutomationError> {
        Ok(self.element.0.get_framework_id()?)
    }

    fn native_handle(&self) -> Result<Option<i64>, AutomationError> {
        Ok(self.hwnd().map(|hwnd| hwnd.0 as isize as i64))
    }

    fn window_styles(&self) -> Result<Option<(i64, i64)>, AutomationError> {
        let Some(hwnd) = self.hwnd() else {
            return Ok(None);
        };
        let (style, ex_style) = unsafe { (GetWindowLongW(hwnd, GWL_STYLE), GetWindowLongW(hwnd, GWL_EXSTYLE)) };
        Ok(Some((style as u32 as i64, ex_style as u32 as i64)))
    }

    fn thread_id(&self) -> Result<Option<u32>, AutomationError> {
        let Some(hwnd) = self.hwnd() else {
            return Ok(None);
        };
        let tid = unsafe { GetWindowThreadProcessId(hwnd, None) };
        Ok((tid != 0).then_some(tid))
    }

    fn process_id(&self) -> Result<u32, AutomationError> {
        Ok(self.element.0.get_process_id()? as u32)
    }

    fn bounds(&self) -> Result<Rect, AutomationError> {
        let rect = self.element.0.get_bounding_rectangle()?;
        Ok(Rect::new(
            rect.get_left(),
            rect.get_top(),
            rect.get_right(),
            rect.get_bottom(),
        ))
    }

    fn state(&self, flag: StateFlag) -> Result<bool, AutomationError> {
        match flag {
            StateFlag::Visible => Ok(!self.element.0.is_offscreen()?),
            StateFlag::Enabled => Ok(self.element.0.is_enabled()?),
            StateFlag::Active => match self.hwnd() {
                Some(hwnd) => Ok(unsafe { GetForegroundWindow() } == hwnd),
                None => self.bool_property(UIProperty::HasKeyboardFocus),
            },
            StateFlag::Minimized => Ok(self
                .hwnd()
                .map(|hwnd| unsafe { IsIconic(hwnd) }.as_bool())
                .unwrap_or(false)),
            StateFlag::Maximized => Ok(self
                .hwnd()
                .map(|hwnd| unsafe { IsZoomed(hwnd) }.as_bool())
                .unwrap_or(false)),
            StateFlag::Focusable => self.bool_property(UIProperty::IsKeyboardFocusable),
            StateFlag::Password => self.bool_property(UIProperty::IsPassword),
            StateFlag::Offscreen => Ok(self.element.0.is_offscreen()?),
            StateFlag::ContentElement => self.bool_property(UIProperty::IsContentElement),
            StateFlag::ControlElement => self.bool_property(UIProperty::IsControlElement),
        }
    }

    fn children(&self) -> Result<Vec<UIElement>, AutomationError> {
        let condition = self.automation.0.create_true_condition()?;
        let children = self.element.0.find_all(TreeScope::Children, &condition)?;
        Ok(children.into_iter().map(|c| self.wrap(c)).collect())
    }

    fn parent(&self) -> Result<Option<UIElement>, AutomationError> {
        let walker = self.automation.0.get_raw_view_walker()?;
        match walker.get_parent(&self.element.0) {
            Ok(parent) => Ok(Some(self.wrap(parent))),
            Err(e) => {
                // The desktop root has no parent.
                debug!("TreeWalker get_parent failed: {}", e);
                Ok(None)
            }
        }
    }

    fn labeled_by(&self) -> Result<Option<String>, AutomationError> {
        match self.element.0.get_labeled_by() {
            Ok(label) => Ok(Some(label.get_name()?)),
            Err(_) => Ok(None),
        }
    }

    fn pattern_value(&self, pattern: PatternProperty) -> Result<Option<Value>, AutomationError> {
        self.read_pattern(pattern)
    }

    fn click(&self) -> Result<(), AutomationError> {
        if self.element.0.click().is_ok() {
            return Ok(());
        }
        debug!("UIA click failed, clicking at element point");
        Mouse::default().click(self.click_point()?)?;
        Ok(())
    }

    fn double_click(&self) -> Result<(), AutomationError> {
        Mouse::default().double_click(self.click_point()?)?;
        Ok(())
    }

    fn right_click(&self) -> Result<(), AutomationError> {
        Mouse::default().right_click(self.click_point()?)?;
        Ok(())
    }

    fn focus(&self) -> Result<(), AutomationError> {
        Ok(self.element.0.set_focus()?)
    }

    fn invoke(&self) -> Result<(), AutomationError> {
        let pattern = self
            .element
            .0
            .get_pattern::<patterns::UIInvokePattern>()
            .map_err(|e| AutomationError::ActionFailed(format!("Element does not support InvokePattern: {e}")))?;
        Ok(pattern.invoke()?)
    }

    fn toggle(&self) -> Result<(), AutomationError> {
        let pattern = self
            .element
            .0
            .get_pattern::<patterns::UITogglePattern>()
            .map_err(|e| AutomationError::ActionFailed(format!("Element does not support TogglePattern: {e}")))?;
        Ok(pattern.toggle()?)
    }

    fn set_text(&self, text: &str) -> Result<(), AutomationError> {
        let pattern = self
            .element
            .0
            .get_pattern::<patterns::UIValuePattern>()
            .map_err(|e| AutomationError::ActionFailed(format!("Element does not support ValuePattern: {e}")))?;
        Ok(pattern.set_value(text)?)
    }

    fn type_keys(&self, keys: &str) -> Result<(), AutomationError> {
        Ok(self.element.0.send_keys(keys, 10)?)
    }

    fn paste_text(&self, text: &str) -> Result<(), AutomationError> {
        // Keep the operator's clipboard intact around the paste.
        let previous = arboard::Clipboard::new()
            .ok()
            .and_then(|mut clipboard| clipboard.get_text().ok());
        let result = self.element.0.send_text_by_clipboard(text);
        if let Some(previous) = previous {
            std::thread::sleep(Duration::from_millis(100));
            if let Ok(mut clipboard) = arboard::Clipboard::new() {
                if let Err(e) = clipboard.set_text(previous) {
                    warn!("Failed to restore clipboard: {e}");
                }
            }
        }
        Ok(result?)
    }

    fn send_message_text(&self, text: &str) -> Result<(), AutomationError> {
        let hwnd = self.hwnd().ok_or_else(|| {
            AutomationError::ActionFailed("send_message_text requires a native window handle".to_string())
        })?;
        let wide: Vec<u16> = text.encode_utf16().chain(std::iter::once(0)).collect();
        unsafe {
            SendMessageW(hwnd, WM_SETTEXT, None, Some(LPARAM(wide.as_ptr() as isize)));
        }
        Ok(())
    }

    fn select(&self, item: &str) -> Result<(), AutomationError> {
        if let Ok(pattern) = self.element.0.get_pattern::<patterns::UIExpandCollapsePattern>() {
            let _ = pattern.expand();
            std::thread::sleep(Duration::from_millis(200));
        }
        let condition = self
            .automation
            .0
            .create_property_condition(UIProperty::Name, item.into(), None)?;
        let option = self
            .element
            .0
            .find_first(TreeScope::Descendants, &condition)
            .map_err(|e| AutomationError::ActionFailed(format!("Item '{item}' not found: {e}")))?;
        match option.get_pattern::<patterns::UISelectionItemPattern>() {
            Ok(pattern) => pattern.select()?,
            Err(_) => {
                debug!("SelectionItemPattern not available for '{}', clicking", item);
                option.click()?
            }
        }
        Ok(())
    }

    fn scroll(&self, direction: ScrollDirection, amount: u32) -> Result<(), AutomationError> {
        let target = self.find_scrollable().ok_or_else(|| {
            AutomationError::ScrollFailed("No scrollable container found".to_string())
        })?;
        let pattern = target.get_pattern::<patterns::UIScrollPattern>()?;
        let (horizontal, vertical) = match direction {
            ScrollDirection::Up => (ScrollAmount::NoAmount, ScrollAmount::LargeDecrement),
            ScrollDirection::Down => (ScrollAmount::NoAmount, ScrollAmount::LargeIncrement),
            ScrollDirection::Left => (ScrollAmount::LargeDecrement, ScrollAmount::NoAmount),
            ScrollDirection::Right => (ScrollAmount::LargeIncrement, ScrollAmount::NoAmount),
        };
        for _ in 0..amount.max(1) {
            pattern
                .scroll(horizontal, vertical)
                .map_err(|e| AutomationError::ScrollFailed(e.to_string()))?;
            std::thread::sleep(Duration::from_millis(50));
        }
        Ok(())
    }

    fn mouse_scroll(&self, direction: ScrollDirection) -> Result<(), AutomationError> {
        use windows::Win32::UI::Input::KeyboardAndMouse::{
            SendInput, INPUT, INPUT_0, INPUT_MOUSE, MOUSEEVENTF_HWHEEL, MOUSEEVENTF_WHEEL, MOUSEINPUT,
        };

        let rect = self.bounds()?;
        let (x, y) = rect.center();
        Mouse::default().move_to(Point::new(x, y))?;
        let (flags, delta) = match direction {
            ScrollDirection::Up => (MOUSEEVENTF_WHEEL, WHEEL_NOTCHES * WHEEL_DELTA),
            ScrollDirection::Down => (MOUSEEVENTF_WHEEL, -WHEEL_NOTCHES * WHEEL_DELTA),
            ScrollDirection::Left => (MOUSEEVENTF_HWHEEL, -WHEEL_NOTCHES * WHEEL_DELTA),
            ScrollDirection::Right => (MOUSEEVENTF_HWHEEL, WHEEL_NOTCHES * WHEEL_DELTA),
        };
        let input = INPUT {
            r#type: INPUT_MOUSE,
            Anonymous: INPUT_0 {
                mi: MOUSEINPUT {
                    dx: 0,
                    dy: 0,
                    mouseData: delta as _,
                    dwFlags: flags,
                    time: 0,
                    dwExtraInfo: 0,
                },
            },
        };
        unsafe {
            SendInput(&[input], std::mem::size_of::<INPUT>() as i32);
        }
        Ok(())
    }

    fn scroll_into_view(&self) -> Result<(), AutomationError> {
        let pattern = self
            .element
            .0
            .get_pattern::<patterns::UIScrollItemPattern>()
            .map_err(|e| AutomationError::ScrollFailed(e.to_string()))?;
        Ok(pattern.scroll_into_view()?)
    }

    fn maximize(&self) -> Result<(), AutomationError> {
        if let Ok(window_pattern) = self.element.0.get_pattern::<patterns::UIWindowPattern>() {
            window_pattern.set_window_visual_state(WindowVisualState::Maximized)?;
            return Ok(());
        }
        let hwnd = self.hwnd().ok_or_else(|| {
            AutomationError::UnsupportedOperation("Element has no WindowPattern and no window handle".to_string())
        })?;
        unsafe {
            let _ = ShowWindow(hwnd, SW_MAXIMIZE);
        }
        Ok(())
    }

    fn close(&self) -> Result<(), AutomationError> {
        if let Ok(window_pattern) = self.element.0.get_pattern::<patterns::UIWindowPattern>() {
            if window_pattern.close().is_ok() {
                return Ok(());
            }
        }
        debug!("WindowPattern close unavailable, sending Alt+F4");
        self.element.0.try_focus();
        Ok(self.element.0.send_keys("%{F4}", 10)?)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn clone_box(&self) -> Box<dyn UIElementImpl> {
        Box::new(WindowsUIElement {
            element: self.element.clone(),
            automation: self.automation.clone(),
        })
    }
}
