use crate::errors::AutomationError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fmt::Debug;
use std::str::FromStr;
use tracing::{debug, instrument};

/// Upper bound when walking parents; trees deeper than this are treated as cyclic.
const MAX_PARENT_WALK: usize = 64;

/// Bounding rectangle in screen coordinates (left, top, right, bottom).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn center(&self) -> (i32, i32) {
        (
            (self.left + self.right) / 2,
            (self.top + self.bottom) / 2,
        )
    }

    /// True when `other` lies entirely inside this rectangle.
    pub fn contains(&self, other: &Rect) -> bool {
        other.left >= self.left
            && other.top >= self.top
            && other.right <= self.right
            && other.bottom <= self.bottom
    }

    pub fn vertical_overlap(&self, other: &Rect) -> i32 {
        (self.bottom.min(other.bottom) - self.top.max(other.top)).max(0)
    }

    pub fn horizontal_overlap(&self, other: &Rect) -> i32 {
        (self.right.min(other.right) - self.left.max(other.left)).max(0)
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!([self.left, self.top, self.right, self.bottom])
    }

    /// Parses `[l, t, r, b]` (numbers, fractional parts truncated).
    pub fn from_value(value: &Value) -> Option<Rect> {
        let items = value.as_array()?;
        if items.len() != 4 {
            return None;
        }
        let mut coords = [0i32; 4];
        for (slot, item) in coords.iter_mut().zip(items) {
            *slot = item.as_f64()? as i32;
        }
        Some(Rect::new(coords[0], coords[1], coords[2], coords[3]))
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.left, self.top, self.right, self.bottom
        )
    }
}

/// Boolean element states readable through the platform layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateFlag {
    Visible,
    Enabled,
    Active,
    Minimized,
    Maximized,
    Focusable,
    Password,
    Offscreen,
    ContentElement,
    ControlElement,
}

/// Values that only exist when the element supports a specific control pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternProperty {
    Value,
    ToggleState,
    ExpandState,
    SelectionItems,
    RangeValueInfo,
    GridCellInfo,
    TableRowHeaders,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl FromStr for ScrollDirection {
    type Err = AutomationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "up" => Ok(ScrollDirection::Up),
            "down" => Ok(ScrollDirection::Down),
            "left" => Ok(ScrollDirection::Left),
            "right" => Ok(ScrollDirection::Right),
            other => Err(AutomationError::InvalidArgument(format!(
                "Invalid scroll direction: '{other}'"
            ))),
        }
    }
}

impl fmt::Display for ScrollDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
            ScrollDirection::Left => "left",
            ScrollDirection::Right => "right",
        };
        f.write_str(s)
    }
}

/// Represents a UI element in a desktop application
#[derive(Debug)]
pub struct UIElement {
    inner: Box<dyn UIElementImpl>,
}

/// Interface for platform-specific element implementations
pub trait UIElementImpl: Send + Sync + Debug {
    /// Identity token, stable for the lifetime of the underlying native object.
    fn object_id(&self) -> usize;
    fn name(&self) -> Result<String, AutomationError>;
    fn class_name(&self) -> Result<String, AutomationError>;
    fn automation_id(&self) -> Result<String, AutomationError>;
    fn control_type(&self) -> Result<String, AutomationError>;
    fn framework_id(&self) -> Result<String, AutomationError>;
    /// Native window handle, `None` for windowless elements.
    fn native_handle(&self) -> Result<Option<i64>, AutomationError>;
    /// (style, extended style) of the native window.
    fn window_styles(&self) -> Result<Option<(i64, i64)>, AutomationError> {
        Ok(None)
    }
    fn thread_id(&self) -> Result<Option<u32>, AutomationError> {
        Ok(None)
    }
    fn process_id(&self) -> Result<u32, AutomationError>;
    fn bounds(&self) -> Result<Rect, AutomationError>;
    fn state(&self, flag: StateFlag) -> Result<bool, AutomationError>;
    fn children(&self) -> Result<Vec<UIElement>, AutomationError>;
    fn parent(&self) -> Result<Option<UIElement>, AutomationError>;
    fn labeled_by(&self) -> Result<Option<String>, AutomationError> {
        Ok(None)
    }
    fn pattern_value(&self, _pattern: PatternProperty) -> Result<Option<Value>, AutomationError> {
        Ok(None)
    }

    fn click(&self) -> Result<(), AutomationError>;
    fn double_click(&self) -> Result<(), AutomationError>;
    fn right_click(&self) -> Result<(), AutomationError>;
    fn focus(&self) -> Result<(), AutomationError>;
    fn invoke(&self) -> Result<(), AutomationError>;
    fn toggle(&self) -> Result<(), AutomationError>;
    fn set_text(&self, text: &str) -> Result<(), AutomationError>;
    fn type_keys(&self, keys: &str) -> Result<(), AutomationError>;
    fn paste_text(&self, text: &str) -> Result<(), AutomationError>;
    /// Deliver text through a window message; works on background windows.
    fn send_message_text(&self, text: &str) -> Result<(), AutomationError>;
    fn select(&self, item: &str) -> Result<(), AutomationError>;
    fn scroll(&self, direction: ScrollDirection, amount: u32) -> Result<(), AutomationError>;
    fn mouse_scroll(&self, direction: ScrollDirection) -> Result<(), AutomationError>;
    fn scroll_into_view(&self) -> Result<(), AutomationError>;
    fn maximize(&self) -> Result<(), AutomationError>;
    fn close(&self) -> Result<(), AutomationError>;

    fn as_any(&self) -> &dyn std::any::Any;
    fn clone_box(&self) -> Box<dyn UIElementImpl>;
}

impl UIElement {
    /// Create a new UI element from a platform-specific implementation
    pub fn new(impl_: Box<dyn UIElementImpl>) -> Self {
        Self { inner: impl_ }
    }

    pub fn object_id(&self) -> usize {
        self.inner.object_id()
    }

    pub fn name(&self) -> Result<String, AutomationError> {
        self.inner.name()
    }

    pub fn class_name(&self) -> Result<String, AutomationError> {
        self.inner.class_name()
    }

    pub fn automation_id(&self) -> Result<String, AutomationError> {
        self.inner.automation_id()
    }

    pub fn control_type(&self) -> Result<String, AutomationError> {
        self.inner.control_type()
    }

    pub fn framework_id(&self) -> Result<String, AutomationError> {
        self.inner.framework_id()
    }

    pub fn native_handle(&self) -> Result<Option<i64>, AutomationError> {
        self.inner.native_handle()
    }

    pub fn window_styles(&self) -> Result<Option<(i64, i64)>, AutomationError> {
        self.inner.window_styles()
    }

    pub fn thread_id(&self) -> Result<Option<u32>, AutomationError> {
        self.inner.thread_id()
    }

    pub fn process_id(&self) -> Result<u32, AutomationError> {
        self.inner.process_id()
    }

    pub fn bounds(&self) -> Result<Rect, AutomationError> {
        self.inner.bounds()
    }

    pub fn state(&self, flag: StateFlag) -> Result<bool, AutomationError> {
        self.inner.state(flag)
    }

    /// Visibility check that treats read failures (stale handles) as invisible.
    pub fn is_visible(&self) -> bool {
        self.inner.state(StateFlag::Visible).unwrap_or(false)
    }

    pub fn children(&self) -> Result<Vec<UIElement>, AutomationError> {
        self.inner.children()
    }

    pub fn parent(&self) -> Result<Option<UIElement>, AutomationError> {
        self.inner.parent()
    }

    pub fn labeled_by(&self) -> Result<Option<String>, AutomationError> {
        self.inner.labeled_by()
    }

    pub fn pattern_value(&self, pattern: PatternProperty) -> Result<Option<Value>, AutomationError> {
        self.inner.pattern_value(pattern)
    }

    /// Walks up to the element whose parent is the desktop root.
    /// A top-level window is its own top-level window; the root has none.
    pub fn top_level_window(&self) -> Result<Option<UIElement>, AutomationError> {
        let mut current = self.clone();
        let Some(mut parent) = current.parent()? else {
            return Ok(None);
        };
        for _ in 0..MAX_PARENT_WALK {
            match parent.parent()? {
                None => return Ok(Some(current)),
                Some(grand) => {
                    current = parent;
                    parent = grand;
                }
            }
        }
        Err(AutomationError::Internal(format!(
            "Parent chain of {} exceeds {MAX_PARENT_WALK} levels",
            self.display_text()
        )))
    }

    /// Number of parent hops to the desktop root (the root itself is level 0).
    pub fn depth(&self) -> Result<usize, AutomationError> {
        let mut level = 0;
        let mut current = self.parent()?;
        while let Some(node) = current {
            level += 1;
            if level > MAX_PARENT_WALK {
                break;
            }
            current = node.parent()?;
        }
        Ok(level)
    }

    /// Readable identifier for diagnostics: the title, or the control type when untitled.
    pub fn display_text(&self) -> String {
        match self.inner.name() {
            Ok(name) if !name.is_empty() => format!("'{name}'"),
            _ => format!(
                "<unnamed {}>",
                self.inner
                    .control_type()
                    .unwrap_or_else(|_| "element".to_string())
            ),
        }
    }

    #[instrument(level = "debug", skip(self))]
    pub fn click(&self) -> Result<(), AutomationError> {
        self.inner.click()
    }

    #[instrument(level = "debug", skip(self))]
    pub fn double_click(&self) -> Result<(), AutomationError> {
        self.inner.double_click()
    }

    #[instrument(level = "debug", skip(self))]
    pub fn right_click(&self) -> Result<(), AutomationError> {
        self.inner.right_click()
    }

    pub fn focus(&self) -> Result<(), AutomationError> {
        self.inner.focus()
    }

    pub fn invoke(&self) -> Result<(), AutomationError> {
        self.inner.invoke()
    }

    pub fn toggle(&self) -> Result<(), AutomationError> {
        self.inner.toggle()
    }

    pub fn set_text(&self, text: &str) -> Result<(), AutomationError> {
        self.inner.set_text(text)
    }

    pub fn type_keys(&self, keys: &str) -> Result<(), AutomationError> {
        self.inner.type_keys(keys)
    }

    pub fn paste_text(&self, text: &str) -> Result<(), AutomationError> {
        self.inner.paste_text(text)
    }

    pub fn send_message_text(&self, text: &str) -> Result<(), AutomationError> {
        self.inner.send_message_text(text)
    }

    pub fn select(&self, item: &str) -> Result<(), AutomationError> {
        self.inner.select(item)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn scroll(&self, direction: ScrollDirection, amount: u32) -> Result<(), AutomationError> {
        self.inner.scroll(direction, amount)
    }

    pub fn mouse_scroll(&self, direction: ScrollDirection) -> Result<(), AutomationError> {
        self.inner.mouse_scroll(direction)
    }

    pub fn scroll_into_view(&self) -> Result<(), AutomationError> {
        self.inner.scroll_into_view()
    }

    pub fn maximize(&self) -> Result<(), AutomationError> {
        debug!("Maximizing {}", self.display_text());
        self.inner.maximize()
    }

    pub fn close(&self) -> Result<(), AutomationError> {
        self.inner.close()
    }

    /// Access the platform implementation, e.g. to downcast in backend-specific code.
    pub fn as_any(&self) -> &dyn std::any::Any {
        self.inner.as_any()
    }
}

impl PartialEq for UIElement {
    fn eq(&self, other: &Self) -> bool {
        self.inner.object_id() == other.inner.object_id()
    }
}

impl Eq for UIElement {}

impl std::hash::Hash for UIElement {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.object_id().hash(state);
    }
}

impl Clone for UIElement {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_box(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_containment_is_inclusive() {
        let outer = Rect::new(0, 0, 100, 100);
        assert!(outer.contains(&Rect::new(0, 0, 100, 100)));
        assert!(outer.contains(&Rect::new(10, 10, 20, 20)));
        assert!(!outer.contains(&Rect::new(90, 90, 110, 100)));
    }

    #[test]
    fn rect_overlap_never_negative() {
        let a = Rect::new(0, 0, 100, 100);
        let b = Rect::new(150, 200, 250, 300);
        assert_eq!(a.vertical_overlap(&b), 0);
        assert_eq!(a.horizontal_overlap(&b), 0);
        let c = Rect::new(150, 50, 250, 80);
        assert_eq!(a.vertical_overlap(&c), 30);
    }

    #[test]
    fn rect_from_value_requires_four_numbers() {
        let rect = Rect::from_value(&serde_json::json!([1, 2.7, 3, 4])).unwrap();
        assert_eq!(rect, Rect::new(1, 2, 3, 4));
        assert!(Rect::from_value(&serde_json::json!([1, 2, 3])).is_none());
        assert!(Rect::from_value(&serde_json::json!(["a", 2, 3, 4])).is_none());
    }

    #[test]
    fn scroll_direction_parsing() {
        assert_eq!(
            " Down ".parse::<ScrollDirection>().unwrap(),
            ScrollDirection::Down
        );
        assert!("sideways".parse::<ScrollDirection>().is_err());
    }
}
