use crate::element::UIElement;
use crate::errors::AutomationError;
use crate::property::NativeField;
use regex::Regex;
use std::sync::Arc;

pub mod memory;
#[cfg(target_os = "windows")]
pub mod windows;

/// A single native fast-path condition.
#[derive(Debug, Clone)]
pub enum NativeMatch {
    Exact(String),
    ExactIgnoreCase(String),
    Regex(Regex),
}

impl NativeMatch {
    pub fn matches(&self, actual: &str) -> bool {
        match self {
            NativeMatch::Exact(expected) => actual == expected,
            NativeMatch::ExactIgnoreCase(expected) => actual.to_lowercase() == expected.to_lowercase(),
            NativeMatch::Regex(re) => re.is_match(actual),
        }
    }
}

/// Conditions the platform applies while enumerating, before any
/// per-element filtering by the finder.
#[derive(Debug, Clone, Default)]
pub struct NativeFilter {
    pub title: Option<NativeMatch>,
    pub class_name: Option<NativeMatch>,
    pub automation_id: Option<NativeMatch>,
    pub control_type: Option<NativeMatch>,
}

impl NativeFilter {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.class_name.is_none()
            && self.automation_id.is_none()
            && self.control_type.is_none()
    }

    pub fn get(&self, field: NativeField) -> Option<&NativeMatch> {
        match field {
            NativeField::Title => self.title.as_ref(),
            NativeField::ClassName => self.class_name.as_ref(),
            NativeField::AutomationId => self.automation_id.as_ref(),
            NativeField::ControlType => self.control_type.as_ref(),
        }
    }

    pub fn set(&mut self, field: NativeField, condition: NativeMatch) {
        let slot = match field {
            NativeField::Title => &mut self.title,
            NativeField::ClassName => &mut self.class_name,
            NativeField::AutomationId => &mut self.automation_id,
            NativeField::ControlType => &mut self.control_type,
        };
        *slot = Some(condition);
    }

    /// Shared evaluator for backends. Unreadable fields fail the match.
    pub fn matches(&self, element: &UIElement) -> bool {
        let fields = [
            (NativeField::Title, &self.title),
            (NativeField::ClassName, &self.class_name),
            (NativeField::AutomationId, &self.automation_id),
            (NativeField::ControlType, &self.control_type),
        ];
        for (field, condition) in fields {
            let Some(condition) = condition else {
                continue;
            };
            let actual = match field {
                NativeField::Title => element.name(),
                NativeField::ClassName => element.class_name(),
                NativeField::AutomationId => element.automation_id(),
                NativeField::ControlType => element.control_type(),
            };
            match actual {
                Ok(actual) if condition.matches(&actual) => {}
                _ => return false,
            }
        }
        true
    }
}

/// The common trait that all platform-specific engines must implement
pub trait AccessibilityEngine: Send + Sync {
    /// Desktop root of the accessibility tree.
    fn root(&self) -> UIElement;

    /// Whether `element` is a desktop-like root that enumerates top-level windows.
    fn is_desktop(&self, element: &UIElement) -> bool {
        element.parent().map(|p| p.is_none()).unwrap_or(false)
    }

    /// Visible top-level windows matching `filter`, in z-order.
    fn top_level_windows(&self, filter: &NativeFilter) -> Result<Vec<UIElement>, AutomationError>;

    /// Descendants of `root` in pre-order, at most `max_depth` levels below it
    /// (`None` is unbounded), matching `filter`. The root itself is excluded.
    fn descendants(
        &self,
        root: &UIElement,
        max_depth: Option<usize>,
        filter: &NativeFilter,
    ) -> Result<Vec<UIElement>, AutomationError>;
}

/// Engine for the current platform.
pub fn create_engine() -> Result<Arc<dyn AccessibilityEngine>, AutomationError> {
    #[cfg(target_os = "windows")]
    {
        Ok(Arc::new(windows::WindowsEngine::new()?))
    }
    #[cfg(not(target_os = "windows"))]
    {
        Err(AutomationError::UnsupportedPlatform(
            "UI Automation is only available on Windows; use the memory engine elsewhere"
                .to_string(),
        ))
    }
}

/// Pre-order walk shared by backends that enumerate through `children()`.
pub(crate) fn walk_descendants(
    root: &UIElement,
    max_depth: Option<usize>,
    filter: &NativeFilter,
) -> Result<Vec<UIElement>, AutomationError> {
    let mut found = Vec::new();
    if max_depth == Some(0) {
        return Ok(found);
    }
    let mut stack: Vec<(UIElement, usize)> = root
        .children()?
        .into_iter()
        .rev()
        .map(|child| (child, 1))
        .collect();
    while let Some((node, depth)) = stack.pop() {
        if max_depth.map_or(true, |max| depth < max) {
            // Stale subtrees are skipped rather than failing the whole walk.
            if let Ok(children) = node.children() {
                stack.extend(children.into_iter().rev().map(|child| (child, depth + 1)));
            }
        }
        if filter.matches(&node) {
            found.push(node);
        }
    }
    Ok(found)
}
