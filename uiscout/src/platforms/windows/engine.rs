#![allow(clippy::arc_with_non_send_sync)]

use super::{generate_element_id, init_com, ThreadSafeWinUIAutomation, ThreadSafeWinUIElement, WindowsUIElement};
use crate::element::UIElement;
use crate::errors::AutomationError;
use crate::platforms::{walk_descendants, AccessibilityEngine, NativeFilter, NativeMatch};
use crate::property::NativeField;
use std::sync::Arc;
use tracing::debug;
use uiautomation::controls::ControlType;
use uiautomation::core::UICondition;
use uiautomation::types::{PropertyConditionFlags, TreeScope, UIProperty};
use uiautomation::variants::Variant;
use uiautomation::UIAutomation;

/// UIA control type ids span this range.
const CONTROL_TYPE_IDS: std::ops::RangeInclusive<i32> = 50000..=50040;

pub struct WindowsEngine {
    automation: ThreadSafeWinUIAutomation,
    root: ThreadSafeWinUIElement,
}

impl WindowsEngine {
    pub fn new() -> Result<Self, AutomationError> {
        init_com()?;
        let automation = UIAutomation::new_direct()
            .map_err(|e| AutomationError::PlatformError(e.to_string()))?;
        let root = automation.get_root_element()?;
        debug!("UI Automation engine initialized");
        Ok(Self {
            automation: ThreadSafeWinUIAutomation(Arc::new(automation)),
            root: ThreadSafeWinUIElement(Arc::new(root)),
        })
    }

    /// UIA condition for the exact-match parts of `filter`. `None` when no
    /// field can be evaluated by the provider.
    fn native_condition(&self, filter: &NativeFilter) -> Result<Option<UICondition>, AutomationError> {
        let automation = &self.automation.0;
        let mut combined: Option<UICondition> = None;
        for field in [
            NativeField::ControlType,
            NativeField::AutomationId,
            NativeField::ClassName,
            NativeField::Title,
        ] {
            let Some(condition) = filter.get(field) else { continue };
            let (text, flags) = match condition {
                NativeMatch::Exact(text) => (text, None),
                NativeMatch::ExactIgnoreCase(text) => (text, Some(PropertyConditionFlags::IgnoreCase)),
                NativeMatch::Regex(_) => continue,
            };
            let next = match field {
                NativeField::ControlType => match control_type_id(text, flags.is_some()) {
                    Some(id) => automation.create_property_condition(UIProperty::ControlType, Variant::from(id), None)?,
                    None => {
                        debug!("Unknown control type '{}', matching in process", text);
                        continue;
                    }
                },
                NativeField::AutomationId => {
                    automation.create_property_condition(UIProperty::AutomationId, Variant::from(text.as_str()), flags)?
                }
                NativeField::ClassName => {
                    automation.create_property_condition(UIProperty::ClassName, Variant::from(text.as_str()), flags)?
                }
                NativeField::Title => {
                    automation.create_property_condition(UIProperty::Name, Variant::from(text.as_str()), flags)?
                }
            };
            combined = Some(match combined {
                Some(previous) => automation.create_and_condition(previous, next)?,
                None => next,
            });
        }
        Ok(combined)
    }

    fn wrap(&self, element: uiautomation::UIElement) -> UIElement {
        UIElement::new(Box::new(WindowsUIElement::new(
            element,
            self.automation.clone(),
        )))
    }
}

impl AccessibilityEngine for WindowsEngine {
    fn root(&self) -> UIElement {
        UIElement::new(Box::new(WindowsUIElement::from_parts(
            self.root.clone(),
            self.automation.clone(),
        )))
    }

    fn is_desktop(&self, element: &UIElement) -> bool {
        element.object_id() == generate_element_id(&self.root.0)
    }

    fn top_level_windows(&self, filter: &NativeFilter) -> Result<Vec<UIElement>, AutomationError> {
        let condition = match self.native_condition(filter)? {
            Some(condition) => condition,
            None => self.automation.0.create_true_condition()?,
        };
        let windows = self.root.0.find_all(TreeScope::Children, &condition)?;
        Ok(windows
            .into_iter()
            .map(|w| self.wrap(w))
            .filter(|w| w.is_visible() && filter.matches(w))
            .collect())
    }

    fn descendants(
        &self,
        root: &UIElement,
        max_depth: Option<usize>,
        filter: &NativeFilter,
    ) -> Result<Vec<UIElement>, AutomationError> {
        let Some(raw_root) = root.as_any().downcast_ref::<WindowsUIElement>() else {
            return walk_descendants(root, max_depth, filter);
        };
        let Some(condition) = self.native_condition(filter)? else {
            return walk_descendants(root, max_depth, filter);
        };
        let found = raw_root
            .get_raw_element()
            .find_all(TreeScope::Descendants, &condition)
            .map_err(|e| AutomationError::ElementNotFound(e.to_string()))?;
        let root_id = root.object_id();
        Ok(found
            .into_iter()
            .map(|e| self.wrap(e))
            .filter(|e| filter.matches(e))
            .filter(|e| max_depth.map_or(true, |depth| within_depth(e, root_id, depth)))
            .collect())
    }
}

/// Maps a control type name such as `Button` to its UIA id.
fn control_type_id(name: &str, ignore_case: bool) -> Option<i32> {
    CONTROL_TYPE_IDS.into_iter().find(|&id| {
        ControlType::try_from(id).map_or(false, |control_type| {
            let known = control_type.to_string();
            if ignore_case {
                known.eq_ignore_ascii_case(name)
            } else {
                known == name
            }
        })
    })
}

/// Whether `root_id` is reached within `max_depth` parent steps.
fn within_depth(element: &UIElement, root_id: usize, max_depth: usize) -> bool {
    let mut current = element.clone();
    for _ in 0..max_depth {
        match current.parent() {
            Ok(Some(parent)) if parent.object_id() == root_id => return true,
            Ok(Some(parent)) => current = parent,
            _ => return false,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_type_names_map_to_uia_ids() {
        assert_eq!(control_type_id("Button", false), Some(50000));
        assert_eq!(control_type_id("Window", false), Some(50032));
        assert_eq!(control_type_id("edit", true), Some(50004));
        assert_eq!(control_type_id("edit", false), None);
        assert_eq!(control_type_id("Gizmo", true), None);
    }
}
