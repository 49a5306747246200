//! Named element properties and the accessor that reads them.
//!
//! Property names carry a category prefix (`pwa_`, `state_`, `win32_`, `geo_`,
//! `proc_`, `rel_`, `uia_`). The prefix decides the read path and the order in
//! which the finder evaluates filters: cheap reads first, pattern reads last.

use crate::element::{PatternProperty, StateFlag, UIElement};
use crate::errors::AutomationError;
use chrono::{Local, TimeZone};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, Users};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    PwaTitle,
    PwaAutoId,
    PwaControlType,
    PwaClassName,
    PwaFrameworkId,
    Win32Handle,
    Win32Styles,
    Win32ExtendedStyles,
    StateIsVisible,
    StateIsEnabled,
    StateIsActive,
    StateIsMinimized,
    StateIsMaximized,
    StateIsFocusable,
    StateIsPassword,
    StateIsOffscreen,
    StateIsContentElement,
    StateIsControlElement,
    GeoBoundingRectTuple,
    GeoCenterPoint,
    ProcName,
    ProcPid,
    ProcThreadId,
    ProcPath,
    ProcCmdline,
    ProcCreateTime,
    ProcUsername,
    RelLevel,
    RelParentHandle,
    RelParentTitle,
    RelLabeledBy,
    RelChildCount,
    UiaValue,
    UiaToggleState,
    UiaExpandState,
    UiaSelectionItems,
    UiaRangeValueInfo,
    UiaGridCellInfo,
    UiaTableRowHeaders,
}

const PROPERTY_NAMES: &[(Property, &str)] = &[
    (Property::PwaTitle, "pwa_title"),
    (Property::PwaAutoId, "pwa_auto_id"),
    (Property::PwaControlType, "pwa_control_type"),
    (Property::PwaClassName, "pwa_class_name"),
    (Property::PwaFrameworkId, "pwa_framework_id"),
    (Property::Win32Handle, "win32_handle"),
    (Property::Win32Styles, "win32_styles"),
    (Property::Win32ExtendedStyles, "win32_extended_styles"),
    (Property::StateIsVisible, "state_is_visible"),
    (Property::StateIsEnabled, "state_is_enabled"),
    (Property::StateIsActive, "state_is_active"),
    (Property::StateIsMinimized, "state_is_minimized"),
    (Property::StateIsMaximized, "state_is_maximized"),
    (Property::StateIsFocusable, "state_is_focusable"),
    (Property::StateIsPassword, "state_is_password"),
    (Property::StateIsOffscreen, "state_is_offscreen"),
    (Property::StateIsContentElement, "state_is_content_element"),
    (Property::StateIsControlElement, "state_is_control_element"),
    (Property::GeoBoundingRectTuple, "geo_bounding_rect_tuple"),
    (Property::GeoCenterPoint, "geo_center_point"),
    (Property::ProcName, "proc_name"),
    (Property::ProcPid, "proc_pid"),
    (Property::ProcThreadId, "proc_thread_id"),
    (Property::ProcPath, "proc_path"),
    (Property::ProcCmdline, "proc_cmdline"),
    (Property::ProcCreateTime, "proc_create_time"),
    (Property::ProcUsername, "proc_username"),
    (Property::RelLevel, "rel_level"),
    (Property::RelParentHandle, "rel_parent_handle"),
    (Property::RelParentTitle, "rel_parent_title"),
    (Property::RelLabeledBy, "rel_labeled_by"),
    (Property::RelChildCount, "rel_child_count"),
    (Property::UiaValue, "uia_value"),
    (Property::UiaToggleState, "uia_toggle_state"),
    (Property::UiaExpandState, "uia_expand_state"),
    (Property::UiaSelectionItems, "uia_selection_items"),
    (Property::UiaRangeValueInfo, "uia_range_value_info"),
    (Property::UiaGridCellInfo, "uia_grid_cell_info"),
    (Property::UiaTableRowHeaders, "uia_table_row_headers"),
];

/// Prefix category, declared in filter evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Pwa,
    State,
    Win32,
    Geo,
    Proc,
    Rel,
    Uia,
}

/// Platform fields that can be matched during enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeField {
    Title,
    ClassName,
    AutomationId,
    ControlType,
}

impl Property {
    pub fn all() -> impl Iterator<Item = Property> {
        PROPERTY_NAMES.iter().map(|(p, _)| *p)
    }

    pub fn name(&self) -> &'static str {
        PROPERTY_NAMES
            .iter()
            .find(|(p, _)| p == self)
            .map(|(_, n)| *n)
            .unwrap_or("unknown")
    }

    pub fn from_name(name: &str) -> Option<Property> {
        let lowered = name.to_lowercase();
        PROPERTY_NAMES
            .iter()
            .find(|(_, n)| *n == lowered)
            .map(|(p, _)| *p)
    }

    pub fn category(&self) -> Category {
        let name = self.name();
        if name.starts_with("pwa_") {
            Category::Pwa
        } else if name.starts_with("state_") {
            Category::State
        } else if name.starts_with("win32_") {
            Category::Win32
        } else if name.starts_with("geo_") {
            Category::Geo
        } else if name.starts_with("rel_") {
            Category::Rel
        } else if name.starts_with("uia_") {
            Category::Uia
        } else {
            Category::Proc
        }
    }

    /// Filter evaluation rank; lower runs first.
    pub fn priority(&self) -> usize {
        self.category() as usize
    }

    pub fn native_field(&self) -> Option<NativeField> {
        match self {
            Property::PwaTitle => Some(NativeField::Title),
            Property::PwaClassName => Some(NativeField::ClassName),
            Property::PwaAutoId => Some(NativeField::AutomationId),
            Property::PwaControlType => Some(NativeField::ControlType),
            _ => None,
        }
    }

    fn state_flag(&self) -> Option<StateFlag> {
        Some(match self {
            Property::StateIsVisible => StateFlag::Visible,
            Property::StateIsEnabled => StateFlag::Enabled,
            Property::StateIsActive => StateFlag::Active,
            Property::StateIsMinimized => StateFlag::Minimized,
            Property::StateIsMaximized => StateFlag::Maximized,
            Property::StateIsFocusable => StateFlag::Focusable,
            Property::StateIsPassword => StateFlag::Password,
            Property::StateIsOffscreen => StateFlag::Offscreen,
            Property::StateIsContentElement => StateFlag::ContentElement,
            Property::StateIsControlElement => StateFlag::ControlElement,
            _ => return None,
        })
    }

    fn pattern(&self) -> Option<PatternProperty> {
        Some(match self {
            Property::UiaValue => PatternProperty::Value,
            Property::UiaToggleState => PatternProperty::ToggleState,
            Property::UiaExpandState => PatternProperty::ExpandState,
            Property::UiaSelectionItems => PatternProperty::SelectionItems,
            Property::UiaRangeValueInfo => PatternProperty::RangeValueInfo,
            Property::UiaGridCellInfo => PatternProperty::GridCellInfo,
            Property::UiaTableRowHeaders => PatternProperty::TableRowHeaders,
            _ => return None,
        })
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Property {
    type Err = AutomationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Property::from_name(s)
            .ok_or_else(|| AutomationError::InvalidSpec(format!("Unsupported property '{s}'")))
    }
}

/// Process metadata resolved from a PID.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessInfo {
    pub name: String,
    pub path: String,
    pub cmdline: String,
    /// Local start time, `YYYY-MM-DD HH:MM:SS`.
    pub create_time: String,
    pub username: String,
}

/// Per-PID memo of process metadata. Owned by whoever runs the searches;
/// entries can be seeded up front for processes the system cannot describe.
#[derive(Debug, Default)]
pub struct ProcessInfoCache {
    entries: Mutex<HashMap<u32, ProcessInfo>>,
}

impl ProcessInfoCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, pid: u32, info: ProcessInfo) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(pid, info);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub fn get(&self, pid: u32) -> Option<ProcessInfo> {
        if pid == 0 {
            return None;
        }
        if let Ok(entries) = self.entries.lock() {
            if let Some(cached) = entries.get(&pid) {
                return Some(cached.clone());
            }
        }
        // Misses are not memoised; the process may still be starting.
        let info = query_process(pid)?;
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(pid, info.clone());
        }
        Some(info)
    }
}

fn query_process(pid: u32) -> Option<ProcessInfo> {
    let mut system = System::new();
    let sys_pid = Pid::from_u32(pid);
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[sys_pid]),
        true,
        ProcessRefreshKind::everything(),
    );
    let process = system.process(sys_pid)?;
    let username = process
        .user_id()
        .and_then(|uid| {
            let users = Users::new_with_refreshed_list();
            users.get_user_by_id(uid).map(|u| u.name().to_string())
        })
        .unwrap_or_default();
    let create_time = Local
        .timestamp_opt(process.start_time() as i64, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default();
    Some(ProcessInfo {
        name: process.name().to_string_lossy().to_string(),
        path: process
            .exe()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default(),
        cmdline: process
            .cmd()
            .iter()
            .map(|part| part.to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join(" "),
        create_time,
        username,
    })
}

/// Reads `property` from `element`. Unsupported or unreadable values (including
/// elements that went stale since enumeration) come back as `None`.
pub fn get_property(
    element: &UIElement,
    property: Property,
    processes: &ProcessInfoCache,
) -> Option<Value> {
    match read_property(element, property, processes) {
        Ok(value) => value,
        Err(e) => {
            debug!("Error getting property '{}': {}", property, e);
            None
        }
    }
}

fn read_property(
    element: &UIElement,
    property: Property,
    processes: &ProcessInfoCache,
) -> Result<Option<Value>, AutomationError> {
    if let Some(flag) = property.state_flag() {
        return Ok(Some(Value::Bool(element.state(flag)?)));
    }
    if let Some(pattern) = property.pattern() {
        return element.pattern_value(pattern);
    }
    let value = match property {
        Property::PwaTitle => json!(element.name()?),
        Property::PwaClassName => json!(element.class_name()?),
        Property::PwaAutoId => json!(element.automation_id()?),
        Property::PwaControlType => json!(element.control_type()?),
        Property::PwaFrameworkId => json!(element.framework_id()?),
        Property::Win32Handle => match handle_of(element)? {
            Some(handle) => json!(handle),
            None => return Ok(None),
        },
        Property::Win32Styles | Property::Win32ExtendedStyles => {
            if handle_of(element)?.is_none() {
                return Ok(None);
            }
            match element.window_styles()? {
                Some((style, _)) if property == Property::Win32Styles => json!(style),
                Some((_, ex_style)) => json!(ex_style),
                None => return Ok(None),
            }
        }
        Property::ProcThreadId => {
            if handle_of(element)?.is_none() {
                return Ok(None);
            }
            match element.thread_id()? {
                Some(tid) => json!(tid),
                None => return Ok(None),
            }
        }
        Property::RelParentHandle => {
            if handle_of(element)?.is_none() {
                return Ok(None);
            }
            let parent_handle = match element.parent()? {
                Some(parent) => parent.native_handle()?.unwrap_or(0),
                None => 0,
            };
            json!(parent_handle)
        }
        Property::GeoBoundingRectTuple => element.bounds()?.to_value(),
        Property::GeoCenterPoint => {
            let (x, y) = element.bounds()?.center();
            json!([x, y])
        }
        Property::ProcPid => json!(element.process_id()?),
        Property::ProcName
        | Property::ProcPath
        | Property::ProcCmdline
        | Property::ProcCreateTime
        | Property::ProcUsername => {
            let Some(info) = processes.get(element.process_id()?) else {
                return Ok(None);
            };
            json!(match property {
                Property::ProcName => info.name,
                Property::ProcPath => info.path,
                Property::ProcCmdline => info.cmdline,
                Property::ProcCreateTime => info.create_time,
                _ => info.username,
            })
        }
        Property::RelLevel => json!(element.depth()?),
        Property::RelParentTitle => match element.parent()? {
            Some(parent) => json!(parent.name()?),
            None => json!(""),
        },
        Property::RelLabeledBy => json!(element.labeled_by()?.unwrap_or_default()),
        Property::RelChildCount => json!(element.children()?.len()),
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn handle_of(element: &UIElement) -> Result<Option<i64>, AutomationError> {
    Ok(element.native_handle()?.filter(|h| *h != 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_property_round_trips_through_its_name() {
        for property in Property::all() {
            assert_eq!(Property::from_name(property.name()), Some(property));
        }
        assert_eq!(Property::from_name("PWA_TITLE"), Some(Property::PwaTitle));
        assert!(Property::from_name("sys_unique_id").is_none());
    }

    #[test]
    fn priority_follows_prefix_order() {
        assert!(Property::PwaTitle.priority() < Property::StateIsEnabled.priority());
        assert!(Property::StateIsEnabled.priority() < Property::Win32Handle.priority());
        assert!(Property::GeoCenterPoint.priority() < Property::ProcName.priority());
        assert!(Property::ProcName.priority() < Property::RelChildCount.priority());
        assert!(Property::RelChildCount.priority() < Property::UiaValue.priority());
    }

    #[test]
    fn only_four_properties_have_native_fields() {
        let native: Vec<_> = Property::all()
            .filter(|p| p.native_field().is_some())
            .collect();
        assert_eq!(native.len(), 4);
        assert!(Property::ProcName.native_field().is_none());
    }

    #[test]
    fn seeded_process_info_is_served_from_cache() {
        let cache = ProcessInfoCache::new();
        let info = ProcessInfo {
            name: "notepad.exe".into(),
            ..Default::default()
        };
        cache.insert(4242, info.clone());
        assert_eq!(cache.get(4242), Some(info));
        assert_eq!(cache.get(0), None);
    }
}
