//! Building specifications from captured element properties.
//!
//! Inspector tools capture a flat property map per element (see
//! [`get_all_properties`]); the functions here turn a selected map into the
//! shortest specification that still identifies it among its peers.

use crate::element::UIElement;
use crate::property::{get_property, Property, ProcessInfoCache};
use serde_json::{Map, Value};
use tracing::{info, warn};

/// Identity key added to captured maps; never part of a specification.
pub const UNIQUE_ID_KEY: &str = "sys_unique_id";

const ELEMENT_COMBINATIONS: &[&[&str]] = &[
    &["pwa_auto_id"],
    &["pwa_title", "pwa_control_type"],
    &["pwa_title"],
    &["pwa_class_name", "pwa_control_type"],
    &["pwa_class_name"],
];

/// Kept values: anything non-empty, plus `false` and zero.
fn is_meaningful(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(_) | Value::Number(_) => true,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

/// Every readable property of `element`, plus its identity under `sys_unique_id`.
pub fn get_all_properties(element: &UIElement, processes: &ProcessInfoCache) -> Map<String, Value> {
    let mut properties = Map::new();
    for property in Property::all() {
        if let Some(value) = get_property(element, property, processes) {
            if is_meaningful(&value) {
                properties.insert(property.name().to_string(), value);
            }
        }
    }
    for (property, key) in [(Property::PwaTitle, "pwa_title"), (Property::PwaClassName, "pwa_class_name")] {
        if !properties.contains_key(key) {
            if let Some(value) = get_property(element, property, processes) {
                properties.insert(key.to_string(), value);
            }
        }
    }
    properties.insert(UNIQUE_ID_KEY.to_string(), Value::from(element.object_id() as u64));
    properties
}

fn matches_all(candidate: &Map<String, Value>, spec: &Map<String, Value>) -> bool {
    spec.iter().all(|(key, value)| candidate.get(key) == Some(value))
}

/// 1-based position of `selected` among `matches`, by unique id.
fn scan_position(selected: &Map<String, Value>, matches: &[&Map<String, Value>]) -> Option<usize> {
    let id = selected.get(UNIQUE_ID_KEY)?;
    matches
        .iter()
        .position(|m| m.get(UNIQUE_ID_KEY) == Some(id))
        .map(|i| i + 1)
}

fn usable_auto_id(value: &Value) -> bool {
    match value.as_str() {
        Some(id) => id.chars().any(char::is_alphabetic) && !id.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

/// The first property combination that singles out `selected` within
/// `context`, or the narrowest one with `sort_by_scan_order` added.
pub fn create_optimal_element_spec(
    selected: &Map<String, Value>,
    context: &[Map<String, Value>],
) -> Map<String, Value> {
    if selected.is_empty() {
        return Map::new();
    }
    let mut best = Map::new();
    let mut fewest = context.len() + 1;
    for combination in ELEMENT_COMBINATIONS {
        let mut spec = Map::new();
        let valid = combination.iter().all(|key| match selected.get(*key) {
            None | Some(Value::Null) => false,
            Some(value) if *key != "pwa_control_type" && !is_meaningful(value) => false,
            Some(value) if *key == "pwa_auto_id" && !usable_auto_id(value) => false,
            Some(value) => {
                spec.insert(key.to_string(), value.clone());
                true
            }
        });
        if !valid {
            continue;
        }
        let count = context.iter().filter(|c| matches_all(c, &spec)).count();
        if count == 1 {
            info!("Unique element spec from {:?}", combination);
            return spec;
        }
        if count < fewest {
            fewest = count;
            best = spec;
        }
    }

    let matches: Vec<&Map<String, Value>> = context.iter().filter(|c| matches_all(c, &best)).collect();
    if matches.len() > 1 {
        match scan_position(selected, &matches) {
            Some(position) => {
                best.insert("sort_by_scan_order".to_string(), Value::from(position as u64));
            }
            None => warn!("Selected element is not among the matches; cannot add a scan order"),
        }
    }
    best
}

/// `proc_name` and `pwa_title` of the selected window, with a scan order when
/// duplicates exist on the desktop.
pub fn create_optimal_window_spec(
    selected: &Map<String, Value>,
    all_windows: &[Map<String, Value>],
) -> Map<String, Value> {
    if selected.is_empty() {
        return Map::new();
    }
    let mut spec = Map::new();
    for key in ["proc_name", "pwa_title"] {
        if let Some(value) = selected.get(key).filter(|v| is_meaningful(v)) {
            spec.insert(key.to_string(), value.clone());
        }
    }
    if spec.is_empty() {
        let class = selected.get("pwa_class_name").cloned().unwrap_or(Value::Null);
        spec.insert("pwa_class_name".to_string(), class);
        return spec;
    }
    let matches: Vec<&Map<String, Value>> = all_windows.iter().filter(|w| matches_all(w, &spec)).collect();
    if matches.len() > 1 {
        warn!("Found {} duplicate windows, adding sort_by_scan_order", matches.len());
        if let Some(position) = scan_position(selected, &matches) {
            spec.insert("sort_by_scan_order".to_string(), Value::from(position as u64));
        }
    }
    spec
}

/// Drops entries of `element` that repeat the window's value for the same key.
pub fn clean_element_spec(window: &Map<String, Value>, element: &Map<String, Value>) -> Map<String, Value> {
    element
        .iter()
        .filter(|(key, value)| window.get(key.as_str()) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Multi-line, key-sorted rendering such as `window_spec = { ... }`.
/// Internal `sys_` keys and empty values are omitted.
pub fn format_spec(spec: &Map<String, Value>, name: &str) -> String {
    let mut entries: Vec<(&String, &Value)> = spec
        .iter()
        .filter(|(key, value)| !key.starts_with("sys_") && is_meaningful(value))
        .collect();
    if entries.is_empty() {
        return format!("{name} = {{}}");
    }
    entries.sort_by(|a, b| a.0.cmp(b.0));
    let body: Vec<String> = entries
        .into_iter()
        .map(|(key, value)| format!("    \"{key}\": {value},"))
        .collect();
    format!("{name} = {{\n{}\n}}", body.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn numeric_auto_ids_are_skipped() {
        let context = vec![
            map(json!({"pwa_auto_id": "15", "pwa_title": "Text Editor", "pwa_control_type": "Edit", "sys_unique_id": 1})),
            map(json!({"pwa_auto_id": "", "pwa_title": "Search", "pwa_control_type": "Edit", "sys_unique_id": 2})),
        ];
        let spec = create_optimal_element_spec(&context[0], &context);
        assert_eq!(Value::Object(spec), json!({"pwa_title": "Text Editor", "pwa_control_type": "Edit"}));
    }

    #[test]
    fn unique_auto_id_wins() {
        let context = vec![
            map(json!({"pwa_auto_id": "btnSave", "pwa_title": "Save", "sys_unique_id": 1})),
            map(json!({"pwa_auto_id": "btnOpen", "pwa_title": "Save", "sys_unique_id": 2})),
        ];
        let spec = create_optimal_element_spec(&context[1], &context);
        assert_eq!(Value::Object(spec), json!({"pwa_auto_id": "btnOpen"}));
    }

    #[test]
    fn ambiguous_elements_get_a_scan_order() {
        let context: Vec<_> = (1..=3)
            .map(|i| map(json!({"pwa_title": "", "pwa_class_name": "Cell", "pwa_control_type": "DataItem", "sys_unique_id": i})))
            .collect();
        let spec = create_optimal_element_spec(&context[2], &context);
        assert_eq!(
            Value::Object(spec),
            json!({"pwa_class_name": "Cell", "pwa_control_type": "DataItem", "sort_by_scan_order": 3})
        );
    }

    #[test]
    fn window_specs_use_process_and_title() {
        let windows = vec![
            map(json!({"proc_name": "notepad.exe", "pwa_title": "a.txt - Notepad", "sys_unique_id": 10})),
            map(json!({"proc_name": "notepad.exe", "pwa_title": "a.txt - Notepad", "sys_unique_id": 11})),
        ];
        let spec = create_optimal_window_spec(&windows[1], &windows);
        assert_eq!(
            Value::Object(spec),
            json!({"proc_name": "notepad.exe", "pwa_title": "a.txt - Notepad", "sort_by_scan_order": 2})
        );
        let untitled = map(json!({"pwa_class_name": "Shell_TrayWnd"}));
        assert_eq!(
            Value::Object(create_optimal_window_spec(&untitled, &[])),
            json!({"pwa_class_name": "Shell_TrayWnd"})
        );
    }

    #[test]
    fn cleaning_and_formatting() {
        let window = map(json!({"proc_name": "app.exe", "pwa_title": "Main"}));
        let element = map(json!({"proc_name": "app.exe", "pwa_title": "OK", "state_is_enabled": false}));
        let cleaned = clean_element_spec(&window, &element);
        assert_eq!(Value::Object(cleaned.clone()), json!({"pwa_title": "OK", "state_is_enabled": false}));

        let mut with_internal = cleaned;
        with_internal.insert("sys_unique_id".to_string(), json!(7));
        with_internal.insert("pwa_auto_id".to_string(), json!(""));
        assert_eq!(
            format_spec(&with_internal, "element_spec"),
            "element_spec = {\n    \"pwa_title\": \"OK\",\n    \"state_is_enabled\": false,\n}"
        );
        assert_eq!(format_spec(&Map::new(), "spec"), "spec = {}");
    }
}
