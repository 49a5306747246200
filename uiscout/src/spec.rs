//! Specification language.
//!
//! A specification is a JSON object mapping keys to criteria. Plain property
//! keys filter; reserved keys are modifiers (`ancestor`, positional keys,
//! `search_root_spec`, `child_at_index`, `child_path`, `search_max_depth`) or
//! selectors (`sort_by_*`, `z_order_index`). A criterion is either a literal
//! value or an `[operator, operand]` pair:
//!
//! ```json
//! {
//!     "pwa_title": ["icontains", "save"],
//!     "pwa_control_type": "Button",
//!     "to_right_of": { "pwa_title": "Name:" },
//!     "sort_by_y_pos": 1
//! }
//! ```
//!
//! Key order is preserved; the last declared selector decides the pick index.

use crate::element::Rect;
use crate::errors::AutomationError;
use crate::property::Property;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equals,
    IEquals,
    Contains,
    IContains,
    In,
    Regex,
    NotEquals,
    NotIEquals,
    NotContains,
    NotIContains,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equals => "equals",
            Operator::IEquals => "iequals",
            Operator::Contains => "contains",
            Operator::IContains => "icontains",
            Operator::In => "in",
            Operator::Regex => "regex",
            Operator::NotEquals => "not_equals",
            Operator::NotIEquals => "not_iequals",
            Operator::NotContains => "not_contains",
            Operator::NotIContains => "not_icontains",
            Operator::Greater => ">",
            Operator::GreaterOrEqual => ">=",
            Operator::Less => "<",
            Operator::LessOrEqual => "<=",
        }
    }

    pub fn from_name(name: &str) -> Option<Operator> {
        Some(match name.to_lowercase().as_str() {
            "equals" => Operator::Equals,
            "iequals" => Operator::IEquals,
            "contains" => Operator::Contains,
            "icontains" => Operator::IContains,
            "in" => Operator::In,
            "regex" => Operator::Regex,
            "not_equals" => Operator::NotEquals,
            "not_iequals" => Operator::NotIEquals,
            "not_contains" => Operator::NotContains,
            "not_icontains" => Operator::NotIContains,
            ">" => Operator::Greater,
            ">=" => Operator::GreaterOrEqual,
            "<" => Operator::Less,
            "<=" => Operator::LessOrEqual,
            _ => return None,
        })
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Operator::Greater | Operator::GreaterOrEqual | Operator::Less | Operator::LessOrEqual
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition on a single property value.
#[derive(Debug, Clone)]
pub enum Criterion {
    Literal(Value),
    Operator {
        op: Operator,
        operand: Value,
        /// Compiled operand for `regex`.
        pattern: Option<Regex>,
    },
}

impl Criterion {
    pub fn literal(value: impl Into<Value>) -> Self {
        Criterion::Literal(value.into())
    }

    pub fn op(op: Operator, operand: impl Into<Value>) -> Result<Self, AutomationError> {
        let operand = operand.into();
        let pattern = if op == Operator::Regex {
            let source = stringify(&operand);
            Some(Regex::new(&source).map_err(|e| {
                AutomationError::InvalidSpec(format!("Invalid regex '{source}': {e}"))
            })?)
        } else {
            None
        };
        Ok(Criterion::Operator {
            op,
            operand,
            pattern,
        })
    }

    /// `[op, operand]` pairs with a known operator become operator criteria,
    /// everything else is a literal.
    pub fn parse(value: &Value) -> Result<Self, AutomationError> {
        if let Some(items) = value.as_array() {
            if items.len() == 2 {
                if let Some(op) = items[0].as_str().and_then(Operator::from_name) {
                    return Criterion::op(op, items[1].clone());
                }
            }
        }
        Ok(Criterion::Literal(value.clone()))
    }

    pub fn to_value(&self) -> Value {
        match self {
            Criterion::Literal(v) => v.clone(),
            Criterion::Operator { op, operand, .. } => {
                Value::Array(vec![Value::String(op.as_str().to_string()), operand.clone()])
            }
        }
    }

    /// Evaluates the criterion against an actual property value.
    /// A missing value never matches an operator criterion.
    pub fn matches(&self, actual: Option<&Value>) -> bool {
        match self {
            Criterion::Literal(expected) => match actual {
                Some(actual) => values_equal(actual, expected),
                None => expected.is_null(),
            },
            Criterion::Operator {
                op,
                operand,
                pattern,
            } => {
                let Some(actual) = actual.filter(|v| !v.is_null()) else {
                    return false;
                };
                if op.is_numeric() {
                    let (Some(a), Some(b)) = (to_number(actual), to_number(operand)) else {
                        return false;
                    };
                    return match op {
                        Operator::Greater => a > b,
                        Operator::GreaterOrEqual => a >= b,
                        Operator::Less => a < b,
                        _ => a <= b,
                    };
                }
                let actual_str = stringify(actual);
                let target = stringify(operand);
                match op {
                    Operator::Equals => actual_str == target,
                    Operator::IEquals => actual_str.to_lowercase() == target.to_lowercase(),
                    Operator::Contains => actual_str.contains(&target),
                    Operator::IContains => actual_str
                        .to_lowercase()
                        .contains(&target.to_lowercase()),
                    Operator::In => match operand {
                        Value::Array(items) => items.iter().any(|item| stringify(item) == actual_str),
                        _ => target.contains(&actual_str),
                    },
                    Operator::Regex => pattern
                        .as_ref()
                        .map(|re| re.is_match(&actual_str))
                        .unwrap_or(false),
                    Operator::NotEquals => actual_str != target,
                    Operator::NotIEquals => actual_str.to_lowercase() != target.to_lowercase(),
                    Operator::NotContains => !actual_str.contains(&target),
                    Operator::NotIContains => !actual_str
                        .to_lowercase()
                        .contains(&target.to_lowercase()),
                    _ => false,
                }
            }
        }
    }
}

/// String form used by string operators: strings verbatim, everything else as JSON text.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Numeric coercion for comparison operators.
pub fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Literal equality: numbers compare by value, arrays element-wise.
pub fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(_) | Value::Bool(_), Value::Number(_))
        | (Value::Number(_), Value::Bool(_)) => to_number(actual) == to_number(expected),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        _ => actual == expected,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Positional {
    WithinRect,
    ToRightOf,
    ToLeftOf,
    Above,
    Below,
}

impl Positional {
    pub fn as_str(&self) -> &'static str {
        match self {
            Positional::WithinRect => "within_rect",
            Positional::ToRightOf => "to_right_of",
            Positional::ToLeftOf => "to_left_of",
            Positional::Above => "above",
            Positional::Below => "below",
        }
    }

    pub fn from_name(name: &str) -> Option<Positional> {
        Some(match name {
            "within_rect" => Positional::WithinRect,
            "to_right_of" => Positional::ToRightOf,
            "to_left_of" => Positional::ToLeftOf,
            "above" => Positional::Above,
            "below" => Positional::Below,
            _ => return None,
        })
    }
}

/// Reference for a positional predicate: a fixed box or an anchor element.
#[derive(Debug, Clone)]
pub enum PositionalTarget {
    Rect(Rect),
    Anchor(Box<Specification>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectorKey {
    ScanOrder,
    YPos,
    XPos,
    CreationTime,
    Height,
    Width,
    TitleLength,
    ChildCount,
    ZOrderIndex,
}

impl SelectorKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectorKey::ScanOrder => "sort_by_scan_order",
            SelectorKey::YPos => "sort_by_y_pos",
            SelectorKey::XPos => "sort_by_x_pos",
            SelectorKey::CreationTime => "sort_by_creation_time",
            SelectorKey::Height => "sort_by_height",
            SelectorKey::Width => "sort_by_width",
            SelectorKey::TitleLength => "sort_by_title_length",
            SelectorKey::ChildCount => "sort_by_child_count",
            SelectorKey::ZOrderIndex => "z_order_index",
        }
    }

    pub fn from_name(name: &str) -> Option<SelectorKey> {
        Some(match name {
            "sort_by_scan_order" => SelectorKey::ScanOrder,
            "sort_by_y_pos" => SelectorKey::YPos,
            "sort_by_x_pos" => SelectorKey::XPos,
            "sort_by_creation_time" => SelectorKey::CreationTime,
            "sort_by_height" => SelectorKey::Height,
            "sort_by_width" => SelectorKey::Width,
            "sort_by_title_length" => SelectorKey::TitleLength,
            "sort_by_child_count" => SelectorKey::ChildCount,
            "z_order_index" => SelectorKey::ZOrderIndex,
            _ => return None,
        })
    }
}

const KEY_ANCESTOR: &str = "ancestor";
const KEY_SEARCH_ROOT: &str = "search_root_spec";
const KEY_CHILD_AT_INDEX: &str = "child_at_index";
const KEY_CHILD_PATH: &str = "child_path";
const KEY_MAX_DEPTH: &str = "search_max_depth";

/// Parsed specification. Keeps the source object for diagnostics and anchor caching.
#[derive(Debug, Clone, Default)]
pub struct Specification {
    filters: Vec<(Property, Criterion)>,
    positional: Vec<(Positional, PositionalTarget)>,
    ancestor: Option<Box<Specification>>,
    search_root: Option<Box<Specification>>,
    child_at_index: Option<i64>,
    child_path: Option<Vec<i64>>,
    max_depth: Option<usize>,
    selectors: Vec<(SelectorKey, i64)>,
    source: Map<String, Value>,
}

impl Specification {
    /// An empty specification matches every enumerated candidate.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: &Value) -> Result<Self, AutomationError> {
        let object = value.as_object().ok_or_else(|| {
            AutomationError::InvalidSpec(format!("Specification must be an object, got {value}"))
        })?;
        let mut spec = Specification::new();
        for (key, val) in object {
            spec.insert(key, val)?;
        }
        Ok(spec)
    }

    fn insert(&mut self, key: &str, val: &Value) -> Result<(), AutomationError> {
        match key {
            KEY_ANCESTOR => {
                self.ancestor = Some(Box::new(Specification::from_value(val)?));
            }
            KEY_SEARCH_ROOT => {
                self.search_root = Some(Box::new(Specification::from_value(val)?));
            }
            KEY_CHILD_AT_INDEX => {
                let index = val.as_i64().ok_or_else(|| {
                    AutomationError::InvalidSpec(format!(
                        "'child_at_index' must be an integer, but got {val}"
                    ))
                })?;
                self.child_at_index = Some(index);
            }
            KEY_CHILD_PATH => {
                self.child_path = Some(parse_child_path(val)?);
            }
            KEY_MAX_DEPTH => {
                let depth = val.as_u64().ok_or_else(|| {
                    AutomationError::InvalidSpec(format!(
                        "'search_max_depth' must be a non-negative integer, but got {val}"
                    ))
                })?;
                self.max_depth = Some(depth as usize);
            }
            _ => {
                if let Some(positional) = Positional::from_name(key) {
                    let target = if let Some(rect) = Rect::from_value(val) {
                        PositionalTarget::Rect(rect)
                    } else if val.is_object() {
                        PositionalTarget::Anchor(Box::new(Specification::from_value(val)?))
                    } else {
                        return Err(AutomationError::InvalidSpec(format!(
                            "'{key}' expects a [left, top, right, bottom] box or an anchor spec, got {val}"
                        )));
                    };
                    self.positional.retain(|(p, _)| *p != positional);
                    self.positional.push((positional, target));
                } else if let Some(selector) = SelectorKey::from_name(key) {
                    let index = val.as_i64().ok_or_else(|| {
                        AutomationError::InvalidSpec(format!(
                            "Selector '{key}' must be an integer index, but got {val}"
                        ))
                    })?;
                    self.selectors.retain(|(s, _)| *s != selector);
                    self.selectors.push((selector, index));
                } else {
                    let property: Property = key.parse()?;
                    let criterion = Criterion::parse(val)?;
                    self.filters.retain(|(p, _)| *p != property);
                    self.filters.push((property, criterion));
                }
            }
        }
        self.source.insert(key.to_string(), val.clone());
        Ok(())
    }

    /// Adds a property filter.
    pub fn with(mut self, property: Property, criterion: Criterion) -> Self {
        self.source
            .insert(property.name().to_string(), criterion.to_value());
        self.filters.retain(|(p, _)| *p != property);
        self.filters.push((property, criterion));
        self
    }

    pub fn with_selector(mut self, selector: SelectorKey, index: i64) -> Self {
        self.source
            .insert(selector.as_str().to_string(), Value::from(index));
        self.selectors.retain(|(s, _)| *s != selector);
        self.selectors.push((selector, index));
        self
    }

    pub fn with_positional(mut self, positional: Positional, target: PositionalTarget) -> Self {
        let value = match &target {
            PositionalTarget::Rect(rect) => rect.to_value(),
            PositionalTarget::Anchor(anchor) => anchor.to_value(),
        };
        self.source.insert(positional.as_str().to_string(), value);
        self.positional.retain(|(p, _)| *p != positional);
        self.positional.push((positional, target));
        self
    }

    pub fn with_ancestor(mut self, ancestor: Specification) -> Self {
        self.source
            .insert(KEY_ANCESTOR.to_string(), ancestor.to_value());
        self.ancestor = Some(Box::new(ancestor));
        self
    }

    pub fn with_search_root(mut self, root: Specification) -> Self {
        self.source
            .insert(KEY_SEARCH_ROOT.to_string(), root.to_value());
        self.search_root = Some(Box::new(root));
        self
    }

    pub fn with_child_at_index(mut self, index: i64) -> Self {
        self.source
            .insert(KEY_CHILD_AT_INDEX.to_string(), Value::from(index));
        self.child_at_index = Some(index);
        self
    }

    pub fn with_child_path(mut self, path: Vec<i64>) -> Result<Self, AutomationError> {
        let value = Value::from(path.clone());
        let path = parse_child_path(&value)?;
        self.source.insert(KEY_CHILD_PATH.to_string(), value);
        self.child_path = Some(path);
        Ok(self)
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.source
            .insert(KEY_MAX_DEPTH.to_string(), Value::from(depth));
        self.max_depth = Some(depth);
        self
    }

    pub fn filters(&self) -> &[(Property, Criterion)] {
        &self.filters
    }

    pub fn criterion(&self, property: Property) -> Option<&Criterion> {
        self.filters
            .iter()
            .find(|(p, _)| *p == property)
            .map(|(_, c)| c)
    }

    pub fn positional(&self) -> &[(Positional, PositionalTarget)] {
        &self.positional
    }

    pub fn ancestor(&self) -> Option<&Specification> {
        self.ancestor.as_deref()
    }

    pub fn search_root(&self) -> Option<&Specification> {
        self.search_root.as_deref()
    }

    pub fn child_at_index(&self) -> Option<i64> {
        self.child_at_index
    }

    pub fn child_path(&self) -> Option<&[i64]> {
        self.child_path.as_deref()
    }

    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    /// Selectors in declaration order.
    pub fn selectors(&self) -> &[(SelectorKey, i64)] {
        &self.selectors
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// Copy without the keys the resolver consumes before searching
    /// (`search_root_spec`, `child_at_index`, `child_path`).
    pub fn search_part(&self) -> Specification {
        let mut spec = self.clone();
        spec.search_root = None;
        spec.child_at_index = None;
        spec.child_path = None;
        spec.source.remove(KEY_SEARCH_ROOT);
        spec.source.remove(KEY_CHILD_AT_INDEX);
        spec.source.remove(KEY_CHILD_PATH);
        spec
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.source.clone())
    }

    pub fn source(&self) -> &Map<String, Value> {
        &self.source
    }
}

fn parse_child_path(val: &Value) -> Result<Vec<i64>, AutomationError> {
    let items = val.as_array().ok_or_else(|| {
        AutomationError::InvalidSpec(format!("'child_path' must be a list of integers, got {val}"))
    })?;
    items
        .iter()
        .map(|item| match item.as_i64() {
            Some(0) => Err(AutomationError::InvalidSpec(
                "'child_path' indices are 1-based; 0 is not allowed".to_string(),
            )),
            Some(index) => Ok(index),
            None => Err(AutomationError::InvalidSpec(format!(
                "'child_path' entries must be integers, got {item}"
            ))),
        })
        .collect()
}

impl fmt::Display for Specification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.source.clone()))
    }
}

impl TryFrom<Value> for Specification {
    type Error = AutomationError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Specification::from_value(&value)
    }
}

impl TryFrom<&Value> for Specification {
    type Error = AutomationError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        Specification::from_value(value)
    }
}

impl FromStr for Specification {
    type Err = AutomationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: Value = serde_json::from_str(s)?;
        Specification::from_value(&value)
    }
}

impl Serialize for Specification {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.source.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Specification {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Specification::from_value(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(value: Value) -> Specification {
        Specification::from_value(&value).unwrap()
    }

    #[test]
    fn operator_pairs_and_literals_are_distinguished() {
        let s = spec(json!({
            "pwa_title": ["icontains", "save"],
            "pwa_control_type": "Button",
            "geo_bounding_rect_tuple": [0, 0, 10, 10],
        }));
        assert!(matches!(
            s.criterion(Property::PwaTitle),
            Some(Criterion::Operator { op: Operator::IContains, .. })
        ));
        assert!(matches!(
            s.criterion(Property::PwaControlType),
            Some(Criterion::Literal(_))
        ));
        assert!(matches!(
            s.criterion(Property::GeoBoundingRectTuple),
            Some(Criterion::Literal(Value::Array(_)))
        ));
    }

    #[test]
    fn string_operators_on_save_file() {
        let title = json!("Save File");
        let check = |op: Operator, operand: &str| {
            Criterion::op(op, operand).unwrap().matches(Some(&title))
        };
        assert!(check(Operator::IContains, "save"));
        assert!(!check(Operator::Equals, "save file"));
        assert!(check(Operator::IEquals, "save file"));
        assert!(check(Operator::NotContains, "Open"));
        assert!(!check(Operator::NotIContains, "FILE"));
        assert!(check(Operator::Regex, r"^Save\s+F"));
    }

    #[test]
    fn string_operators_stringify_numbers() {
        let c = Criterion::op(Operator::Contains, "12").unwrap();
        assert!(c.matches(Some(&json!(31245))));
        let c = Criterion::op(Operator::Equals, "true").unwrap();
        assert!(c.matches(Some(&json!(true))));
    }

    #[test]
    fn in_operator_uses_list_membership() {
        let c = Criterion::op(Operator::In, json!(["explorer.exe", "notepad.exe"])).unwrap();
        assert!(c.matches(Some(&json!("notepad.exe"))));
        assert!(!c.matches(Some(&json!("note"))));
    }

    #[test]
    fn numeric_operators_coerce_or_fail_closed() {
        let gt = Criterion::op(Operator::Greater, 5).unwrap();
        assert!(gt.matches(Some(&json!(6))));
        assert!(gt.matches(Some(&json!("7.5"))));
        assert!(!gt.matches(Some(&json!("seven"))));
        assert!(!gt.matches(None));
        let le = Criterion::op(Operator::LessOrEqual, "3").unwrap();
        assert!(le.matches(Some(&json!(3.0))));
    }

    #[test]
    fn missing_value_never_matches_operator() {
        let c = Criterion::op(Operator::NotEquals, "x").unwrap();
        assert!(!c.matches(None));
        assert!(!c.matches(Some(&Value::Null)));
    }

    #[test]
    fn literal_numbers_compare_by_value() {
        assert!(Criterion::literal(5).matches(Some(&json!(5.0))));
        assert!(Criterion::literal(json!([0, 0, 1, 1])).matches(Some(&json!([0.0, 0, 1, 1]))));
        assert!(!Criterion::literal("Edit").matches(Some(&json!("edit"))));
    }

    #[test]
    fn invalid_regex_is_rejected_at_parse_time() {
        let err = Specification::from_value(&json!({"pwa_title": ["regex", "("]})).unwrap_err();
        assert!(matches!(err, AutomationError::InvalidSpec(_)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Specification::from_value(&json!({"pwa_titel": "x"})).unwrap_err();
        assert!(err.to_string().contains("pwa_titel"));
    }

    #[test]
    fn modifiers_are_parsed() {
        let s = spec(json!({
            "ancestor": {"pwa_control_type": "Pane"},
            "to_right_of": {"pwa_title": "Name:"},
            "within_rect": [0, 0, 500, 500],
            "search_root_spec": {"pwa_auto_id": "list"},
            "child_at_index": 2,
            "child_path": [1, -1],
            "search_max_depth": 3,
        }));
        assert!(s.ancestor().is_some());
        assert_eq!(s.positional().len(), 2);
        assert!(matches!(s.positional()[1].1, PositionalTarget::Rect(_)));
        assert!(s.search_root().is_some());
        assert_eq!(s.child_at_index(), Some(2));
        assert_eq!(s.child_path(), Some(&[1, -1][..]));
        assert_eq!(s.max_depth(), Some(3));

        let search = s.search_part();
        assert!(search.search_root().is_none());
        assert!(search.child_path().is_none());
        assert!(!search.source().contains_key("child_at_index"));
    }

    #[test]
    fn bad_index_types_are_configuration_errors() {
        assert!(Specification::from_value(&json!({"child_at_index": "1"})).is_err());
        assert!(Specification::from_value(&json!({"child_path": [1, 0]})).is_err());
        assert!(Specification::from_value(&json!({"sort_by_y_pos": 1.5})).is_err());
        assert!(Specification::from_value(&json!(["pwa_title", "x"])).is_err());
    }

    #[test]
    fn selectors_keep_declaration_order() {
        let s: Specification =
            r#"{"sort_by_x_pos": 1, "pwa_control_type": "Button", "sort_by_y_pos": -2}"#
                .parse()
                .unwrap();
        assert_eq!(
            s.selectors(),
            &[(SelectorKey::XPos, 1), (SelectorKey::YPos, -2)]
        );
        assert_eq!(
            s.to_string(),
            r#"{"sort_by_x_pos":1,"pwa_control_type":"Button","sort_by_y_pos":-2}"#
        );
    }

    #[test]
    fn builder_matches_parsed_form() {
        let built = Specification::new()
            .with(Property::PwaTitle, Criterion::op(Operator::IContains, "notepad").unwrap())
            .with_selector(SelectorKey::ScanOrder, 1);
        let parsed = spec(json!({"pwa_title": ["icontains", "notepad"], "sort_by_scan_order": 1}));
        assert_eq!(built.to_value(), parsed.to_value());
    }
}
