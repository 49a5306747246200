//! Two-phase element search.
//!
//! A search enumerates candidates through the platform with whatever criteria
//! the platform can evaluate natively, then filters the survivors in-process,
//! applies positional predicates and finally sorts and picks with selectors.

use crate::element::{Rect, UIElement};
use crate::errors::AutomationError;
use crate::platforms::{AccessibilityEngine, NativeFilter, NativeMatch};
use crate::property::{get_property, Property, ProcessInfoCache};
use crate::spec::{stringify, Criterion, Operator, Positional, PositionalTarget, SelectorKey, Specification};
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, trace, warn};

/// Creation time used for elements whose process cannot be described.
const EARLIEST_CREATE_TIME: &str = "0001-01-01 00:00:00";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchDirection {
    #[default]
    Forward,
    /// Reverse the enumeration order before filtering.
    Backward,
}

#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Budget for the filtering phase; when exceeded, partial results are returned.
    pub timeout: Option<Duration>,
    /// Overrides the specification's `search_max_depth`.
    pub max_depth: Option<usize>,
    pub direction: SearchDirection,
}

impl FindOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Default::default()
        }
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn backward(mut self) -> Self {
        self.direction = SearchDirection::Backward;
        self
    }
}

/// Per-call state: resolved anchors keyed by their specification text.
struct FindContext {
    started: Instant,
    timeout: Option<Duration>,
    anchors: HashMap<String, Option<(UIElement, Rect)>>,
}

impl FindContext {
    fn expired(&self) -> bool {
        self.timeout
            .map(|t| self.started.elapsed() > t)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
enum SortValue {
    Number(f64),
    Text(String),
}

impl SortValue {
    fn compare(&self, other: &SortValue) -> Ordering {
        match (self, other) {
            (SortValue::Number(a), SortValue::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (SortValue::Text(a), SortValue::Text(b)) => a.cmp(b),
            (SortValue::Number(_), SortValue::Text(_)) => Ordering::Less,
            (SortValue::Text(_), SortValue::Number(_)) => Ordering::Greater,
        }
    }
}

/// Resolves a possibly negative index against a list length.
pub(crate) fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let resolved = if index < 0 { len as i64 + index } else { index };
    (0..len as i64).contains(&resolved).then_some(resolved as usize)
}

/// Converts a 1-based selector value (negative counts from the end) into a raw index.
pub(crate) fn one_based(value: i64) -> i64 {
    if value > 0 {
        value - 1
    } else {
        value
    }
}

#[derive(Clone)]
pub struct ElementFinder {
    engine: Arc<dyn AccessibilityEngine>,
    processes: Arc<ProcessInfoCache>,
}

impl ElementFinder {
    pub fn new(engine: Arc<dyn AccessibilityEngine>) -> Self {
        Self::with_process_cache(engine, Arc::new(ProcessInfoCache::new()))
    }

    pub fn with_process_cache(
        engine: Arc<dyn AccessibilityEngine>,
        processes: Arc<ProcessInfoCache>,
    ) -> Self {
        Self { engine, processes }
    }

    pub fn engine(&self) -> &Arc<dyn AccessibilityEngine> {
        &self.engine
    }

    pub fn processes(&self) -> &Arc<ProcessInfoCache> {
        &self.processes
    }

    pub fn get_property(&self, element: &UIElement, property: Property) -> Option<Value> {
        get_property(element, property, &self.processes)
    }

    /// Evaluates one criterion against the element's current property value.
    pub fn check_condition(&self, element: &UIElement, property: Property, criterion: &Criterion) -> bool {
        let actual = self.get_property(element, property);
        criterion.matches(actual.as_ref())
    }

    /// Finds elements under `root` matching `spec`, in enumeration order
    /// (or selector order when the spec carries selectors). An empty result is
    /// a normal outcome.
    #[instrument(level = "debug", skip(self, root, spec, options), fields(spec = %spec))]
    pub fn find(
        &self,
        root: &UIElement,
        spec: &Specification,
        options: &FindOptions,
    ) -> Result<Vec<UIElement>, AutomationError> {
        let mut context = FindContext {
            started: Instant::now(),
            timeout: options.timeout,
            anchors: HashMap::new(),
        };
        let found = self.find_with(root, spec, options, &mut context)?;
        debug!(
            "find returned {} element(s) in {:?}",
            found.len(),
            context.started.elapsed()
        );
        Ok(found)
    }

    fn find_with(
        &self,
        root: &UIElement,
        spec: &Specification,
        options: &FindOptions,
        context: &mut FindContext,
    ) -> Result<Vec<UIElement>, AutomationError> {
        let mut search_root = root.clone();
        if let Some(ancestor_spec) = spec.ancestor() {
            let ancestors = self.find_with(root, ancestor_spec, &FindOptions::default(), context)?;
            match ancestors.into_iter().next() {
                Some(ancestor) => {
                    debug!("Ancestor resolved to {}", ancestor.display_text());
                    search_root = ancestor;
                }
                None => {
                    debug!("Ancestor {} not found; search yields nothing", ancestor_spec);
                    return Ok(Vec::new());
                }
            }
        }

        let top_level = self.engine.is_desktop(&search_root);
        let (native, post_filters) = partition_filters(spec, top_level);

        let mut candidates = if top_level {
            self.engine.top_level_windows(&native)?
        } else {
            let depth = options.max_depth.or(spec.max_depth());
            self.engine.descendants(&search_root, depth, &native)?
        };
        if options.direction == SearchDirection::Backward {
            candidates.reverse();
        }
        debug!(
            "Native enumeration ({}) produced {} candidate(s)",
            if top_level { "top-level" } else { "descendants" },
            candidates.len()
        );

        let filtered = self.post_filter(candidates, &post_filters, spec.positional(), context);
        trace!("{} candidate(s) survived post-filtering", filtered.len());

        Ok(self.apply_selectors(filtered, spec.selectors()))
    }

    fn post_filter(
        &self,
        candidates: Vec<UIElement>,
        filters: &[(Property, &Criterion)],
        positional: &[(Positional, PositionalTarget)],
        context: &mut FindContext,
    ) -> Vec<UIElement> {
        if filters.is_empty() && positional.is_empty() {
            return candidates;
        }
        let mut kept = Vec::new();
        for candidate in candidates {
            if context.expired() {
                warn!(
                    "Filtering exceeded its time budget; returning {} partial result(s)",
                    kept.len()
                );
                break;
            }
            let passes = filters
                .iter()
                .all(|(property, criterion)| self.check_condition(&candidate, *property, criterion));
            if !passes {
                continue;
            }
            if positional
                .iter()
                .all(|(kind, target)| self.check_positional(&candidate, *kind, target, context))
            {
                kept.push(candidate);
            }
        }
        kept
    }

    fn check_positional(
        &self,
        element: &UIElement,
        kind: Positional,
        target: &PositionalTarget,
        context: &mut FindContext,
    ) -> bool {
        let Ok(rect) = element.bounds() else {
            return false;
        };
        let reference = match target {
            PositionalTarget::Rect(r) => *r,
            PositionalTarget::Anchor(anchor_spec) => match self.resolve_anchor(element, anchor_spec, context) {
                Some((anchor, anchor_rect)) => {
                    if &anchor == element {
                        return false;
                    }
                    anchor_rect
                }
                None => return false,
            },
        };
        match kind {
            Positional::WithinRect => reference.contains(&rect),
            Positional::ToRightOf => rect.left >= reference.right && rect.vertical_overlap(&reference) > 0,
            Positional::ToLeftOf => rect.right <= reference.left && rect.vertical_overlap(&reference) > 0,
            Positional::Below => rect.top >= reference.bottom && rect.horizontal_overlap(&reference) > 0,
            Positional::Above => rect.bottom <= reference.top && rect.horizontal_overlap(&reference) > 0,
        }
    }

    fn resolve_anchor(
        &self,
        element: &UIElement,
        anchor_spec: &Specification,
        context: &mut FindContext,
    ) -> Option<(UIElement, Rect)> {
        let key = anchor_spec.to_string();
        if let Some(cached) = context.anchors.get(&key) {
            return cached.clone();
        }
        let scope = match element.top_level_window() {
            Ok(Some(window)) => window,
            _ => self.engine.root(),
        };
        let resolved = match self.find_with(&scope, anchor_spec, &FindOptions::default(), context) {
            Ok(found) => found
                .into_iter()
                .next()
                .and_then(|anchor| anchor.bounds().ok().map(|r| (anchor, r))),
            Err(e) => {
                debug!("Anchor {} could not be resolved: {}", key, e);
                None
            }
        };
        if resolved.is_none() {
            debug!("Anchor {} not found", key);
        }
        context.anchors.insert(key, resolved.clone());
        resolved
    }

    fn sort_value(&self, element: &UIElement, key: SelectorKey) -> SortValue {
        let rect = || element.bounds().unwrap_or_default();
        match key {
            SelectorKey::YPos => SortValue::Number(rect().top as f64),
            SelectorKey::XPos => SortValue::Number(rect().left as f64),
            SelectorKey::Height => SortValue::Number(rect().height() as f64),
            SelectorKey::Width => SortValue::Number(rect().width() as f64),
            SelectorKey::TitleLength => {
                SortValue::Number(element.name().map(|n| n.chars().count()).unwrap_or(0) as f64)
            }
            SelectorKey::ChildCount => SortValue::Number(
                self.get_property(element, Property::RelChildCount)
                    .and_then(|v| v.as_f64())
                    .unwrap_or(0.0),
            ),
            SelectorKey::CreationTime => SortValue::Text(
                self.get_property(element, Property::ProcCreateTime)
                    .map(|v| stringify(&v))
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| EARLIEST_CREATE_TIME.to_string()),
            ),
            SelectorKey::ScanOrder | SelectorKey::ZOrderIndex => SortValue::Number(0.0),
        }
    }

    /// Orders and picks among filtered candidates.
    ///
    /// `sort_by_scan_order` picks straight from the filtered order. Otherwise
    /// each sort key is applied as a stable sort in declaration order
    /// (descending for negative values) and the pick index is `z_order_index`
    /// when present, else the last sort key's 1-based value.
    fn apply_selectors(&self, candidates: Vec<UIElement>, selectors: &[(SelectorKey, i64)]) -> Vec<UIElement> {
        if selectors.is_empty() || candidates.is_empty() {
            return candidates;
        }
        if let Some((_, value)) = selectors.iter().find(|(k, _)| *k == SelectorKey::ScanOrder) {
            return match resolve_index(one_based(*value), candidates.len()) {
                Some(index) => vec![candidates[index].clone()],
                None => {
                    debug!(
                        "sort_by_scan_order {} out of range for {} candidate(s)",
                        value,
                        candidates.len()
                    );
                    Vec::new()
                }
            };
        }

        let sort_keys: Vec<(SelectorKey, i64)> = selectors
            .iter()
            .filter(|(k, _)| *k != SelectorKey::ZOrderIndex)
            .copied()
            .collect();
        let mut decorated: Vec<(Vec<SortValue>, UIElement)> = candidates
            .into_iter()
            .map(|element| {
                let values = sort_keys
                    .iter()
                    .map(|(key, _)| self.sort_value(&element, *key))
                    .collect();
                (values, element)
            })
            .collect();
        for (position, (key, value)) in sort_keys.iter().enumerate() {
            trace!("Sorting by {} ({})", key.as_str(), value);
            if *value < 0 {
                decorated.sort_by(|a, b| b.0[position].compare(&a.0[position]));
            } else {
                decorated.sort_by(|a, b| a.0[position].compare(&b.0[position]));
            }
        }

        let raw_index = match selectors.iter().find(|(k, _)| *k == SelectorKey::ZOrderIndex) {
            Some((_, z)) => *z,
            None => match sort_keys.last() {
                Some((_, value)) => one_based(*value),
                None => 0,
            },
        };
        match resolve_index(raw_index, decorated.len()) {
            Some(index) => vec![decorated.swap_remove(index).1],
            None => {
                debug!(
                    "Selector index {} out of range for {} candidate(s)",
                    raw_index,
                    decorated.len()
                );
                Vec::new()
            }
        }
    }
}

/// Splits the spec's property filters into a native prefilter and
/// priority-ordered post-filters. Substring and regex operators only go
/// native for top-level window enumeration.
fn partition_filters(spec: &Specification, top_level: bool) -> (NativeFilter, Vec<(Property, &Criterion)>) {
    let mut native = NativeFilter::default();
    let mut post = Vec::new();
    for (property, criterion) in spec.filters() {
        let promoted = property
            .native_field()
            .and_then(|field| native_match(criterion, top_level).map(|m| (field, m)));
        match promoted {
            Some((field, condition)) => native.set(field, condition),
            None => post.push((*property, criterion)),
        }
    }
    post.sort_by_key(|(property, _)| property.priority());
    (native, post)
}

fn native_match(criterion: &Criterion, top_level: bool) -> Option<NativeMatch> {
    match criterion {
        Criterion::Literal(Value::String(s)) => Some(NativeMatch::Exact(s.clone())),
        Criterion::Literal(_) => None,
        Criterion::Operator { op, operand, pattern } => {
            let text = stringify(operand);
            match op {
                Operator::Equals => Some(NativeMatch::Exact(text)),
                Operator::IEquals => Some(NativeMatch::ExactIgnoreCase(text)),
                Operator::Contains if top_level => {
                    Regex::new(&format!(".*{}.*", regex::escape(&text))).ok().map(NativeMatch::Regex)
                }
                Operator::IContains if top_level => Regex::new(&format!("(?i).*{}.*", regex::escape(&text)))
                    .ok()
                    .map(NativeMatch::Regex),
                Operator::Regex if top_level => pattern.clone().map(NativeMatch::Regex),
                _ => None,
            }
        }
    }
}
