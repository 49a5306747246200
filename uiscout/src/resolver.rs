//! Timeout-bounded resolution of a specification to exactly one element.
//!
//! Every attempt polls the shared [`AutomationState`] first, so a stop aborts
//! the lookup and a pause holds it without eating into the timeout.

use crate::element::UIElement;
use crate::errors::AutomationError;
use crate::finder::{one_based, resolve_index, ElementFinder, FindOptions};
use crate::notify::{Notifier, NotifyStyle, TracingNotifier};
use crate::platforms::AccessibilityEngine;
use crate::spec::Specification;
use crate::state::{AutomationState, RunState};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Finder budget in single-scan mode.
const SINGLE_SCAN_GRACE: Duration = Duration::from_millis(500);
const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(500);
const MAX_AMBIGUOUS_CANDIDATES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub timeout: Duration,
    pub retry_interval: Duration,
}

impl Timing {
    pub fn new(timeout: Duration, retry_interval: Duration) -> Self {
        Self {
            timeout,
            retry_interval,
        }
    }

    /// Exactly one search, no waiting.
    pub fn single_scan() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn is_single_scan(&self) -> bool {
        self.timeout.is_zero() && self.retry_interval.is_zero()
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_millis(500))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entity {
    Window,
    Element,
}

impl Entity {
    fn as_str(&self) -> &'static str {
        match self {
            Entity::Window => "window",
            Entity::Element => "element",
        }
    }

    fn not_found(&self, message: String) -> AutomationError {
        match self {
            Entity::Window => AutomationError::WindowNotFound(message),
            Entity::Element => AutomationError::ElementNotFound(message),
        }
    }
}

#[derive(Clone)]
pub struct Resolver {
    finder: ElementFinder,
    state: AutomationState,
    notifier: Arc<dyn Notifier>,
    pause_poll: Duration,
}

impl Resolver {
    pub fn new(finder: ElementFinder) -> Self {
        Self {
            finder,
            state: AutomationState::new(),
            notifier: Arc::new(TracingNotifier),
            pause_poll: PAUSE_POLL_INTERVAL,
        }
    }

    pub fn with_state(mut self, state: AutomationState) -> Self {
        self.state = state;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_pause_poll(mut self, interval: Duration) -> Self {
        self.pause_poll = interval;
        self
    }

    pub fn finder(&self) -> &ElementFinder {
        &self.finder
    }

    pub fn engine(&self) -> &Arc<dyn AccessibilityEngine> {
        self.finder.engine()
    }

    pub fn state(&self) -> &AutomationState {
        &self.state
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Resolves a top-level window.
    #[instrument(level = "debug", skip(self, spec, timing), fields(spec = %spec))]
    pub fn find_window(&self, spec: &Specification, timing: Timing) -> Result<UIElement, AutomationError> {
        let root = self.engine().root();
        self.resolve_unique(&root, spec, timing, Entity::Window)
    }

    /// Resolves an element inside an already resolved window, honouring
    /// `search_root_spec`, `child_at_index` and `child_path`.
    #[instrument(level = "debug", skip(self, window, spec, timing), fields(spec = %spec))]
    pub fn find_element(
        &self,
        window: &UIElement,
        spec: &Specification,
        timing: Timing,
    ) -> Result<UIElement, AutomationError> {
        let root = match spec.search_root() {
            Some(root_spec) => {
                debug!("Resolving search root {}", root_spec);
                self.find_element(window, root_spec, timing)?
            }
            None => window.clone(),
        };

        let base = match spec.child_at_index() {
            Some(index) => child_at_index(&root, index)?,
            None => self.resolve_unique(&root, &spec.search_part(), timing, Entity::Element)?,
        };

        match spec.child_path() {
            Some(path) => descend_child_path(&base, path),
            None => Ok(base),
        }
    }

    /// Resolves the window, then the element within it. Without an element
    /// spec the window itself is returned.
    pub fn resolve(
        &self,
        window_spec: &Specification,
        element_spec: Option<&Specification>,
        timing: Timing,
    ) -> Result<UIElement, AutomationError> {
        let window = self.find_window(window_spec, timing)?;
        match element_spec {
            Some(spec) if !spec.is_empty() => self.find_element(&window, spec, timing),
            _ => Ok(window),
        }
    }

    /// All current matches under `root`, after one search. No retries.
    pub fn find_all(&self, root: &UIElement, spec: &Specification) -> Result<Vec<UIElement>, AutomationError> {
        self.check_stopped()?;
        self.finder
            .find(root, spec, &FindOptions::with_timeout(SINGLE_SCAN_GRACE))
    }

    fn check_stopped(&self) -> Result<(), AutomationError> {
        if self.state.is_stopped() {
            return Err(AutomationError::Stopped);
        }
        Ok(())
    }

    /// Blocks while paused. Returns how long the pause lasted.
    pub(crate) fn wait_while_paused(&self) -> Result<Duration, AutomationError> {
        match self.state.get() {
            RunState::Stopped => return Err(AutomationError::Stopped),
            RunState::Running => return Ok(Duration::ZERO),
            RunState::Paused => {}
        }
        let started = Instant::now();
        self.notifier.notify(
            "Automation Paused",
            "Task paused. Waiting for resume...",
            NotifyStyle::Warning,
        );
        loop {
            std::thread::sleep(self.pause_poll);
            match self.state.get() {
                RunState::Stopped => return Err(AutomationError::Stopped),
                RunState::Running => break,
                RunState::Paused => {}
            }
        }
        self.notifier
            .notify("Automation Resumed", "Task resumed.", NotifyStyle::Success);
        Ok(started.elapsed())
    }

    fn search(
        &self,
        root: &UIElement,
        spec: &Specification,
        budget: Duration,
    ) -> Result<Vec<UIElement>, AutomationError> {
        match self.finder.find(root, spec, &FindOptions::with_timeout(budget)) {
            Ok(found) => Ok(found),
            // The root went stale between attempts; treat it as nothing found yet.
            Err(AutomationError::ElementNotFound(reason)) => {
                debug!("Search root unavailable: {}", reason);
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    fn resolve_unique(
        &self,
        root: &UIElement,
        spec: &Specification,
        timing: Timing,
        entity: Entity,
    ) -> Result<UIElement, AutomationError> {
        let started = Instant::now();

        if timing.is_single_scan() {
            self.wait_while_paused()?;
            let found = self.search(root, spec, SINGLE_SCAN_GRACE)?;
            return match pick_unique(found, entity)? {
                Some(element) => Ok(element),
                None => Err(entity.not_found(format!("{spec} (single scan)"))),
            };
        }

        info!("Searching for {} {} (timeout {:.1}s)", entity.as_str(), spec, timing.timeout.as_secs_f64());
        let mut deadline = started + timing.timeout;
        let mut attempts = 0u32;
        loop {
            deadline += self.wait_while_paused()?;
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() && attempts > 0 {
                break;
            }
            attempts += 1;

            let found = self.search(root, spec, attempt_budget(attempts, remaining))?;
            if let Some(element) = pick_unique(found, entity)? {
                info!(
                    "Found {} after {} attempt(s) in {:.2}s",
                    entity.as_str(),
                    attempts,
                    started.elapsed().as_secs_f64()
                );
                return Ok(element);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            std::thread::sleep(timing.retry_interval.min(remaining));
        }

        warn!(
            "No {} matched {} after {} attempt(s) in {:.2}s",
            entity.as_str(),
            spec,
            attempts,
            started.elapsed().as_secs_f64()
        );
        Err(entity.not_found(format!(
            "{} not found within {:.1}s: {}",
            capitalize(entity.as_str()),
            timing.timeout.as_secs_f64(),
            spec
        )))
    }
}

/// Finder budget for one attempt. A zero timeout still gets one full scan;
/// every other attempt is bounded by the time left.
fn attempt_budget(attempt: u32, remaining: Duration) -> Duration {
    if attempt <= 1 && remaining.is_zero() {
        SINGLE_SCAN_GRACE
    } else {
        remaining
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `Ok(None)` when nothing matched, an ambiguity error when more than one did.
fn pick_unique(mut found: Vec<UIElement>, entity: Entity) -> Result<Option<UIElement>, AutomationError> {
    match found.len() {
        0 => Ok(None),
        1 => Ok(found.pop()),
        count => Err(AutomationError::Ambiguous {
            count,
            entity: entity.as_str().to_string(),
            candidates: found
                .iter()
                .take(MAX_AMBIGUOUS_CANDIDATES)
                .map(UIElement::display_text)
                .collect(),
        }),
    }
}

/// Direct child by 0-based index; negative counts from the end.
pub fn child_at_index(container: &UIElement, index: i64) -> Result<UIElement, AutomationError> {
    let mut children = container.children()?;
    let len = children.len();
    match resolve_index(index, len) {
        Some(i) => Ok(children.swap_remove(i)),
        None => Err(AutomationError::ElementNotFound(format!(
            "Child at index {index} not found. Container only has {len} children."
        ))),
    }
}

/// Walks a 1-based child path (negative counts from the end).
pub fn descend_child_path(base: &UIElement, path: &[i64]) -> Result<UIElement, AutomationError> {
    let mut current = base.clone();
    for (step, &index) in path.iter().enumerate() {
        let mut children = current.children()?;
        let len = children.len();
        let resolved = if index == 0 {
            None
        } else {
            resolve_index(one_based(index), len)
        };
        current = match resolved {
            Some(i) => children.swap_remove(i),
            None => {
                return Err(AutomationError::ElementNotFound(format!(
                    "Child path {:?} failed at step {}: index {} out of range ({} children) under {}",
                    &path[..=step],
                    step + 1,
                    index,
                    len,
                    current.display_text()
                )))
            }
        };
    }
    Ok(current)
}
