//! The automation façade: actions, property reads, existence checks, state
//! waits and snapshots over resolved elements.
//!
//! Every entry point takes a [`Target`]: either an element that is already
//! resolved, which skips the search entirely, or a window/element
//! specification pair resolved on each call.

use crate::action::Action;
use crate::activity::ActivityMonitor;
use crate::config::ControllerConfig;
use crate::element::{PatternProperty, ScrollDirection, StateFlag, UIElement};
use crate::errors::AutomationError;
use crate::finder::ElementFinder;
use crate::notify::{Notifier, NotifyStyle};
use crate::platforms::{create_engine, AccessibilityEngine, NativeFilter};
use crate::property::Property;
use crate::resolver::{Resolver, Timing};
use crate::screenshot::{take_error_screenshot, MonitorCapture, NoopCapture, ScreenCapture};
use crate::snapshot::{Recipe, UISnapshot};
use crate::spec::Specification;
use crate::state::AutomationState;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

const ACTIVATION_SETTLE: Duration = Duration::from_millis(500);
const SCROLL_SETTLE: Duration = Duration::from_millis(300);
const NEXT_STATE_PROBE_TIMEOUT: Duration = Duration::from_millis(200);
const SNAPSHOT_ENTRY_TIMEOUT: Duration = Duration::from_millis(500);
const SNAPSHOT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// What an operation acts on.
#[derive(Debug, Clone)]
pub enum Target {
    Element(UIElement),
    Spec {
        window: Specification,
        element: Option<Specification>,
    },
}

impl Target {
    pub fn window(window: Specification) -> Self {
        Target::Spec {
            window,
            element: None,
        }
    }

    pub fn spec(window: Specification, element: Specification) -> Self {
        Target::Spec {
            window,
            element: Some(element),
        }
    }

    fn describe(&self) -> String {
        match self {
            Target::Element(element) => element.display_text(),
            Target::Spec {
                window,
                element: Some(element),
            } => format!("{element} in {window}"),
            Target::Spec { window, element: None } => window.to_string(),
        }
    }
}

impl From<UIElement> for Target {
    fn from(element: UIElement) -> Self {
        Target::Element(element)
    }
}

#[derive(Debug, Clone)]
pub struct ActionOptions {
    pub timeout: Option<Duration>,
    pub retry_interval: Option<Duration>,
    /// Maximize an inactive window instead of failing.
    pub auto_activate: bool,
    pub raise_on_failure: bool,
    pub delay_before: Duration,
    pub delay_after: Duration,
    /// Replaces the action text in notifications.
    pub description: Option<String>,
    pub notify_style: NotifyStyle,
    /// Scroll until the target is visible before acting.
    pub scroll_if_needed: bool,
    /// Element, in the target's window, that receives the scroll steps.
    pub scroll_container: Option<Specification>,
    pub scroll_direction: ScrollDirection,
    pub max_scroll_attempts: u32,
}

impl Default for ActionOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            retry_interval: None,
            auto_activate: false,
            raise_on_failure: false,
            delay_before: Duration::ZERO,
            delay_after: Duration::ZERO,
            description: None,
            notify_style: NotifyStyle::Success,
            scroll_if_needed: false,
            scroll_container: None,
            scroll_direction: ScrollDirection::Down,
            max_scroll_attempts: 10,
        }
    }
}

impl ActionOptions {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = Some(interval);
        self
    }

    pub fn auto_activate(mut self, enabled: bool) -> Self {
        self.auto_activate = enabled;
        self
    }

    pub fn raise_on_failure(mut self, enabled: bool) -> Self {
        self.raise_on_failure = enabled;
        self
    }

    pub fn delays(mut self, before: Duration, after: Duration) -> Self {
        self.delay_before = before;
        self.delay_after = after;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn notify_style(mut self, style: NotifyStyle) -> Self {
        self.notify_style = style;
        self
    }

    pub fn scroll_if_needed(mut self, container: Option<Specification>, direction: ScrollDirection) -> Self {
        self.scroll_if_needed = true;
        self.scroll_container = container;
        self.scroll_direction = direction;
        self
    }
}

/// One named outcome for [`UIController::get_next_state`].
#[derive(Debug, Clone)]
pub struct StateCase {
    pub name: String,
    pub window: Option<Specification>,
    pub element: Option<Specification>,
}

impl StateCase {
    pub fn new(name: impl Into<String>, window: Specification, element: Option<Specification>) -> Self {
        Self {
            name: name.into(),
            window: Some(window),
            element,
        }
    }
}

/// Read-only values offered by `get_property` on top of the named properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PropertyRead {
    Named(Property),
    Text,
    Texts,
    Value,
    IsToggled,
}

impl PropertyRead {
    fn parse(name: &str) -> Result<Self, AutomationError> {
        match name.trim().to_lowercase().as_str() {
            "text" => Ok(PropertyRead::Text),
            "texts" => Ok(PropertyRead::Texts),
            "value" => Ok(PropertyRead::Value),
            "is_toggled" => Ok(PropertyRead::IsToggled),
            other => Property::from_name(other)
                .map(PropertyRead::Named)
                .ok_or_else(|| AutomationError::InvalidArgument(format!("Unsupported property: '{name}'"))),
        }
    }
}

pub struct UIController {
    resolver: Resolver,
    config: ControllerConfig,
    activity: Option<ActivityMonitor>,
    capture: Arc<dyn ScreenCapture>,
}

impl UIController {
    pub fn new(engine: Arc<dyn AccessibilityEngine>, config: ControllerConfig) -> Self {
        let resolver = Resolver::new(ElementFinder::new(engine));
        let capture: Arc<dyn ScreenCapture> = if config.screenshots_enabled {
            Arc::new(MonitorCapture)
        } else {
            Arc::new(NoopCapture)
        };
        let activity = if config.human_interruption_detection {
            let monitor = ActivityMonitor::new(config.human_cooldown_period);
            match monitor.start_listener() {
                Ok(()) => Some(monitor),
                Err(e) => {
                    warn!("Human activity detection unavailable: {}", e);
                    None
                }
            }
        } else {
            None
        };
        info!("UI controller initialized (secure mode: {})", config.secure_mode);
        Self {
            resolver,
            config,
            activity,
            capture,
        }
    }

    /// Controller over the native accessibility engine of this platform.
    pub fn for_platform(config: ControllerConfig) -> Result<Self, AutomationError> {
        Ok(Self::new(create_engine()?, config))
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.resolver = self.resolver.with_notifier(notifier);
        self
    }

    pub fn with_state(mut self, state: AutomationState) -> Self {
        self.resolver = self.resolver.with_state(state);
        self
    }

    pub fn with_capture(mut self, capture: Arc<dyn ScreenCapture>) -> Self {
        self.capture = capture;
        self
    }

    pub fn with_activity_monitor(mut self, monitor: ActivityMonitor) -> Self {
        self.activity = Some(monitor);
        self
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn engine(&self) -> &Arc<dyn AccessibilityEngine> {
        self.resolver.engine()
    }

    pub fn state(&self) -> &AutomationState {
        self.resolver.state()
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn notifier(&self) -> &dyn Notifier {
        self.resolver.notifier().as_ref()
    }

    /// Timing from optional overrides, falling back to the configured defaults.
    pub fn timing(&self, timeout: Option<Duration>, retry_interval: Option<Duration>) -> Timing {
        Timing::new(
            timeout.unwrap_or(self.config.default_timeout),
            retry_interval.unwrap_or(self.config.default_retry_interval),
        )
    }

    /// Visible top-level windows.
    pub fn windows(&self) -> Result<Vec<UIElement>, AutomationError> {
        self.engine().top_level_windows(&NativeFilter::default())
    }

    /// Resolves a target to exactly one element.
    pub fn find_element(&self, target: &Target, timeout: Option<Duration>) -> Result<UIElement, AutomationError> {
        self.resolve_target(target, self.timing(timeout, None))
    }

    fn resolve_target(&self, target: &Target, timing: Timing) -> Result<UIElement, AutomationError> {
        match target {
            Target::Element(element) => Ok(element.clone()),
            Target::Spec { window, element } => self.resolver.resolve(window, element.as_ref(), timing),
        }
    }

    /// One notification, one log line and one screenshot attempt per failure.
    fn report_failure(&self, operation: &str, label: &str, error: &AutomationError) {
        if error.is_expected() {
            error!("{} failed for {}: {}", operation, label, error);
        } else {
            error!(critical = true, "Unexpected error in {} for {}: {}", operation, label, error);
        }
        self.notifier()
            .notify("Action Failed", &format!("Failed: {label}: {error}"), NotifyStyle::Error);
        if self.config.screenshots_enabled {
            take_error_screenshot(
                self.capture.as_ref(),
                &self.config.screenshot_dir,
                &format!("{operation}_{label}"),
            );
        }
    }

    fn wait_for_user(&self) {
        if let Some(monitor) = &self.activity {
            monitor.wait_for_user_idle(self.notifier());
        }
    }

    /// Runs `command[:value]` on the target. Returns `Ok(false)` on failure
    /// unless `raise_on_failure` is set. A stop request is always an error.
    #[instrument(level = "debug", skip(self, target, options), fields(target = %target.describe()))]
    pub fn run_action(&self, target: &Target, action: &str, options: &ActionOptions) -> Result<bool, AutomationError> {
        let secure = self.config.secure_mode;
        let parsed = Action::parse(action);
        let label = match (&options.description, &parsed) {
            (Some(description), _) => description.clone(),
            (None, Ok(parsed)) => parsed.display(secure),
            (None, Err(_)) => mask_action_text(action, secure),
        };
        match parsed.and_then(|parsed| self.perform(target, &parsed, options)) {
            Ok(()) => {
                self.notifier()
                    .notify("Action", &format!("Success: {label}"), options.notify_style);
                Ok(true)
            }
            Err(AutomationError::Stopped) => Err(AutomationError::Stopped),
            Err(e) => {
                self.report_failure("run_action", &label, &e);
                if options.raise_on_failure {
                    Err(e)
                } else {
                    Ok(false)
                }
            }
        }
    }

    fn perform(&self, target: &Target, action: &Action, options: &ActionOptions) -> Result<(), AutomationError> {
        self.wait_for_user();
        let timing = self.timing(options.timeout, options.retry_interval);
        let element = self.resolve_target(target, timing)?;

        if options.scroll_if_needed {
            self.scroll_until_visible(&element, options, timing)?;
        }
        if !options.delay_before.is_zero() {
            std::thread::sleep(options.delay_before);
        }
        if !action.command().is_background_safe() {
            self.ensure_active(&element, action, options.auto_activate)?;
        }
        {
            let _acting = self.activity.as_ref().map(ActivityMonitor::bot_acting);
            debug!("Executing {} on {}", action.display(self.config.secure_mode), element.display_text());
            action.execute(&element)?;
        }
        if !options.delay_after.is_zero() {
            std::thread::sleep(options.delay_after);
        }
        Ok(())
    }

    fn ensure_active(&self, element: &UIElement, action: &Action, auto_activate: bool) -> Result<(), AutomationError> {
        let window = element.top_level_window()?.unwrap_or_else(|| element.clone());
        let active = window.state(StateFlag::Active).unwrap_or(false);
        let minimized = window.state(StateFlag::Minimized).unwrap_or(false);
        if active && !minimized {
            return Ok(());
        }
        if !auto_activate {
            return Err(AutomationError::ActivationRequired {
                window: window.name().unwrap_or_default(),
                command: action.command().to_string(),
            });
        }
        info!("Activating {} before {}", window.display_text(), action.command());
        window.maximize()?;
        std::thread::sleep(ACTIVATION_SETTLE);
        Ok(())
    }

    fn scroll_until_visible(
        &self,
        element: &UIElement,
        options: &ActionOptions,
        timing: Timing,
    ) -> Result<(), AutomationError> {
        if element.is_visible() {
            return Ok(());
        }
        let container = match &options.scroll_container {
            Some(spec) => {
                let window = element.top_level_window()?.unwrap_or_else(|| element.clone());
                self.resolver.find_element(&window, spec, timing)?
            }
            None => element.clone(),
        };
        for attempt in 1..=options.max_scroll_attempts {
            if let Err(e) = container.scroll(options.scroll_direction, 1) {
                debug!("Pattern scroll failed ({}), using the mouse wheel", e);
                container.mouse_scroll(options.scroll_direction)?;
            }
            std::thread::sleep(SCROLL_SETTLE);
            if element.is_visible() {
                debug!("Target visible after {} scroll step(s)", attempt);
                return Ok(());
            }
        }
        Err(AutomationError::ElementNotVisible(format!(
            "{} after {} scroll attempts",
            element.display_text(),
            options.max_scroll_attempts
        )))
    }

    /// Reads a named property, or one of `text`, `texts`, `value`, `is_toggled`.
    /// Resolution failures are reported and yield `Ok(None)`.
    pub fn get_property(
        &self,
        target: &Target,
        property: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<Value>, AutomationError> {
        let read = PropertyRead::parse(property)?;
        self.wait_for_user();
        let element = match self.resolve_target(target, self.timing(timeout, None)) {
            Ok(element) => element,
            Err(AutomationError::Stopped) => return Err(AutomationError::Stopped),
            Err(e) => {
                self.report_failure("get_property", property, &e);
                return Ok(None);
            }
        };
        let finder = self.resolver.finder();
        let value = match read {
            PropertyRead::Named(property) => finder.get_property(&element, property),
            PropertyRead::Text => element.name().ok().map(Value::from),
            PropertyRead::Texts => {
                let mut texts = vec![Value::from(element.name().unwrap_or_default())];
                for child in element.children().unwrap_or_default() {
                    texts.push(Value::from(child.name().unwrap_or_default()));
                }
                Some(Value::Array(texts))
            }
            PropertyRead::Value => match element.pattern_value(PatternProperty::Value) {
                Ok(Some(value)) => Some(value),
                _ => element.name().ok().map(Value::from),
            },
            PropertyRead::IsToggled => {
                let state = element.pattern_value(PatternProperty::ToggleState).ok().flatten();
                Some(Value::Bool(state.as_ref().and_then(Value::as_str) == Some("On")))
            }
        };
        Ok(value)
    }

    /// With an element, whether it is visible. With specifications, whether
    /// exactly one match resolves in time. Only a stop request is an error.
    pub fn check_exists(&self, target: &Target, timeout: Option<Duration>) -> Result<bool, AutomationError> {
        self.wait_for_user();
        match target {
            Target::Element(element) => Ok(element.is_visible()),
            Target::Spec { window, element } => self.exists(window, element.as_ref(), self.timing(timeout, None)),
        }
    }

    fn exists(
        &self,
        window: &Specification,
        element: Option<&Specification>,
        timing: Timing,
    ) -> Result<bool, AutomationError> {
        match self.resolver.resolve(window, element, timing) {
            Ok(_) => Ok(true),
            Err(AutomationError::Stopped) => Err(AutomationError::Stopped),
            Err(e) => {
                debug!("Existence check negative: {}", e);
                Ok(false)
            }
        }
    }

    /// Polls until every filter of `state` holds for the target.
    /// Returns `Ok(false)` when the timeout runs out.
    #[instrument(level = "debug", skip(self, target, state), fields(state = %state))]
    pub fn wait_for_state(
        &self,
        target: &Target,
        state: &Specification,
        timeout: Option<Duration>,
        retry_interval: Option<Duration>,
    ) -> Result<bool, AutomationError> {
        let timing = self.timing(timeout, retry_interval);
        self.wait_for_user();
        let started = Instant::now();
        let element = match self.resolve_target(target, timing) {
            Ok(element) => element,
            Err(AutomationError::Stopped) => return Err(AutomationError::Stopped),
            Err(e) => {
                self.report_failure("wait_for_state", &state.to_string(), &e);
                return Ok(false);
            }
        };
        let finder = self.resolver.finder();
        let mut paused = Duration::ZERO;
        loop {
            paused += self.resolver.wait_while_paused()?;
            self.wait_for_user();
            let satisfied = state
                .filters()
                .iter()
                .all(|(property, criterion)| finder.check_condition(&element, *property, criterion));
            if satisfied {
                info!("State {} reached after {:.2}s", state, started.elapsed().as_secs_f64());
                return Ok(true);
            }
            let remaining = (timing.timeout + paused).saturating_sub(started.elapsed());
            if remaining.is_zero() {
                break;
            }
            std::thread::sleep(timing.retry_interval.min(remaining));
        }
        let error = AutomationError::WaitTimeout(format!(
            "{} did not reach {} within {:.1}s",
            element.display_text(),
            state,
            timing.timeout.as_secs_f64()
        ));
        self.report_failure("wait_for_state", &state.to_string(), &error);
        Ok(false)
    }

    /// Probes each case in order until one exists. `Ok(None)` when none
    /// appeared within the timeout.
    pub fn get_next_state(
        &self,
        cases: &[StateCase],
        timeout: Option<Duration>,
        retry_interval: Option<Duration>,
    ) -> Result<Option<String>, AutomationError> {
        let timing = self.timing(timeout, retry_interval);
        let probe = Timing::new(NEXT_STATE_PROBE_TIMEOUT, timing.retry_interval.min(NEXT_STATE_PROBE_TIMEOUT));
        for case in cases.iter().filter(|c| c.window.is_none()) {
            warn!("Skipping state '{}': no window specification", case.name);
        }
        let started = Instant::now();
        loop {
            self.wait_for_user();
            for case in cases {
                let Some(window) = &case.window else { continue };
                if self.exists(window, case.element.as_ref(), probe)? {
                    info!("Next state is '{}'", case.name);
                    return Ok(Some(case.name.clone()));
                }
            }
            let remaining = timing.timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                info!("None of {} states appeared within {:.1}s", cases.len(), timing.timeout.as_secs_f64());
                return Ok(None);
            }
            std::thread::sleep(timing.retry_interval.min(remaining));
        }
    }

    /// Resolves the window once, then each entry with a short budget. Misses
    /// are skipped; a snapshot with no matches at all is an error.
    pub fn create_snapshot(
        &self,
        name: &str,
        window_spec: &Specification,
        elements: &[(String, Specification)],
        timeout: Option<Duration>,
    ) -> Result<UISnapshot, AutomationError> {
        let timing = self.timing(timeout, None);
        let window = self.resolver.find_window(window_spec, timing)?;
        self.snapshot_window(name, &window, elements, timing.timeout)
    }

    /// [`create_snapshot`](Self::create_snapshot) over a window that is already resolved.
    /// `creation_timeout` bounds later healing of stale entries.
    pub fn snapshot_window(
        &self,
        name: &str,
        window: &UIElement,
        elements: &[(String, Specification)],
        creation_timeout: Duration,
    ) -> Result<UISnapshot, AutomationError> {
        let entry_timing = Timing::new(SNAPSHOT_ENTRY_TIMEOUT, SNAPSHOT_RETRY_INTERVAL);
        let mut snapshot = UISnapshot::new(name, self.resolver.clone());
        for (key, spec) in elements {
            match self.resolver.find_element(window, spec, entry_timing) {
                Ok(element) => {
                    snapshot.insert(key.clone(), element, Recipe::new(window.clone(), spec.clone(), creation_timeout));
                }
                Err(AutomationError::Stopped) => return Err(AutomationError::Stopped),
                Err(e) => debug!("Snapshot '{}' skipped '{}': {}", name, key, e),
            }
        }
        let message = format!("Snapshot '{}': Found {}/{}", name, snapshot.len(), elements.len());
        if snapshot.is_empty() && !elements.is_empty() {
            self.notifier().notify("Snapshot", &message, NotifyStyle::Error);
            return Err(AutomationError::ElementNotFound(format!(
                "None of the {} elements of snapshot '{}' were found",
                elements.len(),
                name
            )));
        }
        self.notifier().notify("Snapshot", &message, NotifyStyle::Info);
        Ok(snapshot)
    }
}

/// Masks the value part of a raw action string in secure mode.
fn mask_action_text(action: &str, secure: bool) -> String {
    match Action::parse(action) {
        Ok(parsed) => parsed.display(secure),
        Err(_) => match action.split_once(':') {
            Some((command, _)) if secure => format!("{command}:***"),
            _ => action.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_reads_accept_extras_and_named_properties() {
        assert_eq!(PropertyRead::parse("texts").unwrap(), PropertyRead::Texts);
        assert_eq!(PropertyRead::parse("Is_Toggled").unwrap(), PropertyRead::IsToggled);
        assert_eq!(
            PropertyRead::parse("pwa_title").unwrap(),
            PropertyRead::Named(Property::PwaTitle)
        );
        assert!(matches!(
            PropertyRead::parse("colour"),
            Err(AutomationError::InvalidArgument(_))
        ));
    }

    #[test]
    fn failure_labels_mask_values_in_secure_mode() {
        assert_eq!(mask_action_text("type_keys:secret", true), "type_keys:***");
        assert_eq!(mask_action_text("teleport:home", true), "teleport:***");
        assert_eq!(mask_action_text("teleport:home", false), "teleport:home");
        assert_eq!(mask_action_text("click", true), "click");
    }
}
