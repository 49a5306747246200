use tracing::{debug, instrument};

use crate::element::UIElement;
use crate::errors::AutomationError;
use crate::resolver::{Resolver, Timing};
use crate::spec::Specification;
use std::sync::Arc;
use std::time::Duration;
use tokio::task;

// Default timeout if none is specified on the locator itself
const DEFAULT_LOCATOR_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Async handle on a window/element specification pair.
///
/// Resolution is blocking and runs on tokio's blocking pool, so awaiting a
/// locator never stalls the runtime.
#[derive(Clone)]
pub struct Locator {
    resolver: Arc<Resolver>,
    window: Specification,
    element: Option<Specification>,
    timeout: Duration,
    retry_interval: Duration,
}

impl Locator {
    pub fn new(resolver: Arc<Resolver>, window: Specification) -> Self {
        Self {
            resolver,
            window,
            element: None,
            timeout: DEFAULT_LOCATOR_TIMEOUT,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    /// Narrows the locator to an element inside its window.
    pub fn element(mut self, element: Specification) -> Self {
        self.element = Some(element);
        self
    }

    pub fn set_default_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn set_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn describe(&self) -> String {
        match &self.element {
            Some(element) => format!("{element} in {}", self.window),
            None => self.window.to_string(),
        }
    }

    /// Waits for exactly one match. Not finding one in time is a `Timeout`.
    #[instrument(level = "debug", skip(self, timeout))]
    pub async fn wait(&self, timeout: Option<Duration>) -> Result<UIElement, AutomationError> {
        debug!("Waiting for {}", self.describe());
        let effective_timeout = timeout.unwrap_or(self.timeout);
        let timing = Timing::new(effective_timeout, self.retry_interval);
        let resolver = self.resolver.clone();
        let window = self.window.clone();
        let element = self.element.clone();
        let described = self.describe();

        task::spawn_blocking(move || resolver.resolve(&window, element.as_ref(), timing))
            .await
            .map_err(|e| AutomationError::PlatformError(format!("Task join error: {e}")))?
            .map_err(|e| match e {
                AutomationError::WindowNotFound(inner) | AutomationError::ElementNotFound(inner) => {
                    AutomationError::Timeout(format!(
                        "Timed out after {effective_timeout:?} waiting for {described}. Original error: {inner}"
                    ))
                }
                other => other,
            })
    }

    pub async fn first(&self, timeout: Option<Duration>) -> Result<UIElement, AutomationError> {
        self.wait(timeout).await
    }

    /// Every current match in the resolved window, without waiting for
    /// elements to appear.
    pub async fn all(&self, timeout: Option<Duration>) -> Result<Vec<UIElement>, AutomationError> {
        let timing = Timing::new(timeout.unwrap_or(self.timeout), self.retry_interval);
        let resolver = self.resolver.clone();
        let window = self.window.clone();
        let element = self.element.clone();
        task::spawn_blocking(move || {
            let window = resolver.find_window(&window, timing)?;
            match element {
                Some(spec) => resolver.find_all(&window, &spec),
                None => Ok(vec![window]),
            }
        })
        .await
        .map_err(|e| AutomationError::PlatformError(format!("Task join error: {e}")))?
    }

    /// Whether exactly one match resolves within `timeout`.
    pub async fn exists(&self, timeout: Option<Duration>) -> Result<bool, AutomationError> {
        match self.wait(timeout).await {
            Ok(_) => Ok(true),
            Err(AutomationError::Stopped) => Err(AutomationError::Stopped),
            Err(_) => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finder::ElementFinder;
    use crate::platforms::memory::{MemoryEngine, MemoryNode, MemoryTree};
    use crate::platforms::AccessibilityEngine;
    use serde_json::json;

    fn locator(tree: &MemoryTree, window: serde_json::Value) -> Locator {
        let engine: Arc<dyn AccessibilityEngine> = Arc::new(MemoryEngine::new(tree.clone()));
        let resolver = Arc::new(Resolver::new(ElementFinder::new(engine)));
        Locator::new(resolver, Specification::from_value(&window).unwrap())
            .set_retry_interval(Duration::from_millis(20))
    }

    fn tree() -> MemoryTree {
        MemoryTree::with_windows(vec![MemoryNode::new("Window", "Settings").with_children(vec![
            MemoryNode::new("CheckBox", "Wi-Fi"),
            MemoryNode::new("CheckBox", "Bluetooth"),
        ])])
    }

    #[tokio::test]
    async fn waits_for_element() {
        let tree = tree();
        let found = locator(&tree, json!({"pwa_title": "Settings"}))
            .element(Specification::from_value(&json!({"pwa_title": ["contains", "Blue"]})).unwrap())
            .wait(Some(Duration::from_millis(500)))
            .await
            .unwrap();
        assert_eq!(found.name().unwrap(), "Bluetooth");
    }

    #[tokio::test]
    async fn not_found_becomes_timeout() {
        let tree = tree();
        let err = locator(&tree, json!({"pwa_title": "Display"}))
            .wait(Some(Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, AutomationError::Timeout(_)));
    }

    #[tokio::test]
    async fn all_returns_every_match() {
        let tree = tree();
        let locator = locator(&tree, json!({"pwa_title": "Settings"}))
            .element(Specification::from_value(&json!({"pwa_control_type": "CheckBox"})).unwrap());
        assert_eq!(locator.all(Some(Duration::from_millis(200))).await.unwrap().len(), 2);
        assert!(!locator.exists(Some(Duration::from_millis(100))).await.unwrap());
    }
}
