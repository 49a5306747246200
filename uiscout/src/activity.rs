//! Human activity detection.
//!
//! A background listener stamps the time of the last human input. The
//! automation thread marks its own synthetic input with [`BotActingGuard`] so
//! it is not mistaken for the operator, and waits for a quiet period before
//! acting.

use crate::errors::AutomationError;
use crate::notify::{Notifier, NotifyStyle};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct ActivityInner {
    last_human_activity: Mutex<Option<Instant>>,
    bot_acting: Mutex<bool>,
    cooldown: Duration,
    poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct ActivityMonitor {
    inner: Arc<ActivityInner>,
}

/// Marks the automation as acting for as long as it is alive.
#[must_use = "the bot-acting flag is cleared when the guard drops"]
pub struct BotActingGuard {
    inner: Arc<ActivityInner>,
}

impl Drop for BotActingGuard {
    fn drop(&mut self) {
        if let Ok(mut acting) = self.inner.bot_acting.lock() {
            *acting = false;
        }
    }
}

impl ActivityMonitor {
    pub fn new(cooldown: Duration) -> Self {
        Self::with_poll_interval(cooldown, IDLE_POLL_INTERVAL)
    }

    pub fn with_poll_interval(cooldown: Duration, poll_interval: Duration) -> Self {
        Self {
            inner: Arc::new(ActivityInner {
                last_human_activity: Mutex::new(None),
                bot_acting: Mutex::new(false),
                cooldown,
                poll_interval,
            }),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.inner.cooldown
    }

    /// Records human input, unless the automation itself is acting.
    pub fn record_human_activity(&self) {
        if self.is_bot_acting() {
            return;
        }
        if let Ok(mut last) = self.inner.last_human_activity.lock() {
            *last = Some(Instant::now());
        }
    }

    pub fn bot_acting(&self) -> BotActingGuard {
        if let Ok(mut acting) = self.inner.bot_acting.lock() {
            *acting = true;
        }
        BotActingGuard {
            inner: self.inner.clone(),
        }
    }

    pub fn is_bot_acting(&self) -> bool {
        self.inner.bot_acting.lock().map(|a| *a).unwrap_or(false)
    }

    pub fn is_user_idle(&self) -> bool {
        match self.inner.last_human_activity.lock() {
            Ok(last) => last.map_or(true, |t| t.elapsed() >= self.inner.cooldown),
            Err(_) => true,
        }
    }

    /// Blocks until the operator has been idle for the cooldown period.
    /// Notifies once when pausing and once when resuming.
    pub fn wait_for_user_idle(&self, notifier: &dyn Notifier) {
        let mut paused = false;
        while !self.is_user_idle() {
            if !paused {
                notifier.notify(
                    "Automation Paused",
                    "User activity detected! Pausing automation...",
                    NotifyStyle::Warning,
                );
                paused = true;
            }
            std::thread::sleep(self.inner.poll_interval);
        }
        if paused {
            notifier.notify(
                "Automation Resumed",
                "User is idle. Resuming automation...",
                NotifyStyle::Success,
            );
        }
    }

    /// Starts the global input listener on a background thread.
    #[cfg(feature = "input-listener")]
    pub fn start_listener(&self) -> Result<(), AutomationError> {
        let monitor = self.clone();
        std::thread::Builder::new()
            .name("uiscout-input-listener".to_string())
            .spawn(move || {
                tracing::info!("Human activity listener started");
                if let Err(error) = rdev::listen(move |event: rdev::Event| match event.event_type {
                    rdev::EventType::MouseMove { .. }
                    | rdev::EventType::ButtonPress(_)
                    | rdev::EventType::Wheel { .. }
                    | rdev::EventType::KeyPress(_) => monitor.record_human_activity(),
                    _ => {}
                }) {
                    tracing::error!("Human activity listener failed: {:?}", error);
                }
            })
            .map_err(|e| AutomationError::PlatformError(format!("Failed to spawn input listener: {e}")))?;
        Ok(())
    }

    #[cfg(not(feature = "input-listener"))]
    pub fn start_listener(&self) -> Result<(), AutomationError> {
        tracing::debug!("Input listener requested but the `input-listener` feature is disabled");
        Err(AutomationError::UnsupportedOperation(
            "uiscout was built without the `input-listener` feature".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MemoryNotifier;

    #[test]
    fn bot_input_is_not_human_activity() {
        let monitor = ActivityMonitor::new(Duration::from_secs(60));
        {
            let _guard = monitor.bot_acting();
            assert!(monitor.is_bot_acting());
            monitor.record_human_activity();
        }
        assert!(!monitor.is_bot_acting());
        assert!(monitor.is_user_idle());
        monitor.record_human_activity();
        assert!(!monitor.is_user_idle());
    }

    #[test]
    fn waiting_notifies_only_on_edges() {
        let monitor = ActivityMonitor::with_poll_interval(Duration::from_millis(60), Duration::from_millis(10));
        let notifier = MemoryNotifier::new();
        monitor.wait_for_user_idle(&notifier);
        assert!(notifier.events().is_empty());

        monitor.record_human_activity();
        monitor.wait_for_user_idle(&notifier);
        let events = notifier.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].style, NotifyStyle::Warning);
        assert_eq!(events[1].message, "User is idle. Resuming automation...");
    }
}
