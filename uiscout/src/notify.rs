//! User-facing notifications.
//!
//! Every notification is mirrored to `tracing`; front-ends (a status panel, a
//! toast service) plug in by implementing [`Notifier`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotifyStyle {
    #[default]
    Info,
    Success,
    Warning,
    Error,
    Process,
    Debug,
}

impl fmt::Display for NotifyStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NotifyStyle::Info => "info",
            NotifyStyle::Success => "success",
            NotifyStyle::Warning => "warning",
            NotifyStyle::Error => "error",
            NotifyStyle::Process => "process",
            NotifyStyle::Debug => "debug",
        })
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, message: &str, style: NotifyStyle);
}

fn log_notification(title: &str, message: &str, style: NotifyStyle) {
    match style {
        NotifyStyle::Info | NotifyStyle::Success => info!(style = %style, "{title}: {message}"),
        NotifyStyle::Warning => warn!("{title}: {message}"),
        NotifyStyle::Error => error!("{title}: {message}"),
        NotifyStyle::Process | NotifyStyle::Debug => debug!(style = %style, "{title}: {message}"),
    }
}

/// Notifier that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, title: &str, message: &str, style: NotifyStyle) {
        log_notification(title, message, style);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub style: NotifyStyle,
}

/// Records notifications for later inspection, and logs them.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    events: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Notification> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.events().into_iter().map(|n| n.message).collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, title: &str, message: &str, style: NotifyStyle) {
        log_notification(title, message, style);
        if let Ok(mut events) = self.events.lock() {
            events.push(Notification {
                title: title.to_string(),
                message: message.to_string(),
                style,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_notifier_records_in_order() {
        let notifier = MemoryNotifier::new();
        notifier.notify("Paused", "Waiting", NotifyStyle::Warning);
        notifier.notify("Resumed", "Task resumed.", NotifyStyle::Success);
        let events = notifier.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].style, NotifyStyle::Success);
        assert_eq!(notifier.messages(), vec!["Waiting", "Task resumed."]);
    }

    #[test]
    fn styles_deserialize_lowercase() {
        let style: NotifyStyle = serde_json::from_str("\"warning\"").unwrap();
        assert_eq!(style, NotifyStyle::Warning);
    }
}
