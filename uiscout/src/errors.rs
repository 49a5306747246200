use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("Window not found: {0}")]
    WindowNotFound(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Found {count} ambiguous {entity}s. Details: {candidates:?}")]
    Ambiguous {
        count: usize,
        entity: String,
        candidates: Vec<String>,
    },

    #[error("Action failed: {0}")]
    ActionFailed(String),

    #[error("Window '{window}' is not active. Action '{command}' requires activation.")]
    ActivationRequired { window: String, command: String },

    #[error("Task stopped by user")]
    Stopped,

    #[error("Wait timed out: {0}")]
    WaitTimeout(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Invalid specification: {0}")]
    InvalidSpec(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Platform-specific error: {0}")]
    PlatformError(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Element is not visible: {0}")]
    ElementNotVisible(String),

    #[error("Failed to scroll element into view: {0}")]
    ScrollFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AutomationError {
    /// Not-found or ambiguous outcome of a resolution.
    pub fn is_resolution_failure(&self) -> bool {
        matches!(
            self,
            AutomationError::WindowNotFound(_)
                | AutomationError::ElementNotFound(_)
                | AutomationError::Ambiguous { .. }
        )
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, AutomationError::Stopped)
    }

    /// Errors that belong to the automation taxonomy. Anything else reaching the
    /// controller boundary is reported with the higher "unexpected" severity.
    pub fn is_expected(&self) -> bool {
        !matches!(
            self,
            AutomationError::PlatformError(_) | AutomationError::Internal(_)
        )
    }
}

impl From<serde_json::Error> for AutomationError {
    fn from(error: serde_json::Error) -> Self {
        AutomationError::InvalidSpec(format!("JSON error: {error}"))
    }
}

impl From<std::io::Error> for AutomationError {
    fn from(error: std::io::Error) -> Self {
        AutomationError::PlatformError(format!("I/O error: {error}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ambiguous_message_lists_candidates() {
        let err = AutomationError::Ambiguous {
            count: 3,
            entity: "window".to_string(),
            candidates: vec!["'A'".to_string(), "'B'".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("Found 3 ambiguous windows"));
        assert!(msg.contains("'A'"));
        assert!(err.is_resolution_failure());
    }

    #[test]
    fn platform_errors_are_unexpected() {
        assert!(!AutomationError::PlatformError("boom".into()).is_expected());
        assert!(AutomationError::Stopped.is_expected());
        assert!(AutomationError::Stopped.is_stopped());
        assert!(!AutomationError::Stopped.is_resolution_failure());
    }
}
