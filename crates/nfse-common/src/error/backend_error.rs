/// Errors raised by a browser backend.
///
/// Element-level failures are recoverable (see [`BackendError::is_recoverable`]):
/// the locator falls through to the next candidate or click method.
/// Everything else is escalated to the caller.
#[derive(thiserror::Error, Debug, Clone)]
pub enum BackendError {
    // ============================================================
    // Navigation Errors
    // ============================================================
    #[error("Navigation failed: {0}")]
    Navigation(String),

    // ============================================================
    // Element Errors
    // ============================================================
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Element {0} is stale (removed from DOM)")]
    ElementStale(String),

    #[error("Element {id} is not interactable: {reason}")]
    ElementNotInteractable { id: String, reason: String },

    #[error("Click rejected by browser: {0}")]
    ClickRejected(String),

    #[error("Invalid selector: {selector}")]
    SelectorInvalid { selector: String },

    // ============================================================
    // Execution Errors
    // ============================================================
    #[error("Script execution error: {0}")]
    ScriptError(String),

    #[error("Timeout: {operation}")]
    TimeoutWithContext { operation: String },

    // ============================================================
    // System Errors
    // ============================================================
    #[error("Connection lost")]
    ConnectionLost,

    #[error("Not ready")]
    NotReady,

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("{0}")]
    Other(String),
}

impl BackendError {
    /// Errors the locator can recover from by trying another candidate or
    /// click method.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BackendError::ElementNotFound(_)
                | BackendError::ElementStale(_)
                | BackendError::ElementNotInteractable { .. }
                | BackendError::ClickRejected(_)
                | BackendError::SelectorInvalid { .. }
                | BackendError::ScriptError(_)
        )
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(BackendError::ClickRejected("intercepted".into()).is_recoverable());
        assert!(BackendError::ElementNotFound("#x".into()).is_recoverable());
        assert!(!BackendError::ConnectionLost.is_recoverable());
        assert!(!BackendError::NotReady.is_recoverable());
    }
}
