use async_trait::async_trait;
pub use nfse_common::error::BackendError;
use nfse_common::protocol::{ClickMethod, ElementHandle, LocatorKind, SubmitKey};

#[derive(Debug, Clone)]
pub struct NavigationResult {
    pub url: String,
    pub title: String,
}

/// The Backend trait is the interface every browser driver implements.
///
/// Element handles are only valid until the next navigation; backends
/// report stale handles as [`BackendError::ElementStale`].
#[async_trait]
pub trait Backend: Send + Sync {
    /// Launch the backend (start or connect to the browser).
    async fn launch(&mut self) -> Result<(), BackendError>;

    /// Close the backend and cleanup resources.
    async fn close(&mut self) -> Result<(), BackendError>;

    /// Check if the backend is ready to accept commands.
    async fn is_ready(&self) -> bool;

    /// Navigate to a specific URL.
    async fn navigate(&mut self, url: &str) -> Result<NavigationResult, BackendError>;

    async fn current_url(&mut self) -> Result<String, BackendError>;

    /// All elements matching a selector, visible or not, in document order.
    async fn find_elements(
        &mut self,
        kind: LocatorKind,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, BackendError>;

    async fn is_displayed(&mut self, element: &ElementHandle) -> Result<bool, BackendError>;

    /// Rendered text of the element.
    async fn text(&mut self, element: &ElementHandle) -> Result<String, BackendError>;

    async fn attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, BackendError>;

    /// DOM property (e.g. the live `value` of an input).
    async fn property(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, BackendError>;

    async fn is_selected(&mut self, element: &ElementHandle) -> Result<bool, BackendError>;

    async fn scroll_into_view(&mut self, element: &ElementHandle) -> Result<(), BackendError>;

    /// Deliver a click using the given method.
    async fn click(
        &mut self,
        element: &ElementHandle,
        method: ClickMethod,
    ) -> Result<(), BackendError>;

    async fn clear(&mut self, element: &ElementHandle) -> Result<(), BackendError>;

    async fn send_keys(&mut self, element: &ElementHandle, text: &str) -> Result<(), BackendError>;

    async fn press_key(&mut self, element: &ElementHandle, key: SubmitKey)
    -> Result<(), BackendError>;

    /// Value of `document.readyState`.
    async fn ready_state(&mut self) -> Result<String, BackendError>;

    /// Capture a screenshot of the current viewport as PNG.
    async fn screenshot(&mut self) -> Result<Vec<u8>, BackendError>;

    /// Serialized markup of the current page.
    async fn page_source(&mut self) -> Result<String, BackendError>;

    /// Execute a script in the browser context.
    async fn execute_script(&mut self, _script: &str) -> Result<serde_json::Value, BackendError> {
        Err(BackendError::NotSupported("execute_script".into()))
    }
}
