use crate::chromedriver::{self, ChromeDriverProcess};
use crate::elements::ElementTable;
use crate::webdriver::{self, WebDriverClient};
use async_trait::async_trait;
use fantoccini::Locator;
use fantoccini::elements::Element;
use fantoccini::error::{CmdError, ErrorStatus};
use nfse_common::protocol::{ClickMethod, ElementHandle, LocatorKind, SubmitKey};
use nfse_engine::backend::{Backend, BackendError, NavigationResult};
use tracing::{debug, info, warn};

const SCRIPTED_CLICK: &str = "arguments[0].click();";

const SYNTHETIC_CLICK: &str = r#"
    const el = arguments[0];
    for (const type of ['mousedown', 'mouseup', 'click']) {
        el.dispatchEvent(new MouseEvent(type, { bubbles: true, cancelable: true, view: window }));
    }
"#;

const FORM_SUBMIT: &str = r#"
    const el = arguments[0];
    const form = el.form || el.closest('form');
    if (!form) {
        throw new Error('element is not inside a form');
    }
    if (typeof form.requestSubmit === 'function') {
        form.requestSubmit(el.type === 'submit' ? el : undefined);
    } else {
        form.submit();
    }
"#;

const SCROLL_INTO_VIEW: &str = "arguments[0].scrollIntoView({ block: 'center', inline: 'nearest' });";

/// Backend driving Chrome through a W3C WebDriver server.
///
/// Either connects to an existing server or launches a local chromedriver.
/// Elements found on the page are kept in a table keyed by the handle ids
/// given out to the engine; the table is cleared on navigation and whenever
/// a lookup runs on a different URL.
pub struct WebDriverBackend {
    client: Option<WebDriverClient>,
    webdriver_url: Option<String>,
    fallback_url: Option<String>,
    driver: Option<ChromeDriverProcess>,
    headless: bool,
    port: u16,
    elements: ElementTable<Element>,
}

impl WebDriverBackend {
    /// Backend that launches chromedriver on the default port.
    pub fn new() -> Self {
        Self {
            client: None,
            webdriver_url: None,
            fallback_url: None,
            driver: None,
            headless: false,
            port: chromedriver::DEFAULT_CHROMEDRIVER_PORT,
            elements: ElementTable::default(),
        }
    }

    /// Backend connecting to an already running WebDriver server.
    pub fn with_url(webdriver_url: impl Into<String>) -> Self {
        Self {
            webdriver_url: Some(webdriver_url.into()),
            ..Self::new()
        }
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Port for a launched chromedriver. Useful for parallel testing.
    pub fn on_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Server to connect to when no chromedriver binary can be found.
    pub fn with_fallback_url(mut self, url: impl Into<String>) -> Self {
        self.fallback_url = Some(url.into());
        self
    }

    fn client(&self) -> Result<&fantoccini::Client, BackendError> {
        self.client
            .as_ref()
            .map(|c| &c.client)
            .ok_or(BackendError::NotReady)
    }

    fn element(&self, handle: &ElementHandle) -> Result<Element, BackendError> {
        self.elements
            .get(handle.id())
            .ok_or_else(|| BackendError::ElementStale(handle.id().to_string()))
    }

    fn register(&mut self, element: Element) -> ElementHandle {
        ElementHandle::new(self.elements.insert(element))
    }

    async fn run_on(
        &self,
        script: &str,
        handle: &ElementHandle,
    ) -> Result<serde_json::Value, BackendError> {
        let element = self.element(handle)?;
        let arg = serde_json::to_value(&element)?;
        self.client()?
            .execute(script, vec![arg])
            .await
            .map_err(|e| map_cmd_error(e, handle.id()))
    }

    /// URL to connect to, launching chromedriver first when needed.
    async fn resolve_url(&mut self) -> Result<String, BackendError> {
        if let Some(url) = &self.webdriver_url {
            info!("Connecting to external WebDriver at {}...", url);
            return Ok(url.clone());
        }

        if chromedriver::find_chromedriver_binary().is_none()
            && let Some(url) = &self.fallback_url
        {
            warn!("chromedriver not found, connecting to {} instead", url);
            return Ok(url.clone());
        }

        info!("Launching chromedriver on port {}...", self.port);
        let driver = chromedriver::launch_chromedriver(self.port)
            .await
            .map_err(BackendError::Other)?;
        let url = driver.webdriver_url();
        self.driver = Some(driver);
        Ok(url)
    }
}

impl Default for WebDriverBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Translate a WebDriver failure into the engine's taxonomy. `subject` is
/// the element id or selector the command was about.
pub fn map_cmd_error(err: CmdError, subject: &str) -> BackendError {
    match &err {
        CmdError::Standard(wd) => match wd.error {
            ErrorStatus::NoSuchElement => BackendError::ElementNotFound(subject.to_string()),
            ErrorStatus::StaleElementReference => BackendError::ElementStale(subject.to_string()),
            ErrorStatus::ElementClickIntercepted => BackendError::ClickRejected(err.to_string()),
            ErrorStatus::ElementNotInteractable | ErrorStatus::InvalidElementState => {
                BackendError::ElementNotInteractable {
                    id: subject.to_string(),
                    reason: err.to_string(),
                }
            }
            ErrorStatus::InvalidSelector => BackendError::SelectorInvalid {
                selector: subject.to_string(),
            },
            ErrorStatus::JavascriptError => BackendError::ScriptError(err.to_string()),
            ErrorStatus::Timeout | ErrorStatus::ScriptTimeout => BackendError::TimeoutWithContext {
                operation: err.to_string(),
            },
            ErrorStatus::InvalidSessionId | ErrorStatus::NoSuchWindow => {
                BackendError::ConnectionLost
            }
            _ => BackendError::Other(err.to_string()),
        },
        _ => BackendError::Other(err.to_string()),
    }
}

#[async_trait]
impl Backend for WebDriverBackend {
    async fn launch(&mut self) -> Result<(), BackendError> {
        let url = self.resolve_url().await?;
        let headless = self.headless || chromedriver::is_headless_environment();
        if headless {
            info!("Headless mode enabled (forced: {})", self.headless);
        }

        let client = WebDriverClient::connect(&url, Some(webdriver::chrome_capabilities(headless)))
            .await
            .map_err(|e| BackendError::Other(e.to_string()))?;
        self.client = Some(client);
        info!("WebDriver session ready at {}", url);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        self.elements.clear();
        if let Some(client) = self.client.take() {
            client
                .close()
                .await
                .map_err(|e| BackendError::Other(e.to_string()))?;
        }
        self.driver = None;
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        self.client.is_some()
    }

    async fn navigate(&mut self, url: &str) -> Result<NavigationResult, BackendError> {
        info!("Navigating to: {}", url);
        self.elements.clear();
        let client = self.client()?;
        client
            .goto(url)
            .await
            .map_err(|e| BackendError::Navigation(e.to_string()))?;

        let title = client.title().await.unwrap_or_default();
        let url = client
            .current_url()
            .await
            .map(|u| u.to_string())
            .unwrap_or_default();
        Ok(NavigationResult { url, title })
    }

    async fn current_url(&mut self) -> Result<String, BackendError> {
        self.client()?
            .current_url()
            .await
            .map(|u| u.to_string())
            .map_err(|e| map_cmd_error(e, "current_url"))
    }

    async fn find_elements(
        &mut self,
        kind: LocatorKind,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, BackendError> {
        let locator = match kind {
            LocatorKind::Css => Locator::Css(selector),
            LocatorKind::XPath => Locator::XPath(selector),
        };
        let client = self.client()?;
        let page = client
            .current_url()
            .await
            .map(|u| u.to_string())
            .map_err(|e| map_cmd_error(e, "current_url"))?;
        let found = match client.find_all(locator).await {
            Ok(found) => found,
            Err(e) if e.is_no_such_element() => Vec::new(),
            Err(e) => return Err(map_cmd_error(e, selector)),
        };
        if self.elements.sync_page(&page) {
            debug!("Page changed to {}; element handles dropped", page);
        }
        debug!("{} {} matched {} element(s)", kind, selector, found.len());
        Ok(found.into_iter().map(|el| self.register(el)).collect())
    }

    async fn is_displayed(&mut self, element: &ElementHandle) -> Result<bool, BackendError> {
        self.element(element)?
            .is_displayed()
            .await
            .map_err(|e| map_cmd_error(e, element.id()))
    }

    async fn text(&mut self, element: &ElementHandle) -> Result<String, BackendError> {
        self.element(element)?
            .text()
            .await
            .map_err(|e| map_cmd_error(e, element.id()))
    }

    async fn attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, BackendError> {
        self.element(element)?
            .attr(name)
            .await
            .map_err(|e| map_cmd_error(e, element.id()))
    }

    async fn property(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, BackendError> {
        self.element(element)?
            .prop(name)
            .await
            .map_err(|e| map_cmd_error(e, element.id()))
    }

    async fn is_selected(&mut self, element: &ElementHandle) -> Result<bool, BackendError> {
        self.element(element)?
            .is_selected()
            .await
            .map_err(|e| map_cmd_error(e, element.id()))
    }

    async fn scroll_into_view(&mut self, element: &ElementHandle) -> Result<(), BackendError> {
        self.run_on(SCROLL_INTO_VIEW, element).await.map(|_| ())
    }

    async fn click(
        &mut self,
        element: &ElementHandle,
        method: ClickMethod,
    ) -> Result<(), BackendError> {
        debug!("Clicking {} ({})", element, method.name());
        match method {
            ClickMethod::Native => self
                .element(element)?
                .click()
                .await
                .map_err(|e| map_cmd_error(e, element.id())),
            ClickMethod::Scripted => self.run_on(SCRIPTED_CLICK, element).await.map(|_| ()),
            ClickMethod::SyntheticEvent => self.run_on(SYNTHETIC_CLICK, element).await.map(|_| ()),
            ClickMethod::FormSubmit => self.run_on(FORM_SUBMIT, element).await.map(|_| ()),
        }
    }

    async fn clear(&mut self, element: &ElementHandle) -> Result<(), BackendError> {
        self.element(element)?
            .clear()
            .await
            .map_err(|e| map_cmd_error(e, element.id()))
    }

    async fn send_keys(&mut self, element: &ElementHandle, text: &str) -> Result<(), BackendError> {
        self.element(element)?
            .send_keys(text)
            .await
            .map_err(|e| map_cmd_error(e, element.id()))
    }

    async fn press_key(
        &mut self,
        element: &ElementHandle,
        key: SubmitKey,
    ) -> Result<(), BackendError> {
        self.element(element)?
            .send_keys(&key.code_point().to_string())
            .await
            .map_err(|e| map_cmd_error(e, element.id()))
    }

    async fn ready_state(&mut self) -> Result<String, BackendError> {
        let state = self
            .client()?
            .execute("return document.readyState;", vec![])
            .await
            .map_err(|e| map_cmd_error(e, "document"))?;
        Ok(state.as_str().unwrap_or_default().to_string())
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, BackendError> {
        self.client()?
            .screenshot()
            .await
            .map_err(|e| BackendError::Other(format!("Screenshot failed: {}", e)))
    }

    async fn page_source(&mut self) -> Result<String, BackendError> {
        self.client()?
            .source()
            .await
            .map_err(|e| BackendError::Other(format!("Page source failed: {}", e)))
    }

    async fn execute_script(&mut self, script: &str) -> Result<serde_json::Value, BackendError> {
        self.client()?
            .execute(script, vec![])
            .await
            .map_err(|e| map_cmd_error(e, "script"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fantoccini::error::WebDriver;

    #[tokio::test]
    async fn test_not_ready_before_launch() {
        let mut backend = WebDriverBackend::with_url("http://localhost:1");
        assert!(!backend.is_ready().await);
        assert!(matches!(
            backend.navigate("about:blank").await,
            Err(BackendError::NotReady)
        ));
    }

    #[tokio::test]
    async fn test_unknown_handle_is_stale() {
        let mut backend = WebDriverBackend::new();
        let result = backend.text(&ElementHandle::new("e42")).await;
        assert!(matches!(result, Err(BackendError::ElementStale(id)) if id == "e42"));
    }

    #[tokio::test]
    async fn test_close_without_launch_is_ok() {
        let mut backend = WebDriverBackend::new().headless(true).on_port(9600);
        assert!(backend.close().await.is_ok());
    }

    #[test]
    fn test_map_cmd_error_classification() {
        let standard = |status| CmdError::Standard(WebDriver::new(status, "boom"));

        assert!(matches!(
            map_cmd_error(standard(ErrorStatus::NoSuchElement), "#emitir"),
            BackendError::ElementNotFound(s) if s == "#emitir"
        ));
        assert!(matches!(
            map_cmd_error(standard(ErrorStatus::StaleElementReference), "e3"),
            BackendError::ElementStale(id) if id == "e3"
        ));
        assert!(matches!(
            map_cmd_error(standard(ErrorStatus::ElementClickIntercepted), "e3"),
            BackendError::ClickRejected(_)
        ));
        assert!(matches!(
            map_cmd_error(standard(ErrorStatus::InvalidSessionId), "e3"),
            BackendError::ConnectionLost
        ));
        assert!(matches!(
            map_cmd_error(CmdError::WaitTimeout, "e3"),
            BackendError::Other(_)
        ));
    }
}
