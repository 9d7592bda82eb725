//! Resilient element location and interaction.
//!
//! A [`TargetSpec`] is resolved by trying, in order, its CSS selectors, its
//! XPath expressions and finally a free-text search. The first visible
//! element a selector yields becomes the candidate; if acting on it fails
//! the cascade moves on to the next selector. Clicks go through every
//! [`ClickMethod`] with bounded retries and only count once the page
//! settles.

use crate::backend::{Backend, BackendError};
use crate::config::TimingConfig;
use crate::diagnostics::Diagnostics;
use crate::typing::type_human;
use crate::wait::{Backoff, Poller, is_complete};
use nfse_common::protocol::{
    ClickMethod, ElementHandle, LocatorAction, LocatorKind, Selector, SubmitKey, TargetSpec,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of a locate-and-act call.
#[derive(Debug, Clone, Default)]
pub struct LocateOutcome {
    pub success: bool,
    /// Selector or text that produced the element acted on.
    pub matched: Option<String>,
    pub element: Option<ElementHandle>,
    /// Click method that landed, for click actions.
    pub method: Option<ClickMethod>,
    /// Diagnostic files written while trying.
    pub artifacts: Vec<PathBuf>,
}

impl LocateOutcome {
    fn failed(artifacts: Vec<PathBuf>) -> Self {
        Self {
            artifacts,
            ..Default::default()
        }
    }
}

enum Pass {
    Succeeded {
        matched: String,
        element: ElementHandle,
        method: Option<ClickMethod>,
    },
    /// At least one candidate was found and every attempt on it failed.
    Exhausted,
    NoCandidate,
}

enum ActResult {
    Clicked(ClickMethod),
    Filled,
    Failed,
}

pub struct Locator<'a> {
    backend: &'a mut dyn Backend,
    timing: &'a TimingConfig,
    diagnostics: &'a Diagnostics,
}

impl<'a> Locator<'a> {
    pub fn new(
        backend: &'a mut dyn Backend,
        timing: &'a TimingConfig,
        diagnostics: &'a Diagnostics,
    ) -> Self {
        Self {
            backend,
            timing,
            diagnostics,
        }
    }

    pub async fn click(&mut self, target: &TargetSpec) -> Result<LocateOutcome, BackendError> {
        self.perform(target, &LocatorAction::Click, None).await
    }

    /// Click and treat the appearance of `marker` as the page having settled.
    pub async fn click_until(
        &mut self,
        target: &TargetSpec,
        marker: &TargetSpec,
    ) -> Result<LocateOutcome, BackendError> {
        self.perform(target, &LocatorAction::Click, Some(marker))
            .await
    }

    pub async fn fill(
        &mut self,
        target: &TargetSpec,
        text: &str,
        submit: Option<SubmitKey>,
    ) -> Result<LocateOutcome, BackendError> {
        let action = LocatorAction::Fill {
            text: text.to_string(),
            submit,
        };
        self.perform(target, &action, None).await
    }

    /// Locate `target` and apply `action`, waiting up to the configured
    /// find timeout for a candidate to appear.
    ///
    /// Only backend failures that cannot be recovered by moving on (lost
    /// connection, browser gone) are returned as errors. Exhaustion is a
    /// `LocateOutcome` with `success == false`.
    pub async fn perform(
        &mut self,
        target: &TargetSpec,
        action: &LocatorAction,
        marker: Option<&TargetSpec>,
    ) -> Result<LocateOutcome, BackendError> {
        let label = format!("{} {}", action.name(), target.describe());
        let mut artifacts = Vec::new();
        let mut poller = Poller::new(self.timing.find_timeout(), Backoff::from(self.timing));

        loop {
            match self.cascade(target, action, marker, &label, &mut artifacts).await? {
                Pass::Succeeded {
                    matched,
                    element,
                    method,
                } => {
                    debug!("{} done via {}", label, matched);
                    return Ok(LocateOutcome {
                        success: true,
                        matched: Some(matched),
                        element: Some(element),
                        method,
                        artifacts,
                    });
                }
                Pass::Exhausted => break,
                Pass::NoCandidate => {
                    if !poller.wait().await {
                        break;
                    }
                }
            }
        }

        warn!("{}: all selectors and methods exhausted", label);
        artifacts.extend(
            self.diagnostics
                .capture(self.backend, &format!("failed {}", label))
                .await,
        );
        Ok(LocateOutcome::failed(artifacts))
    }

    async fn cascade(
        &mut self,
        target: &TargetSpec,
        action: &LocatorAction,
        marker: Option<&TargetSpec>,
        label: &str,
        artifacts: &mut Vec<PathBuf>,
    ) -> Result<Pass, BackendError> {
        let mut found_any = false;

        for selector in target.selectors() {
            let Some(element) = self.first_visible(&selector).await? else {
                continue;
            };
            found_any = true;
            debug!("{}: candidate from {} {}", label, selector.kind, selector.value);
            match self.act(&element, action, marker, label, artifacts).await? {
                ActResult::Failed => {
                    warn!("{}: candidate from {} failed, trying next selector", label, selector.value);
                }
                result => {
                    return Ok(Pass::Succeeded {
                        matched: format!("{}:{}", selector.kind, selector.value),
                        element,
                        method: clicked_with(result),
                    });
                }
            }
        }

        if let Some(text) = &target.text {
            for element in self.text_candidates(target).await? {
                found_any = true;
                debug!("{}: candidate by text {:?}", label, text);
                match self.act(&element, action, marker, label, artifacts).await? {
                    ActResult::Failed => continue,
                    result => {
                        return Ok(Pass::Succeeded {
                            matched: format!("text:{}", text),
                            element,
                            method: clicked_with(result),
                        });
                    }
                }
            }
        }

        Ok(if found_any {
            Pass::Exhausted
        } else {
            Pass::NoCandidate
        })
    }

    async fn act(
        &mut self,
        element: &ElementHandle,
        action: &LocatorAction,
        marker: Option<&TargetSpec>,
        label: &str,
        artifacts: &mut Vec<PathBuf>,
    ) -> Result<ActResult, BackendError> {
        match action {
            LocatorAction::Click => self.click_candidate(element, marker, label, artifacts).await,
            LocatorAction::Fill { text, submit } => {
                self.fill_candidate(element, text, *submit, label, artifacts)
                    .await
            }
        }
    }

    async fn click_candidate(
        &mut self,
        element: &ElementHandle,
        marker: Option<&TargetSpec>,
        label: &str,
        artifacts: &mut Vec<PathBuf>,
    ) -> Result<ActResult, BackendError> {
        self.scroll(element).await?;
        let max_attempts = self.timing.max_attempts.max(1);

        for method in ClickMethod::ALL {
            for attempt in 1..=max_attempts {
                match self.backend.click(element, method).await {
                    Ok(()) => {
                        if self.settle(marker).await? {
                            info!("{}: clicked via {}", label, method.name());
                            return Ok(ActResult::Clicked(method));
                        }
                        warn!(
                            "{}: click via {} went through but the page did not settle",
                            label,
                            method.name()
                        );
                        artifacts.extend(
                            self.diagnostics
                                .capture(self.backend, &format!("uncertain {} {}", method.name(), label))
                                .await,
                        );
                        break;
                    }
                    Err(e) if e.is_recoverable() => {
                        warn!(
                            "{}: {} click failed (attempt {}/{}): {}",
                            label,
                            method.name(),
                            attempt,
                            max_attempts,
                            e
                        );
                        if attempt < max_attempts {
                            self.pause().await;
                        }
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(ActResult::Failed)
    }

    async fn fill_candidate(
        &mut self,
        element: &ElementHandle,
        text: &str,
        submit: Option<SubmitKey>,
        label: &str,
        artifacts: &mut Vec<PathBuf>,
    ) -> Result<ActResult, BackendError> {
        let max_attempts = self.timing.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match self.fill_once(element, text, submit).await {
                Ok(()) => {
                    if submit.is_some() && !self.settle(None).await? {
                        warn!("{}: page did not settle after submit key", label);
                        artifacts.extend(
                            self.diagnostics
                                .capture(self.backend, &format!("uncertain {}", label))
                                .await,
                        );
                    }
                    return Ok(ActResult::Filled);
                }
                Err(e) if e.is_recoverable() => {
                    warn!("{}: fill failed (attempt {}/{}): {}", label, attempt, max_attempts, e);
                    if attempt < max_attempts {
                        self.pause().await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Ok(ActResult::Failed)
    }

    async fn fill_once(
        &mut self,
        element: &ElementHandle,
        text: &str,
        submit: Option<SubmitKey>,
    ) -> Result<(), BackendError> {
        self.scroll(element).await?;
        // Focus. Some masked inputs swallow the click; typing still works.
        if let Err(e) = self.backend.click(element, ClickMethod::Native).await {
            if !e.is_recoverable() {
                return Err(e);
            }
            debug!("Focus click ignored: {}", e);
        }
        self.backend.clear(element).await?;
        type_human(self.backend, element, text, submit, self.timing).await
    }

    async fn scroll(&mut self, element: &ElementHandle) -> Result<(), BackendError> {
        match self.backend.scroll_into_view(element).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_recoverable() || matches!(e, BackendError::NotSupported(_)) => {
                debug!("Scroll into view skipped: {}", e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn pause(&self) {
        let pause = self.timing.retry_pause();
        if pause > Duration::ZERO {
            tokio::time::sleep(pause).await;
        }
    }

    /// Wait for the page to settle: `document.readyState` reads `complete`
    /// on two consecutive polls, or `marker` becomes visible.
    pub async fn settle(&mut self, marker: Option<&TargetSpec>) -> Result<bool, BackendError> {
        let mut poller = Poller::new(self.timing.settle_timeout(), Backoff::from(self.timing));
        let mut previous_complete = false;

        loop {
            if let Some(marker) = marker
                && self.resolve_once(marker).await?.is_some()
            {
                return Ok(true);
            }

            let complete = match self.backend.ready_state().await {
                Ok(state) => is_complete(&state),
                Err(e) if e.is_recoverable() => false,
                Err(e) => return Err(e),
            };
            if complete && previous_complete {
                return Ok(true);
            }
            previous_complete = complete;

            if !poller.wait().await {
                return Ok(false);
            }
        }
    }

    /// Resolve without acting, polling up to the find timeout.
    pub async fn find_visible(
        &mut self,
        target: &TargetSpec,
    ) -> Result<Option<ElementHandle>, BackendError> {
        self.find_visible_within(target, self.timing.find_timeout())
            .await
    }

    pub async fn find_visible_within(
        &mut self,
        target: &TargetSpec,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>, BackendError> {
        let mut poller = Poller::new(timeout, Backoff::from(self.timing));
        loop {
            if let Some(element) = self.resolve_once(target).await? {
                return Ok(Some(element));
            }
            if !poller.wait().await {
                return Ok(None);
            }
        }
    }

    /// The element's `value` (property, then attribute) or, failing that,
    /// its visible text.
    pub async fn read_value(&mut self, target: &TargetSpec) -> Result<Option<String>, BackendError> {
        let Some(element) = self.find_visible(target).await? else {
            return Ok(None);
        };
        if let Some(value) = self.backend.property(&element, "value").await?
            && !value.trim().is_empty()
        {
            return Ok(Some(value));
        }
        if let Some(value) = self.backend.attribute(&element, "value").await?
            && !value.trim().is_empty()
        {
            return Ok(Some(value));
        }
        let text = self.backend.text(&element).await?;
        Ok(Some(text))
    }

    /// Combined checkbox state: selected, `checked` attribute, `checked`
    /// class or `aria-checked`. `None` when no element matches.
    ///
    /// Styled toggles often hide the real input, so hidden matches count.
    pub async fn is_checked(&mut self, target: &TargetSpec) -> Result<Option<bool>, BackendError> {
        let Some(element) = self.first_present(target).await? else {
            return Ok(None);
        };

        let selected = match self.backend.is_selected(&element).await {
            Ok(selected) => selected,
            Err(e) if e.is_recoverable() => false,
            Err(e) => return Err(e),
        };
        if selected {
            return Ok(Some(true));
        }
        if let Some(checked) = self.backend.attribute(&element, "checked").await?
            && !checked.eq_ignore_ascii_case("false")
        {
            return Ok(Some(true));
        }
        if let Some(class) = self.backend.attribute(&element, "class").await?
            && class.split_whitespace().any(|c| c == "checked")
        {
            return Ok(Some(true));
        }
        if let Some(aria) = self.backend.attribute(&element, "aria-checked").await?
            && aria.eq_ignore_ascii_case("true")
        {
            return Ok(Some(true));
        }
        Ok(Some(false))
    }

    /// Single pass of the cascade without acting.
    async fn resolve_once(
        &mut self,
        target: &TargetSpec,
    ) -> Result<Option<ElementHandle>, BackendError> {
        for selector in target.selectors() {
            if let Some(element) = self.first_visible(&selector).await? {
                return Ok(Some(element));
            }
        }
        Ok(self.text_candidates(target).await?.into_iter().next())
    }

    /// First visible match, else first match at all.
    async fn first_present(
        &mut self,
        target: &TargetSpec,
    ) -> Result<Option<ElementHandle>, BackendError> {
        let mut fallback = None;
        for selector in target.selectors() {
            let elements = self.query(&selector).await?;
            for element in elements {
                if self.displayed(&element).await? {
                    return Ok(Some(element));
                }
                if fallback.is_none() {
                    fallback = Some(element);
                }
            }
        }
        Ok(fallback)
    }

    async fn first_visible(
        &mut self,
        selector: &Selector,
    ) -> Result<Option<ElementHandle>, BackendError> {
        for element in self.query(selector).await? {
            if self.displayed(&element).await? {
                return Ok(Some(element));
            }
        }
        Ok(None)
    }

    async fn query(&mut self, selector: &Selector) -> Result<Vec<ElementHandle>, BackendError> {
        match self.backend.find_elements(selector.kind, &selector.value).await {
            Ok(elements) => Ok(elements),
            Err(e) if e.is_recoverable() => {
                debug!("Selector {} {} failed: {}", selector.kind, selector.value, e);
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn displayed(&mut self, element: &ElementHandle) -> Result<bool, BackendError> {
        match self.backend.is_displayed(element).await {
            Ok(shown) => Ok(shown),
            Err(e) if e.is_recoverable() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Visible elements in the target's text scope whose text contains the
    /// target text (case-insensitive). Exact matches on `exact_text` come
    /// first.
    async fn text_candidates(
        &mut self,
        target: &TargetSpec,
    ) -> Result<Vec<ElementHandle>, BackendError> {
        let Some(needle) = target.text.as_ref().map(|t| t.trim().to_lowercase()) else {
            return Ok(Vec::new());
        };
        let exact = target.exact_text.as_ref().map(|t| t.trim().to_lowercase());

        let scope = Selector {
            kind: LocatorKind::Css,
            value: target.scope().to_string(),
        };
        let mut exact_matches = Vec::new();
        let mut partial_matches = Vec::new();

        for element in self.query(&scope).await? {
            if !self.displayed(&element).await? {
                continue;
            }
            let text = match self.backend.text(&element).await {
                Ok(text) => text.trim().to_lowercase(),
                Err(e) if e.is_recoverable() => continue,
                Err(e) => return Err(e),
            };
            if exact.as_deref() == Some(text.as_str()) {
                exact_matches.push(element);
            } else if !needle.is_empty() && text.contains(&needle) {
                partial_matches.push(element);
            }
        }

        exact_matches.extend(partial_matches);
        Ok(exact_matches)
    }
}

fn clicked_with(result: ActResult) -> Option<ClickMethod> {
    match result {
        ActResult::Clicked(method) => Some(method),
        _ => None,
    }
}
