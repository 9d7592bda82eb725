#![allow(dead_code)]

use async_trait::async_trait;
use nfse_common::protocol::{ClickMethod, ElementHandle, LocatorKind, SubmitKey};
use nfse_engine::backend::{Backend, BackendError, NavigationResult};
use nfse_engine::config::{NfseConfig, TimingConfig};
use nfse_engine::operator::ScriptedOperator;
use nfse_engine::session::Session;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Scripted page: selectors map to element ids, everything else is keyed
/// by element id.
#[derive(Debug)]
pub struct FakeDom {
    pub url: String,
    pub ready_state: String,
    pub elements: HashMap<String, Vec<String>>,
    pub hidden: HashSet<String>,
    pub texts: HashMap<String, String>,
    pub attributes: HashMap<(String, String), String>,
    pub properties: HashMap<(String, String), String>,
    pub selected: HashSet<String>,
    /// Elements whose selection state cannot be read (reported stale).
    pub unreadable_selection: HashSet<String>,
    /// Every selection read fails with a lost connection.
    pub disconnected: bool,
    /// Remaining rejections per element and click method.
    pub rejections: HashMap<(String, ClickMethod), usize>,
    pub queries: Vec<String>,
    pub clicks: Vec<(String, ClickMethod)>,
    pub typed: HashMap<String, String>,
    pub keys: Vec<(String, SubmitKey)>,
    pub navigations: Vec<String>,
    pub launched: bool,
    pub closed: bool,
}

impl Default for FakeDom {
    fn default() -> Self {
        Self {
            url: "about:blank".to_string(),
            ready_state: "complete".to_string(),
            elements: HashMap::new(),
            hidden: HashSet::new(),
            texts: HashMap::new(),
            attributes: HashMap::new(),
            properties: HashMap::new(),
            selected: HashSet::new(),
            unreadable_selection: HashSet::new(),
            disconnected: false,
            rejections: HashMap::new(),
            queries: Vec::new(),
            clicks: Vec::new(),
            typed: HashMap::new(),
            keys: Vec::new(),
            navigations: Vec::new(),
            launched: false,
            closed: false,
        }
    }
}

impl FakeDom {
    /// Register a visible element under `selector`.
    pub fn add(&mut self, selector: &str, id: &str) -> &mut Self {
        self.elements
            .entry(selector.to_string())
            .or_default()
            .push(id.to_string());
        self
    }

    pub fn add_hidden(&mut self, selector: &str, id: &str) -> &mut Self {
        self.add(selector, id);
        self.hidden.insert(id.to_string());
        self
    }

    pub fn set_text(&mut self, id: &str, text: &str) -> &mut Self {
        self.texts.insert(id.to_string(), text.to_string());
        self
    }

    pub fn set_property(&mut self, id: &str, name: &str, value: &str) -> &mut Self {
        self.properties
            .insert((id.to_string(), name.to_string()), value.to_string());
        self
    }

    pub fn reject(&mut self, id: &str, method: ClickMethod, times: usize) -> &mut Self {
        self.rejections.insert((id.to_string(), method), times);
        self
    }

    pub fn typed(&self, id: &str) -> Option<&str> {
        self.typed.get(id).map(String::as_str)
    }

    pub fn was_queried(&self, selector: &str) -> bool {
        self.queries.iter().any(|q| q == selector)
    }

    pub fn clicks_on(&self, id: &str) -> Vec<ClickMethod> {
        self.clicks
            .iter()
            .filter(|(el, _)| el == id)
            .map(|(_, m)| *m)
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    pub dom: Arc<Mutex<FakeDom>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<F: FnOnce(&mut FakeDom)>(self, setup: F) -> Self {
        setup(&mut self.dom.lock().unwrap());
        self
    }

    fn known(dom: &FakeDom, element: &ElementHandle) -> Result<(), BackendError> {
        if dom.elements.values().any(|ids| ids.iter().any(|id| id == element.id())) {
            Ok(())
        } else {
            Err(BackendError::ElementStale(element.id().to_string()))
        }
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn launch(&mut self) -> Result<(), BackendError> {
        self.dom.lock().unwrap().launched = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        self.dom.lock().unwrap().closed = true;
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        true
    }

    async fn navigate(&mut self, url: &str) -> Result<NavigationResult, BackendError> {
        let mut dom = self.dom.lock().unwrap();
        dom.navigations.push(url.to_string());
        dom.url = url.to_string();
        Ok(NavigationResult {
            url: url.to_string(),
            title: "NFS-e".to_string(),
        })
    }

    async fn current_url(&mut self) -> Result<String, BackendError> {
        Ok(self.dom.lock().unwrap().url.clone())
    }

    async fn find_elements(
        &mut self,
        _kind: LocatorKind,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, BackendError> {
        let mut dom = self.dom.lock().unwrap();
        dom.queries.push(selector.to_string());
        Ok(dom
            .elements
            .get(selector)
            .map(|ids| ids.iter().map(|id| ElementHandle::new(id.clone())).collect())
            .unwrap_or_default())
    }

    async fn is_displayed(&mut self, element: &ElementHandle) -> Result<bool, BackendError> {
        let dom = self.dom.lock().unwrap();
        Self::known(&dom, element)?;
        Ok(!dom.hidden.contains(element.id()))
    }

    async fn text(&mut self, element: &ElementHandle) -> Result<String, BackendError> {
        let dom = self.dom.lock().unwrap();
        Ok(dom.texts.get(element.id()).cloned().unwrap_or_default())
    }

    async fn attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, BackendError> {
        let dom = self.dom.lock().unwrap();
        Ok(dom
            .attributes
            .get(&(element.id().to_string(), name.to_string()))
            .cloned())
    }

    async fn property(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, BackendError> {
        let dom = self.dom.lock().unwrap();
        Ok(dom
            .properties
            .get(&(element.id().to_string(), name.to_string()))
            .cloned())
    }

    async fn is_selected(&mut self, element: &ElementHandle) -> Result<bool, BackendError> {
        let dom = self.dom.lock().unwrap();
        if dom.disconnected {
            return Err(BackendError::ConnectionLost);
        }
        if dom.unreadable_selection.contains(element.id()) {
            return Err(BackendError::ElementStale(element.id().to_string()));
        }
        Ok(dom.selected.contains(element.id()))
    }

    async fn scroll_into_view(&mut self, _element: &ElementHandle) -> Result<(), BackendError> {
        Ok(())
    }

    async fn click(
        &mut self,
        element: &ElementHandle,
        method: ClickMethod,
    ) -> Result<(), BackendError> {
        let mut dom = self.dom.lock().unwrap();
        Self::known(&dom, element)?;
        dom.clicks.push((element.id().to_string(), method));
        let key = (element.id().to_string(), method);
        if let Some(left) = dom.rejections.get_mut(&key)
            && *left > 0
        {
            *left -= 1;
            return Err(BackendError::ClickRejected(format!(
                "{} intercepted",
                element.id()
            )));
        }
        Ok(())
    }

    async fn clear(&mut self, element: &ElementHandle) -> Result<(), BackendError> {
        let mut dom = self.dom.lock().unwrap();
        dom.typed.insert(element.id().to_string(), String::new());
        Ok(())
    }

    async fn send_keys(&mut self, element: &ElementHandle, text: &str) -> Result<(), BackendError> {
        let mut dom = self.dom.lock().unwrap();
        dom.typed
            .entry(element.id().to_string())
            .or_default()
            .push_str(text);
        Ok(())
    }

    async fn press_key(
        &mut self,
        element: &ElementHandle,
        key: SubmitKey,
    ) -> Result<(), BackendError> {
        self.dom
            .lock()
            .unwrap()
            .keys
            .push((element.id().to_string(), key));
        Ok(())
    }

    async fn ready_state(&mut self) -> Result<String, BackendError> {
        Ok(self.dom.lock().unwrap().ready_state.clone())
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, BackendError> {
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn page_source(&mut self) -> Result<String, BackendError> {
        Ok("<html><body></body></html>".to_string())
    }
}

/// Config with near-zero pauses and diagnostics under `log_dir`.
pub fn test_config(log_dir: &Path) -> NfseConfig {
    let mut config = NfseConfig::default();
    config.timing = TimingConfig::fast();
    config.logging.log_dir = log_dir.to_path_buf();
    config
}

pub fn session_with(
    backend: MockBackend,
    config: NfseConfig,
    answers: &[&str],
) -> Session {
    Session::new(
        Box::new(backend),
        Arc::new(config),
        Box::new(ScriptedOperator::new(answers.iter().copied())),
    )
}

pub fn count_files(dir: &Path, ext: &str) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|e| e.path().extension().is_some_and(|x| x == ext))
                .count()
        })
        .unwrap_or(0)
}

/// Control sheet with the default column captions on row 3. Each row is
/// `(invoice number, company, tax id, gross value)`, written from row 4.
pub fn write_control_sheet(path: &Path, rows: &[(Option<f64>, &str, &str, f64)]) {
    let columns = nfse_engine::config::ColumnNames::default();
    let mut book = umya_spreadsheet::new_file();
    let sheet = book.get_sheet_mut(&0).unwrap();
    let headers = [
        "Nº NF",
        columns.company_name.as_str(),
        columns.tax_id.as_str(),
        columns.gross_value.as_str(),
    ];
    for (i, header) in headers.iter().enumerate() {
        sheet.get_cell_mut((i as u32 + 1, 3)).set_value(*header);
    }
    for (i, (number, company, tax_id, gross)) in rows.iter().enumerate() {
        let row = i as u32 + 4;
        if let Some(number) = number {
            sheet.get_cell_mut((1, row)).set_value_number(*number);
        }
        sheet.get_cell_mut((2, row)).set_value(*company);
        sheet.get_cell_mut((3, row)).set_value(*tax_id);
        sheet.get_cell_mut((4, row)).set_value_number(*gross);
    }
    umya_spreadsheet::writer::xlsx::write(&book, path).unwrap();
}
