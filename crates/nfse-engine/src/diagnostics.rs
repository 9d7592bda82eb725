use crate::backend::Backend;
use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, warn};

/// Writes screenshots to `<log_dir>/images` and page markup to
/// `<log_dir>/html`. All saves are best effort: failures are logged and
/// never propagate.
#[derive(Debug)]
pub struct Diagnostics {
    log_dir: PathBuf,
    sequence: AtomicUsize,
}

impl Diagnostics {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            sequence: AtomicUsize::new(0),
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn images_dir(&self) -> PathBuf {
        self.log_dir.join("images")
    }

    pub fn html_dir(&self) -> PathBuf {
        self.log_dir.join("html")
    }

    /// Screenshot plus markup. Returns the paths actually written.
    pub async fn capture(&self, backend: &mut dyn Backend, label: &str) -> Vec<PathBuf> {
        let mut saved = Vec::new();
        if let Some(path) = self.save_screenshot(backend, label).await {
            saved.push(path);
        }
        if let Some(path) = self.save_html(backend, label).await {
            saved.push(path);
        }
        saved
    }

    pub async fn save_screenshot(&self, backend: &mut dyn Backend, label: &str) -> Option<PathBuf> {
        let png = match backend.screenshot().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Screenshot '{}' failed: {}", label, e);
                return None;
            }
        };
        let path = self.images_dir().join(self.file_name(label, "png"));
        self.write(&path, &png).await
    }

    pub async fn save_html(&self, backend: &mut dyn Backend, label: &str) -> Option<PathBuf> {
        let html = match backend.page_source().await {
            Ok(html) => html,
            Err(e) => {
                warn!("Page source '{}' failed: {}", label, e);
                return None;
            }
        };
        let path = self.html_dir().join(self.file_name(label, "html"));
        self.write(&path, html.as_bytes()).await
    }

    async fn write(&self, path: &Path, bytes: &[u8]) -> Option<PathBuf> {
        if let Some(parent) = path.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            warn!("Cannot create {}: {}", parent.display(), e);
            return None;
        }
        match tokio::fs::write(path, bytes).await {
            Ok(()) => {
                info!("Saved {}", path.display());
                Some(path.to_path_buf())
            }
            Err(e) => {
                warn!("Cannot write {}: {}", path.display(), e);
                None
            }
        }
    }

    /// `<label>_<timestamp>_<seq>.<ext>` with the label reduced to a safe
    /// file-name stem.
    fn file_name(&self, label: &str, ext: &str) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!(
            "{}_{}_{:03}.{}",
            sanitize(label),
            Local::now().format("%Y%m%d_%H%M%S"),
            seq,
            ext
        )
    }
}

fn sanitize(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.chars() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "capture".to_string()
    } else {
        trimmed.chars().take(60).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_label() {
        assert_eq!(sanitize("click css:#btn > a"), "click_css_btn_a");
        assert_eq!(sanitize("***"), "capture");
    }

    #[test]
    fn test_file_names_are_unique() {
        let diagnostics = Diagnostics::new("logs");
        let a = diagnostics.file_name("x", "png");
        let b = diagnostics.file_name("x", "png");
        assert_ne!(a, b);
        assert!(a.starts_with("x_") && a.ends_with(".png"));
    }
}
