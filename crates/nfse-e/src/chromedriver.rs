use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Port chromedriver listens on by default.
pub const DEFAULT_CHROMEDRIVER_PORT: u16 = 9515;

/// Readiness polls before giving up, `READY_POLL` apart.
const READY_ATTEMPTS: u32 = 50;
const READY_POLL: Duration = Duration::from_millis(200);

/// Common paths where chromedriver might be installed
const CHROMEDRIVER_PATHS: &[&str] = &[
    "/usr/bin/chromedriver",
    "/usr/local/bin/chromedriver",
    "/usr/lib/chromium/chromedriver",
    "/usr/lib/chromium-browser/chromedriver",
    "/snap/bin/chromium.chromedriver",
    "/opt/homebrew/bin/chromedriver",
];

pub fn default_chromedriver_url() -> String {
    format!("http://localhost:{}", DEFAULT_CHROMEDRIVER_PORT)
}

/// Detect if we're in a headless environment (no display server)
pub fn is_headless_environment() -> bool {
    if cfg!(target_os = "linux") {
        std::env::var("DISPLAY").is_err() && std::env::var("WAYLAND_DISPLAY").is_err()
    } else {
        false
    }
}

/// Find chromedriver on the system: `CHROMEDRIVER` env var, then PATH,
/// then common install locations.
pub fn find_chromedriver_binary() -> Option<String> {
    if let Ok(path) = std::env::var("CHROMEDRIVER")
        && std::path::Path::new(&path).exists()
    {
        return Some(path);
    }

    if let Ok(output) = Command::new("which").arg("chromedriver").output()
        && output.status.success()
        && let Ok(path) = String::from_utf8(output.stdout)
    {
        let path = path.trim();
        if !path.is_empty() {
            return Some(path.to_string());
        }
    }

    CHROMEDRIVER_PATHS
        .iter()
        .find(|path| std::path::Path::new(path).exists())
        .map(|path| path.to_string())
}

/// Handle to a running chromedriver process. The process is killed when
/// the handle is dropped.
pub struct ChromeDriverProcess {
    child: Child,
    port: u16,
}

impl ChromeDriverProcess {
    pub fn webdriver_url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for ChromeDriverProcess {
    fn drop(&mut self) {
        info!("Shutting down chromedriver (PID {})...", self.child.id());
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Launch chromedriver on `port` and wait until `/status` reports ready.
pub async fn launch_chromedriver(port: u16) -> Result<ChromeDriverProcess, String> {
    let path = find_chromedriver_binary().ok_or_else(|| {
        "chromedriver not found. Install it (e.g. apt install chromium-driver) or set CHROMEDRIVER"
            .to_string()
    })?;

    info!("Launching chromedriver from: {}", path);
    let child = Command::new(&path)
        .arg(format!("--port={}", port))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| format!("Failed to launch chromedriver: {}", e))?;
    info!("chromedriver launched with PID: {}", child.id());

    // Dropping the handle on any early return kills the process.
    let process = ChromeDriverProcess { child, port };
    let url = format!("{}/status", process.webdriver_url());
    let client = reqwest::Client::new();

    for attempt in 1..=READY_ATTEMPTS {
        sleep(READY_POLL).await;

        match client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                let ready = resp
                    .text()
                    .await
                    .map(|body| status_body_ready(&body))
                    .unwrap_or(false);
                if ready {
                    info!("chromedriver ready after {} attempts", attempt);
                    return Ok(process);
                }
                warn!("chromedriver responded but not ready yet (attempt {})", attempt);
            }
            Ok(resp) => {
                warn!(
                    "chromedriver status returned {} (attempt {})",
                    resp.status(),
                    attempt
                );
            }
            Err(_) => {
                if attempt % 5 == 0 {
                    info!("Waiting for chromedriver... (attempt {})", attempt);
                }
            }
        }
    }

    Err("chromedriver did not become ready within timeout".to_string())
}

/// Parse a `/status` body; anything that is not JSON means not ready.
pub fn status_body_ready(body: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(body)
        .map(|v| status_ready(&v))
        .unwrap_or(false)
}

/// `value.ready` of a W3C `/status` response. Older drivers omit it, in
/// which case a successful response counts as ready.
pub fn status_ready(body: &serde_json::Value) -> bool {
    body.get("value")
        .and_then(|v| v.get("ready"))
        .and_then(|r| r.as_bool())
        .unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_url() {
        assert_eq!(default_chromedriver_url(), "http://localhost:9515");
    }

    #[test]
    fn test_status_ready() {
        assert!(status_ready(&json!({"value": {"ready": true, "message": "ok"}})));
        assert!(!status_ready(&json!({"value": {"ready": false}})));
        assert!(status_ready(&json!({"value": {}})));
    }

    #[test]
    fn test_status_body_ready() {
        assert!(status_body_ready(r#"{"value":{"ready":true,"message":"ok"}}"#));
        assert!(!status_body_ready(r#"{"value":{"ready":false}}"#));
        assert!(!status_body_ready("<html>starting</html>"));
    }

    #[test]
    fn test_find_binary() {
        // Availability depends on the system; this only checks it doesn't panic.
        let _ = find_chromedriver_binary();
    }
}
