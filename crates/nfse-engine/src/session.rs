use crate::backend::{Backend, BackendError};
use crate::config::NfseConfig;
use crate::diagnostics::Diagnostics;
use crate::locator::Locator;
use crate::operator::Operator;
use std::sync::Arc;
use tracing::warn;

/// Everything a stage needs: the browser, settings, diagnostics sink and
/// the human at the console. Owned by the runner and lent to one stage at
/// a time.
pub struct Session {
    pub backend: Box<dyn Backend>,
    pub config: Arc<NfseConfig>,
    pub diagnostics: Diagnostics,
    pub operator: Box<dyn Operator>,
}

impl Session {
    pub fn new(
        backend: Box<dyn Backend>,
        config: Arc<NfseConfig>,
        operator: Box<dyn Operator>,
    ) -> Self {
        let diagnostics = Diagnostics::new(config.logging.log_dir.clone());
        Self {
            backend,
            config,
            diagnostics,
            operator,
        }
    }

    pub fn locator(&mut self) -> Locator<'_> {
        Locator::new(self.backend.as_mut(), &self.config.timing, &self.diagnostics)
    }

    /// Screenshot and markup of the current page.
    pub async fn capture(&mut self, label: &str) -> Vec<std::path::PathBuf> {
        self.diagnostics.capture(self.backend.as_mut(), label).await
    }

    /// Keep the browser open until the operator presses ENTER, then close
    /// it. Returns false when the console closed before that.
    pub async fn release_browser(&mut self, prompt: &str) -> Result<bool, BackendError> {
        if !self.backend.is_ready().await {
            return Ok(true);
        }
        let acknowledged = self.operator.wait_enter(prompt).await;
        if !acknowledged {
            warn!("Entrada encerrada; fechando o navegador");
        }
        self.backend.close().await?;
        Ok(acknowledged)
    }
}
