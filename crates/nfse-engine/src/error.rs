use crate::backend::BackendError;
use crate::config::ConfigError;
use crate::mail::MailError;
use crate::spreadsheet::SheetError;
use thiserror::Error;

/// Errors surfaced by the emission flow.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Spreadsheet error: {0}")]
    Sheet(#[from] SheetError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Login failed: {0}")]
    Login(String),

    #[error("Operator input closed")]
    InputClosed,

    #[error("Run aborted by operator")]
    Aborted,
}
