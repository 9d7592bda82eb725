use super::schema::NfseConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration, then apply environment overrides.
    ///
    /// Search order:
    /// 1. `explicit` path (error if missing)
    /// 2. ./nfse.yaml
    /// 3. ~/.nfse/config.yaml
    /// 4. Default configuration
    pub async fn load(explicit: Option<&Path>) -> Result<NfseConfig, ConfigError> {
        let mut config = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path.to_path_buf()));
                }
                Self::load_from(path).await?
            }
            None => Self::load_default().await?,
        };
        Self::apply_env(&mut config, |key| std::env::var(key).ok());
        Ok(config)
    }

    pub async fn load_default() -> Result<NfseConfig, ConfigError> {
        let local_config = PathBuf::from("./nfse.yaml");
        if local_config.exists() {
            return Self::load_from(&local_config).await;
        }

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".nfse").join("config.yaml");
            if home_config.exists() {
                return Self::load_from(&home_config).await;
            }
        }

        debug!("No config file found, using defaults");
        Ok(NfseConfig::default())
    }

    pub async fn load_from(path: &Path) -> Result<NfseConfig, ConfigError> {
        info!("Loading config from {}", path.display());
        let content = tokio::fs::read_to_string(path).await?;
        let config: NfseConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load a `.env` file from the working directory into the process
    /// environment, if there is one.
    pub fn load_dotenv() {
        match dotenvy::dotenv() {
            Ok(path) => debug!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => debug!("Ignoring .env: {}", e),
        }
    }

    /// Override URL, credentials, spreadsheet path and WebDriver URL from
    /// the environment. Empty values are ignored.
    pub fn apply_env<F>(config: &mut NfseConfig, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("NFS_URL") {
            config.portal.url = url;
        }
        if let Some(tax_id) = get("CPF_CNPJ") {
            config.portal.tax_id = tax_id;
        }
        if let Some(password) = get("SENHA") {
            config.portal.password = password;
        }
        if let Some(path) = get("NFSE_EXCEL_PATH") {
            config.spreadsheet.path = PathBuf::from(path);
        }
        if let Some(url) = get("NFSE_WEBDRIVER_URL") {
            config.portal.webdriver_url = url;
        }
    }
}
