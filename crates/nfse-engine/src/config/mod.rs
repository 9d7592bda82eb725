pub mod loader;
pub mod schema;

pub use loader::{ConfigError, ConfigLoader};
pub use schema::{
    ColumnNames, LoggingConfig, MailConfig, NfseConfig, PortalConfig, PortalTargets,
    ServiceConfig, SpreadsheetConfig, TimingConfig,
};
