pub mod backend;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod locator;
pub mod mail;
pub mod operator;
pub mod portal;
pub mod reconcile;
pub mod runner;
pub mod sequencer;
pub mod session;
pub mod spreadsheet;
pub mod stages;
pub mod typing;
pub mod wait;

pub use nfse_common::formatter;
pub use nfse_common::money;
pub use nfse_common::protocol;
pub use nfse_common::record;
