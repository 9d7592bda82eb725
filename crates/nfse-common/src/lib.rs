pub mod error;
pub mod formatter;
pub mod money;
pub mod protocol;
pub mod record;
