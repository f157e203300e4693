pub mod models;
pub mod repository;

pub use repository::{LedgerConfig, SubscriberLedger};
