//! Domain services behind the HTTP handlers.

pub mod ingestion;
pub mod ledger;
pub mod report_scheduler;
pub mod reports;
pub mod sales;
pub mod settings;
