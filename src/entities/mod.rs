pub mod business_settings;
pub mod ledger_entry;
pub mod report_record;
pub mod sale_record;
