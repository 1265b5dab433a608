pub mod common;
pub mod inventory;
pub mod reports;
pub mod sales;
pub mod settings;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{
    ingestion::{AcceptAll, DedupPolicy, InMemoryDedup, IngestionService},
    ledger::LedgerStore,
    report_scheduler::ReportScheduler,
    reports::{ArtifactStore, ReportService},
    sales::SalesService,
    settings::SettingsService,
};
use std::sync::Arc;
use tracing::info;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub ledger: LedgerStore,
    pub ingestion: IngestionService,
    pub sales: SalesService,
    pub reports: ReportService,
    pub settings: SettingsService,
}

impl AppServices {
    /// Wires every service over one connection pool and event channel.
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender, config: &AppConfig) -> Self {
        let event_sender = Some(event_sender);

        let dedup: Arc<dyn DedupPolicy> = if config.ingestion_dedup_enabled {
            info!(
                ttl_secs = config.ingestion_dedup_ttl_secs,
                "ingestion duplicate detection enabled"
            );
            Arc::new(InMemoryDedup::new(config.ingestion_dedup_ttl()))
        } else {
            Arc::new(AcceptAll)
        };

        let ledger = LedgerStore::new(db_pool.clone());
        let settings = SettingsService::new(db_pool.clone(), event_sender.clone());
        let reports = ReportService::new(
            db_pool.clone(),
            ledger.clone(),
            settings.clone(),
            ArtifactStore::new(&config.report_dir),
            event_sender.clone(),
        );

        Self {
            ingestion: IngestionService::new(ledger.clone(), dedup, event_sender.clone()),
            sales: SalesService::new(db_pool, event_sender),
            ledger,
            reports,
            settings,
        }
    }

    /// Scheduler sharing this container's report and settings services.
    pub fn report_scheduler(&self, db_pool: Arc<DbPool>, config: &AppConfig) -> ReportScheduler {
        ReportScheduler::new(
            db_pool,
            self.reports.clone(),
            self.settings.clone(),
            config.report_scheduler_interval(),
        )
    }
}
