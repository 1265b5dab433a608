use crate::{
    entities::{
        business_settings,
        ledger_entry::{self, Entity as LedgerEntry},
    },
    errors::ServiceError,
    services::{
        reports::{ReportCadence, ReportService},
        settings::SettingsService,
    },
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sea_orm::{DatabaseConnection, EntityTrait, QuerySelect};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Generates periodic snapshots for every business whose cadence has elapsed.
#[derive(Clone)]
pub struct ReportScheduler {
    db: Arc<DatabaseConnection>,
    reports: ReportService,
    settings: SettingsService,
    interval: Duration,
}

impl ReportScheduler {
    pub fn new(
        db: Arc<DatabaseConnection>,
        reports: ReportService,
        settings: SettingsService,
        interval: Duration,
    ) -> Self {
        Self {
            db,
            reports,
            settings,
            interval,
        }
    }

    /// Spawns the sweep loop. The first sweep runs immediately.
    pub fn start(self) -> JoinHandle<()> {
        info!(interval_secs = self.interval.as_secs(), "starting report scheduler");
        tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match self.run_due_reports(Utc::now()).await {
                    Ok(0) => debug!("no reports due"),
                    Ok(generated) => info!(generated, "scheduled reports generated"),
                    Err(e) => error!(error = %e, "report scheduler sweep failed"),
                }
            }
        })
    }

    /// One sweep at `now`. Returns how many reports were generated. A failure
    /// for one business is logged and does not stop the others.
    pub async fn run_due_reports(&self, now: DateTime<Utc>) -> Result<usize, ServiceError> {
        let mut generated = 0;
        for settings in self.businesses().await?.into_values() {
            let business_id = settings.business_id;
            let cadence = match ReportCadence::from_frequency(
                &settings.reporting_frequency,
                settings.custom_reporting_days,
            ) {
                Ok(cadence) => cadence,
                Err(e) => {
                    warn!(%business_id, error = %e, "skipping business with invalid reporting settings");
                    continue;
                }
            };

            if !is_due(cadence, settings.last_report_at, now) {
                continue;
            }

            match self.reports.generate_at(business_id, cadence, now).await {
                Ok(report) => {
                    if let Err(e) = self.settings.mark_reported(business_id, now).await {
                        error!(%business_id, error = %e, "failed to stamp last report time");
                    }
                    info!(%business_id, report_id = %report.report_id, cadence = %cadence, "scheduled report generated");
                    generated += 1;
                }
                Err(e) => error!(%business_id, error = %e, "scheduled report failed"),
            }
        }
        Ok(generated)
    }

    /// Every business with stored settings or at least one ledger entry.
    async fn businesses(&self) -> Result<BTreeMap<Uuid, business_settings::Model>, ServiceError> {
        let mut businesses: BTreeMap<Uuid, business_settings::Model> = self
            .settings
            .list_all()
            .await?
            .into_iter()
            .map(|settings| (settings.business_id, settings))
            .collect();

        let with_entries: Vec<Uuid> = LedgerEntry::find()
            .select_only()
            .column(ledger_entry::Column::BusinessId)
            .distinct()
            .into_tuple()
            .all(&*self.db)
            .await?;

        for business_id in with_entries {
            businesses
                .entry(business_id)
                .or_insert_with(|| business_settings::Model::defaults_for(business_id));
        }
        Ok(businesses)
    }
}

/// Manual and test cadences are never scheduled.
fn is_due(cadence: ReportCadence, last_report_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    let Some(days) = cadence.period_days() else {
        return false;
    };
    match last_report_at {
        None => true,
        Some(last) => now - last >= ChronoDuration::days(i64::from(days)),
    }
}
