use crate::{
    entities::{
        ledger_entry,
        report_record::{self, Entity as ReportRecord},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{ledger::LedgerStore, settings::SettingsService},
    tracing::with_metrics,
};
use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

/// Longest custom reporting period, in days.
pub const MAX_CUSTOM_REPORTING_DAYS: u32 = 365;

/// Labels a report with the period it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportCadence {
    Daily,
    EveryThreeDays,
    Weekly,
    Monthly,
    Custom(u32),
    Manual,
    Test,
}

impl ReportCadence {
    pub fn label(&self) -> String {
        match self {
            ReportCadence::Daily => "daily".to_string(),
            ReportCadence::EveryThreeDays => "3days".to_string(),
            ReportCadence::Weekly => "weekly".to_string(),
            ReportCadence::Monthly => "monthly".to_string(),
            ReportCadence::Custom(days) => format!("custom_{}d", days),
            ReportCadence::Manual => "manual".to_string(),
            ReportCadence::Test => "test".to_string(),
        }
    }

    /// Length of the covered period. Manual and test reports are point-in-time.
    pub fn period_days(&self) -> Option<u32> {
        match self {
            ReportCadence::Daily => Some(1),
            ReportCadence::EveryThreeDays => Some(3),
            ReportCadence::Weekly => Some(7),
            ReportCadence::Monthly => Some(30),
            ReportCadence::Custom(days) => Some(*days),
            ReportCadence::Manual | ReportCadence::Test => None,
        }
    }

    /// `(period_start, period_end)` for a report generated at `at`.
    pub fn period(&self, at: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        match self.period_days() {
            Some(days) => (at - Duration::days(i64::from(days)), at),
            None => (at, at),
        }
    }

    /// Resolves a stored business frequency. `custom` takes its length from `custom_days`.
    pub fn from_frequency(frequency: &str, custom_days: i32) -> Result<Self, ServiceError> {
        if frequency.trim().eq_ignore_ascii_case("custom") {
            return custom(custom_days);
        }
        frequency.parse()
    }
}

fn custom(days: i32) -> Result<ReportCadence, ServiceError> {
    match u32::try_from(days) {
        Ok(days) if (1..=MAX_CUSTOM_REPORTING_DAYS).contains(&days) => {
            Ok(ReportCadence::Custom(days))
        }
        _ => Err(ServiceError::ValidationError(format!(
            "custom reporting period must be between 1 and {} days, got {}",
            MAX_CUSTOM_REPORTING_DAYS, days
        ))),
    }
}

impl FromStr for ReportCadence {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "daily" => Ok(ReportCadence::Daily),
            "3days" => Ok(ReportCadence::EveryThreeDays),
            "weekly" => Ok(ReportCadence::Weekly),
            "monthly" => Ok(ReportCadence::Monthly),
            "manual" => Ok(ReportCadence::Manual),
            "test" => Ok(ReportCadence::Test),
            other => {
                let days = other
                    .strip_prefix("custom_")
                    .and_then(|rest| rest.strip_suffix('d'))
                    .and_then(|n| n.parse::<i32>().ok());
                match days {
                    Some(days) => custom(days),
                    None => Err(ServiceError::ValidationError(format!(
                        "unknown report type '{}'",
                        s.trim()
                    ))),
                }
            }
        }
    }
}

impl fmt::Display for ReportCadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Report files on local disk, one directory per business.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `inventory_report_{cadence}_{YYYYMMDD_HHMMSS}.csv`
    pub fn artifact_name(cadence: ReportCadence, at: DateTime<Utc>) -> String {
        format!(
            "inventory_report_{}_{}.csv",
            cadence.label(),
            at.format("%Y%m%d_%H%M%S")
        )
    }

    /// Writes the artifact and returns its reference relative to the store root.
    /// The file appears under its final name only once fully written. Each write
    /// stages its own temp file, so concurrent writers of one name only race on
    /// the final rename and the last one wins.
    pub async fn write(
        &self,
        business_id: Uuid,
        artifact_name: &str,
        bytes: &[u8],
    ) -> Result<String, ServiceError> {
        let dir = self.root.join(business_id.to_string());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_error("create report directory", &dir, e))?;

        let path = dir.join(artifact_name);
        let tmp = dir.join(format!(".{}.{}.tmp", artifact_name, Uuid::new_v4()));
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| io_error("write report", &tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_error("publish report", &path, e))?;

        Ok(format!("{}/{}", business_id, artifact_name))
    }

    pub async fn read(&self, reference: &str) -> Result<Vec<u8>, ServiceError> {
        let path = self.root.join(reference);
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                ServiceError::NotFound(format!("report artifact {}", reference))
            }
            _ => io_error("read report", &path, e),
        })
    }
}

fn io_error(action: &str, path: &Path, err: std::io::Error) -> ServiceError {
    ServiceError::ArtifactError(format!("{} {}: {}", action, path.display(), err))
}

/// Renders ledger entries as CSV, one row per entry.
pub fn render_snapshot(entries: &[ledger_entry::Model]) -> Result<Vec<u8>, ServiceError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "name",
        "total_added",
        "total_sold",
        "current_quantity",
        "updated_at",
    ])?;
    for entry in entries {
        writer.write_record([
            entry.name.clone(),
            entry.total_added.to_string(),
            entry.total_sold.to_string(),
            entry.current_quantity.to_string(),
            entry.updated_at.to_rfc3339(),
        ])?;
    }
    writer
        .into_inner()
        .map_err(|e| ServiceError::ArtifactError(e.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GeneratedReport {
    pub report_id: Uuid,
    pub artifact_name: String,
}

/// Takes read-only snapshots of a business's ledger and records them.
#[derive(Clone)]
pub struct ReportService {
    db: Arc<DatabaseConnection>,
    ledger: LedgerStore,
    settings: SettingsService,
    store: ArtifactStore,
    event_sender: Option<EventSender>,
}

impl ReportService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        ledger: LedgerStore,
        settings: SettingsService,
        store: ArtifactStore,
        event_sender: Option<EventSender>,
    ) -> Self {
        Self {
            db,
            ledger,
            settings,
            store,
            event_sender,
        }
    }

    /// Generates a snapshot now. Without an explicit cadence the business's
    /// configured frequency is used.
    #[instrument(skip(self))]
    pub async fn generate(
        &self,
        business_id: Uuid,
        cadence: Option<ReportCadence>,
    ) -> Result<GeneratedReport, ServiceError> {
        let cadence = match cadence {
            Some(cadence) => cadence,
            None => self.settings.cadence(business_id).await?,
        };
        self.generate_at(business_id, cadence, Utc::now()).await
    }

    pub async fn generate_at(
        &self,
        business_id: Uuid,
        cadence: ReportCadence,
        at: DateTime<Utc>,
    ) -> Result<GeneratedReport, ServiceError> {
        with_metrics("larder.reports.generate", move || async move {
            let entries = self.ledger.list(business_id).await?;
            let bytes = render_snapshot(&entries)?;

            let artifact_name = ArtifactStore::artifact_name(cadence, at);
            let reference = self.store.write(business_id, &artifact_name, &bytes).await?;

            let (period_start, period_end) = cadence.period(at);
            let record = report_record::ActiveModel {
                business_id: Set(business_id),
                report_type: Set(cadence.label()),
                artifact_name: Set(artifact_name.clone()),
                artifact_reference: Set(reference),
                generated_at: Set(at),
                period_start: Set(period_start),
                period_end: Set(period_end),
                item_count: Set(i32::try_from(entries.len()).unwrap_or(i32::MAX)),
                ..Default::default()
            }
            .insert(&*self.db)
            .await?;

            counter!("larder.reports.generated", 1, "cadence" => cadence.label());
            info!(%business_id, report_id = %record.id, %artifact_name, items = entries.len(), "inventory snapshot written");

            if let Some(sender) = &self.event_sender {
                sender
                    .send_or_log(Event::ReportGenerated {
                        business_id,
                        report_id: record.id,
                        report_type: record.report_type.clone(),
                        artifact_name: artifact_name.clone(),
                    })
                    .await;
            }

            Ok::<_, ServiceError>(GeneratedReport {
                report_id: record.id,
                artifact_name,
            })
        })
        .await
    }

    /// Reports of a business, newest first.
    #[instrument(skip(self))]
    pub async fn list_reports(
        &self,
        business_id: Uuid,
    ) -> Result<Vec<report_record::Model>, ServiceError> {
        let reports = ReportRecord::find()
            .filter(report_record::Column::BusinessId.eq(business_id))
            .order_by_desc(report_record::Column::GeneratedAt)
            .all(&*self.db)
            .await?;
        Ok(reports)
    }

    /// Artifact name and bytes of a report owned by `business_id`.
    #[instrument(skip(self))]
    pub async fn download(
        &self,
        business_id: Uuid,
        report_id: Uuid,
    ) -> Result<(String, Vec<u8>), ServiceError> {
        let record = ReportRecord::find()
            .filter(report_record::Column::Id.eq(report_id))
            .filter(report_record::Column::BusinessId.eq(business_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("report {}", report_id)))?;

        let bytes = self.store.read(&record.artifact_reference).await?;
        Ok((record.artifact_name, bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use rstest::rstest;

    #[rstest]
    #[case("daily", ReportCadence::Daily)]
    #[case("3days", ReportCadence::EveryThreeDays)]
    #[case(" Weekly ", ReportCadence::Weekly)]
    #[case("monthly", ReportCadence::Monthly)]
    #[case("custom_14d", ReportCadence::Custom(14))]
    #[case("manual", ReportCadence::Manual)]
    #[case("test", ReportCadence::Test)]
    fn parses_cadence_labels(#[case] raw: &str, #[case] expected: ReportCadence) {
        let cadence: ReportCadence = raw.parse().unwrap();
        assert_eq!(cadence, expected);
        assert_eq!(cadence.label().parse::<ReportCadence>().unwrap(), expected);
    }

    #[rstest]
    #[case("hourly")]
    #[case("custom_0d")]
    #[case("custom_400d")]
    #[case("custom_xd")]
    #[case("")]
    fn rejects_unknown_cadences(#[case] raw: &str) {
        assert_matches!(raw.parse::<ReportCadence>(), Err(ServiceError::ValidationError(_)));
    }

    #[test]
    fn custom_frequency_uses_configured_days() {
        assert_eq!(
            ReportCadence::from_frequency("custom", 10).unwrap(),
            ReportCadence::Custom(10)
        );
        assert_matches!(
            ReportCadence::from_frequency("custom", 0),
            Err(ServiceError::ValidationError(_))
        );
        assert_eq!(
            ReportCadence::from_frequency("weekly", 0).unwrap(),
            ReportCadence::Weekly
        );
    }

    #[test]
    fn periods_end_at_generation_time() {
        let at = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();

        let (start, end) = ReportCadence::Weekly.period(at);
        assert_eq!(end, at);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 3, 12, 0, 0).unwrap());

        let (start, end) = ReportCadence::Monthly.period(at);
        assert_eq!((end - start).num_days(), 30);

        let (start, end) = ReportCadence::Test.period(at);
        assert_eq!(start, end);
    }

    #[test]
    fn artifact_name_is_deterministic() {
        let at = Utc.with_ymd_and_hms(2024, 3, 10, 8, 5, 9).unwrap();
        assert_eq!(
            ArtifactStore::artifact_name(ReportCadence::Custom(14), at),
            "inventory_report_custom_14d_20240310_080509.csv"
        );
        assert_eq!(
            ArtifactStore::artifact_name(ReportCadence::Weekly, at),
            ArtifactStore::artifact_name(ReportCadence::Weekly, at)
        );
    }

    #[test]
    fn snapshot_has_header_and_one_row_per_entry() {
        let now = Utc::now();
        let entry = ledger_entry::Model {
            id: Uuid::new_v4(),
            business_id: Uuid::new_v4(),
            name: "Cheddar, aged".to_string(),
            total_added: 10,
            total_sold: 4,
            current_quantity: 6,
            created_at: now,
            updated_at: now,
        };

        let csv = String::from_utf8(render_snapshot(&[entry]).unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "name,total_added,total_sold,current_quantity,updated_at");
        assert!(lines[1].starts_with("\"Cheddar, aged\",10,4,6,"));
        assert_eq!(lines.len(), 2);
    }

    #[tokio::test]
    async fn store_round_trips_and_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let business = Uuid::new_v4();

        let reference = store.write(business, "r.csv", b"a,b\n").await.unwrap();
        assert_eq!(reference, format!("{}/r.csv", business));
        assert_eq!(store.read(&reference).await.unwrap(), b"a,b\n");

        assert_matches!(
            store.read(&format!("{}/gone.csv", business)).await,
            Err(ServiceError::NotFound(_))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writes_of_one_name_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let business = Uuid::new_v4();

        let writes: Vec<_> = (0..16u8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.write(business, "same.csv", &[b'0' + i % 10]).await })
            })
            .collect();
        for write in writes {
            assert!(write.await.unwrap().is_ok());
        }

        let files: Vec<_> = std::fs::read_dir(dir.path().join(business.to_string()))
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(files, vec![std::ffi::OsString::from("same.csv")]);
    }
}
