use crate::{
    entities::business_settings::{self, Entity as BusinessSettings},
    errors::ServiceError,
    events::{Event, EventSender},
    services::reports::ReportCadence,
};
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::OnConflict, ActiveValue::Set, DatabaseConnection, EntityTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Reads and writes per-business reporting preferences.
#[derive(Clone)]
pub struct SettingsService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
}

impl SettingsService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Stored settings, or the defaults when the business never saved any.
    #[instrument(skip(self))]
    pub async fn get(&self, business_id: Uuid) -> Result<business_settings::Model, ServiceError> {
        Ok(BusinessSettings::find_by_id(business_id)
            .one(&*self.db)
            .await?
            .unwrap_or_else(|| business_settings::Model::defaults_for(business_id)))
    }

    /// Cadence used when a report is requested without an explicit type.
    pub async fn cadence(&self, business_id: Uuid) -> Result<ReportCadence, ServiceError> {
        let settings = self.get(business_id).await?;
        ReportCadence::from_frequency(&settings.reporting_frequency, settings.custom_reporting_days)
    }

    /// All stored rows. Businesses on defaults are not included.
    pub async fn list_all(&self) -> Result<Vec<business_settings::Model>, ServiceError> {
        Ok(BusinessSettings::find().all(&*self.db).await?)
    }

    /// Validates and stores a new reporting frequency. `custom_days` is kept
    /// as is when omitted.
    #[instrument(skip(self))]
    pub async fn update(
        &self,
        business_id: Uuid,
        frequency: &str,
        custom_days: Option<i32>,
    ) -> Result<business_settings::Model, ServiceError> {
        let current = self.get(business_id).await?;
        let custom_days = custom_days.unwrap_or(current.custom_reporting_days);
        let frequency = frequency.trim().to_ascii_lowercase();

        let cadence = ReportCadence::from_frequency(&frequency, custom_days)?;
        if cadence.period_days().is_none() {
            return Err(ServiceError::ValidationError(format!(
                "'{}' is not a periodic reporting frequency",
                frequency
            )));
        }

        let now = Utc::now();
        let row = business_settings::ActiveModel {
            business_id: Set(business_id),
            reporting_frequency: Set(frequency.clone()),
            custom_reporting_days: Set(custom_days),
            last_report_at: Set(current.last_report_at),
            created_at: Set(now),
            updated_at: Set(now),
        };

        BusinessSettings::insert(row)
            .on_conflict(
                OnConflict::column(business_settings::Column::BusinessId)
                    .update_columns([
                        business_settings::Column::ReportingFrequency,
                        business_settings::Column::CustomReportingDays,
                        business_settings::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(&*self.db)
            .await?;

        info!(%business_id, %frequency, custom_days, "reporting settings updated");

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::ReportingSettingsUpdated {
                    business_id,
                    reporting_frequency: frequency,
                })
                .await;
        }

        self.get(business_id).await
    }

    /// Stamps the time of the latest scheduled report.
    #[instrument(skip(self))]
    pub async fn mark_reported(
        &self,
        business_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let defaults = business_settings::Model::defaults_for(business_id);
        let row = business_settings::ActiveModel {
            business_id: Set(business_id),
            reporting_frequency: Set(defaults.reporting_frequency),
            custom_reporting_days: Set(defaults.custom_reporting_days),
            last_report_at: Set(Some(at)),
            created_at: Set(at),
            updated_at: Set(at),
        };

        BusinessSettings::insert(row)
            .on_conflict(
                OnConflict::column(business_settings::Column::BusinessId)
                    .update_columns([
                        business_settings::Column::LastReportAt,
                        business_settings::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(&*self.db)
            .await?;
        Ok(())
    }
}
