use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_REPORTING_FREQUENCY: &str = "weekly";
pub const DEFAULT_CUSTOM_REPORTING_DAYS: i32 = 7;

/// Per-business reporting preferences. Rows are created lazily; a business
/// without a row uses the defaults above.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "business_settings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub business_id: Uuid,
    pub reporting_frequency: String,
    pub custom_reporting_days: i32,
    pub last_report_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();
        if insert {
            active_model.created_at = Set(now);
        }
        active_model.updated_at = Set(now);
        Ok(active_model)
    }
}

impl Model {
    /// Unsaved defaults for a business that never changed its settings.
    pub fn defaults_for(business_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            business_id,
            reporting_frequency: DEFAULT_REPORTING_FREQUENCY.to_string(),
            custom_reporting_days: DEFAULT_CUSTOM_REPORTING_DAYS,
            last_report_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
