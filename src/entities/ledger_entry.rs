use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row per (business, item name). Counters are only ever changed through
/// the ledger store's conditional column updates.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ledger_entries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub business_id: Uuid,
    pub name: String,
    pub total_added: i64,
    pub total_sold: i64,
    pub current_quantity: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::sale_record::Entity")]
    SaleRecords,
}

impl Related<super::sale_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SaleRecords.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// `current_quantity == total_added - total_sold` with every counter non-negative.
    pub fn is_balanced(&self) -> bool {
        self.total_added >= 0
            && self.total_sold >= 0
            && self.current_quantity >= 0
            && self.total_added.checked_sub(self.total_sold) == Some(self.current_quantity)
    }
}
