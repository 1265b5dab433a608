use crate::{
    db::retry_transient,
    entities::{
        ledger_entry,
        sale_record::{self, Entity as SaleRecord},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::ledger::{EntryKey, LedgerStore},
};
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Validates a raw sale quantity: a strictly positive integer, nothing else.
pub fn parse_quantity(value: &Value) -> Result<i64, ServiceError> {
    let quantity = match value {
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
    .ok_or_else(|| {
        ServiceError::InvalidQuantity(format!("quantity must be a positive integer, got {}", value))
    })?;

    if quantity <= 0 {
        return Err(ServiceError::InvalidQuantity(format!(
            "quantity must be a positive integer, got {}",
            quantity
        )));
    }
    Ok(quantity)
}

/// Ledger state after the debit together with the sale it produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleOutcome {
    pub entry: ledger_entry::Model,
    pub sale: sale_record::Model,
}

#[derive(Clone)]
pub struct SalesService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
}

impl SalesService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Debits `quantity` from the referenced entry and records the sale. A
    /// UUID-shaped reference selects by id; see `record_sale_by_key` to sell
    /// by an explicit id or name.
    pub async fn record_sale(
        &self,
        business_id: Uuid,
        item_reference: &str,
        quantity: i64,
    ) -> Result<SaleOutcome, ServiceError> {
        let key = EntryKey::parse(item_reference)?;
        self.record_sale_by_key(business_id, key, quantity).await
    }

    /// Debits `quantity` from the entry selected by `key` and records the sale.
    /// Either both happen or neither does.
    #[instrument(skip(self))]
    pub async fn record_sale_by_key(
        &self,
        business_id: Uuid,
        key: EntryKey,
        quantity: i64,
    ) -> Result<SaleOutcome, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::InvalidQuantity(format!(
                "quantity must be a positive integer, got {}",
                quantity
            )));
        }
        let key = &key;

        let result = retry_transient("sales.record_sale", move || {
            self.record_sale_once(business_id, key, quantity)
        })
        .await;

        match &result {
            Ok(outcome) => {
                counter!("larder.sales.completed", 1);
                info!(
                    %business_id,
                    item = %outcome.entry.name,
                    quantity,
                    remaining = outcome.entry.current_quantity,
                    "sale recorded"
                );
                if let Some(sender) = &self.event_sender {
                    sender
                        .send_or_log(Event::SaleRecorded {
                            business_id,
                            entry_id: outcome.entry.id,
                            item_name: outcome.entry.name.clone(),
                            quantity,
                            remaining: outcome.entry.current_quantity,
                        })
                        .await;
                }
            }
            Err(ServiceError::InsufficientInventory {
                available,
                requested,
            }) => {
                counter!("larder.sales.insufficient", 1);
                info!(%business_id, item = %key, available, requested, "sale rejected for insufficient stock");
            }
            Err(_) => {}
        }

        result
    }

    async fn record_sale_once(
        &self,
        business_id: Uuid,
        key: &EntryKey,
        quantity: i64,
    ) -> Result<SaleOutcome, ServiceError> {
        let txn = self.db.begin().await?;

        let entry = match LedgerStore::debit_in(&txn, business_id, key, quantity).await {
            Ok(entry) => entry,
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    warn!(error = %rollback_err, "rollback after rejected sale failed");
                }
                return Err(err);
            }
        };

        let sale = sale_record::ActiveModel {
            business_id: Set(business_id),
            entry_id: Set(entry.id),
            item_name: Set(entry.name.clone()),
            quantity: Set(quantity),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        Ok(SaleOutcome { entry, sale })
    }

    /// Sales of a business, newest first, optionally narrowed to one entry.
    #[instrument(skip(self))]
    pub async fn list_sales(
        &self,
        business_id: Uuid,
        entry_id: Option<Uuid>,
    ) -> Result<Vec<sale_record::Model>, ServiceError> {
        let mut query = SaleRecord::find().filter(sale_record::Column::BusinessId.eq(business_id));
        if let Some(entry_id) = entry_id {
            query = query.filter(sale_record::Column::EntryId.eq(entry_id));
        }
        let sales = query
            .order_by_desc(sale_record::Column::SoldAt)
            .all(&*self.db)
            .await?;
        Ok(sales)
    }
}
