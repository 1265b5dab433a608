use crate::{
    db::retry_transient,
    entities::ledger_entry::{self, Entity as LedgerEntry},
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveValue::Set,
    ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, TransactionTrait,
};
use std::sync::Arc;
use tracing::{error, instrument};
use uuid::Uuid;

/// Longest item name the ledger accepts.
pub const MAX_ITEM_NAME_LEN: usize = 255;

/// Identifies a ledger entry within one business, either by id or by exact name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKey {
    Id(Uuid),
    Name(String),
}

impl EntryKey {
    /// A UUID-shaped reference selects by id, anything else by exact name.
    pub fn parse(reference: &str) -> Result<Self, ServiceError> {
        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return Err(ServiceError::ValidationError(
                "item reference must not be empty".to_string(),
            ));
        }
        Ok(match Uuid::parse_str(trimmed) {
            Ok(id) => EntryKey::Id(id),
            Err(_) => EntryKey::Name(trimmed.to_string()),
        })
    }

    /// Exact-name key, even for names that look like a UUID.
    pub fn name(name: &str) -> Result<Self, ServiceError> {
        Ok(EntryKey::Name(validate_name(name)?.to_string()))
    }

    fn condition(&self, business_id: Uuid) -> Condition {
        let scoped = Condition::all().add(ledger_entry::Column::BusinessId.eq(business_id));
        match self {
            EntryKey::Id(id) => scoped.add(ledger_entry::Column::Id.eq(*id)),
            EntryKey::Name(name) => scoped.add(ledger_entry::Column::Name.eq(name.as_str())),
        }
    }
}

impl std::fmt::Display for EntryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryKey::Id(id) => write!(f, "{}", id),
            EntryKey::Name(name) => write!(f, "'{}'", name),
        }
    }
}

/// Increments applied to `total_added` and `total_sold`. Both are monotonic,
/// so negative components are rejected at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerDelta {
    added: i64,
    sold: i64,
}

impl LedgerDelta {
    pub fn new(added: i64, sold: i64) -> Result<Self, ServiceError> {
        if added < 0 || sold < 0 {
            return Err(ServiceError::InvariantViolation(format!(
                "negative delta (added {}, sold {}) would decrease a monotonic counter",
                added, sold
            )));
        }
        Ok(Self { added, sold })
    }

    /// Stock arriving from ingestion.
    pub fn credit(quantity: i64) -> Result<Self, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::InvalidQuantity(format!(
                "credit quantity must be positive, got {}",
                quantity
            )));
        }
        Self::new(quantity, 0)
    }

    /// Stock leaving through a sale.
    pub fn debit(quantity: i64) -> Result<Self, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::InvalidQuantity(format!(
                "sale quantity must be positive, got {}",
                quantity
            )));
        }
        Self::new(0, quantity)
    }

    pub fn added(&self) -> i64 {
        self.added
    }

    pub fn sold(&self) -> i64 {
        self.sold
    }

    /// Stock the entry must already hold for this delta to keep `current_quantity >= 0`.
    fn required_stock(&self) -> i64 {
        self.sold - self.added
    }
}

/// Owns every `ledger_entries` row. All counter changes are single conditional
/// UPDATE statements so concurrent writers on the same key serialize in the database.
#[derive(Clone)]
pub struct LedgerStore {
    db: Arc<DatabaseConnection>,
}

impl LedgerStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Returns the entry for `(business_id, name)`, creating it with zero counters on first sight.
    #[instrument(skip(self))]
    pub async fn get_or_create(
        &self,
        business_id: Uuid,
        name: &str,
    ) -> Result<ledger_entry::Model, ServiceError> {
        let name = validate_name(name)?;
        retry_transient("ledger.get_or_create", move || async move {
            let txn = self.db.begin().await?;
            let entry = Self::get_or_create_in(&txn, business_id, name).await?;
            txn.commit().await?;
            Ok(entry)
        })
        .await
    }

    /// Applies `delta` to an existing entry and returns the updated row.
    #[instrument(skip(self))]
    pub async fn apply_delta(
        &self,
        business_id: Uuid,
        name: &str,
        delta: LedgerDelta,
    ) -> Result<ledger_entry::Model, ServiceError> {
        let key = EntryKey::Name(validate_name(name)?.to_string());
        let key = &key;
        retry_transient("ledger.apply_delta", move || {
            self.apply_delta_once(business_id, key, delta)
        })
        .await
    }

    /// All entries of a business, ordered by name.
    #[instrument(skip(self))]
    pub async fn list(&self, business_id: Uuid) -> Result<Vec<ledger_entry::Model>, ServiceError> {
        let entries = LedgerEntry::find()
            .filter(ledger_entry::Column::BusinessId.eq(business_id))
            .order_by_asc(ledger_entry::Column::Name)
            .all(&*self.db)
            .await?;
        Ok(entries)
    }

    /// One entry of a business. Entries owned by another business are reported as missing.
    #[instrument(skip(self))]
    pub async fn find(
        &self,
        business_id: Uuid,
        entry_id: Uuid,
    ) -> Result<ledger_entry::Model, ServiceError> {
        self.find_by_key(business_id, &EntryKey::Id(entry_id))
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("inventory item {}", entry_id)))
    }

    /// Exact-name lookup within a business.
    pub async fn find_by_name(
        &self,
        business_id: Uuid,
        name: &str,
    ) -> Result<Option<ledger_entry::Model>, ServiceError> {
        let name = validate_name(name)?;
        self.find_by_key(business_id, &EntryKey::Name(name.to_string()))
            .await
    }

    pub async fn find_by_key(
        &self,
        business_id: Uuid,
        key: &EntryKey,
    ) -> Result<Option<ledger_entry::Model>, ServiceError> {
        Ok(load(&*self.db, business_id, key).await?)
    }

    pub(crate) async fn get_or_create_in<C: ConnectionTrait>(
        conn: &C,
        business_id: Uuid,
        name: &str,
    ) -> Result<ledger_entry::Model, ServiceError> {
        let now = Utc::now();
        let candidate = ledger_entry::ActiveModel {
            id: Set(Uuid::new_v4()),
            business_id: Set(business_id),
            name: Set(name.to_string()),
            total_added: Set(0),
            total_sold: Set(0),
            current_quantity: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };

        // The unique (business_id, name) index resolves racing first sightings.
        match LedgerEntry::insert(candidate)
            .on_conflict(
                OnConflict::columns([
                    ledger_entry::Column::BusinessId,
                    ledger_entry::Column::Name,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec(conn)
            .await
        {
            Ok(_) | Err(DbErr::RecordNotInserted) => {}
            Err(e) => return Err(e.into()),
        }

        load(conn, business_id, &EntryKey::Name(name.to_string()))
            .await?
            .ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "ledger entry '{}' missing after insert",
                    name
                ))
            })
    }

    /// Conditionally debits `quantity` inside the caller's transaction. The caller
    /// commits or rolls back together with whatever else it writes.
    pub(crate) async fn debit_in<C: ConnectionTrait>(
        conn: &C,
        business_id: Uuid,
        key: &EntryKey,
        quantity: i64,
    ) -> Result<ledger_entry::Model, ServiceError> {
        let delta = LedgerDelta::debit(quantity)?;

        if update_counters(conn, business_id, key, delta).await? == 0 {
            return Err(match load(conn, business_id, key).await? {
                None => ServiceError::NotFound(format!("inventory item {}", key)),
                Some(entry) => ServiceError::InsufficientInventory {
                    available: entry.current_quantity,
                    requested: quantity,
                },
            });
        }

        let entry = reload(conn, business_id, key).await?;
        ensure_balanced(&entry)?;
        Ok(entry)
    }

    async fn apply_delta_once(
        &self,
        business_id: Uuid,
        key: &EntryKey,
        delta: LedgerDelta,
    ) -> Result<ledger_entry::Model, ServiceError> {
        let txn = self.db.begin().await?;

        if update_counters(&txn, business_id, key, delta).await? == 0 {
            let existing = load(&txn, business_id, key).await?;
            txn.rollback().await?;
            return Err(match existing {
                None => ServiceError::NotFound(format!("inventory item {}", key)),
                Some(entry) => {
                    error!(
                        %business_id,
                        item = %entry.name,
                        current = entry.current_quantity,
                        ?delta,
                        "delta would drive current_quantity negative"
                    );
                    ServiceError::InvariantViolation(format!(
                        "delta {:?} exceeds current quantity {} of {}",
                        delta, entry.current_quantity, key
                    ))
                }
            });
        }

        let entry = reload(&txn, business_id, key).await?;
        if let Err(violation) = ensure_balanced(&entry) {
            txn.rollback().await?;
            return Err(violation);
        }

        txn.commit().await?;
        Ok(entry)
    }
}

fn validate_name(name: &str) -> Result<&str, ServiceError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::ValidationError(
            "item name must not be empty".to_string(),
        ));
    }
    if trimmed.chars().count() > MAX_ITEM_NAME_LEN {
        return Err(ServiceError::ValidationError(format!(
            "item name exceeds {} characters",
            MAX_ITEM_NAME_LEN
        )));
    }
    Ok(trimmed)
}

/// Single UPDATE with column arithmetic. When the delta removes stock the row
/// only matches if enough stock remains, which makes the check and the write one step.
async fn update_counters<C: ConnectionTrait>(
    conn: &C,
    business_id: Uuid,
    key: &EntryKey,
    delta: LedgerDelta,
) -> Result<u64, DbErr> {
    let mut update = LedgerEntry::update_many()
        .col_expr(
            ledger_entry::Column::TotalAdded,
            Expr::col(ledger_entry::Column::TotalAdded).add(delta.added),
        )
        .col_expr(
            ledger_entry::Column::TotalSold,
            Expr::col(ledger_entry::Column::TotalSold).add(delta.sold),
        )
        .col_expr(
            ledger_entry::Column::CurrentQuantity,
            Expr::col(ledger_entry::Column::CurrentQuantity).add(delta.added - delta.sold),
        )
        .col_expr(ledger_entry::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(key.condition(business_id));

    if delta.required_stock() > 0 {
        update = update.filter(ledger_entry::Column::CurrentQuantity.gte(delta.required_stock()));
    }

    Ok(update.exec(conn).await?.rows_affected)
}

async fn load<C: ConnectionTrait>(
    conn: &C,
    business_id: Uuid,
    key: &EntryKey,
) -> Result<Option<ledger_entry::Model>, DbErr> {
    LedgerEntry::find()
        .filter(key.condition(business_id))
        .one(conn)
        .await
}

async fn reload<C: ConnectionTrait>(
    conn: &C,
    business_id: Uuid,
    key: &EntryKey,
) -> Result<ledger_entry::Model, ServiceError> {
    load(conn, business_id, key).await?.ok_or_else(|| {
        ServiceError::InternalError(format!("ledger entry {} vanished inside transaction", key))
    })
}

fn ensure_balanced(entry: &ledger_entry::Model) -> Result<(), ServiceError> {
    if entry.is_balanced() {
        return Ok(());
    }
    error!(
        business_id = %entry.business_id,
        item = %entry.name,
        total_added = entry.total_added,
        total_sold = entry.total_sold,
        current_quantity = entry.current_quantity,
        "ledger counters out of balance"
    );
    Err(ServiceError::InvariantViolation(format!(
        "entry {} has added {} sold {} current {}",
        entry.id, entry.total_added, entry.total_sold, entry.current_quantity
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;

    #[rstest]
    #[case("550e8400-e29b-41d4-a716-446655440000", true)]
    #[case("Tomatoes", false)]
    #[case("  Burger Buns ", false)]
    fn entry_key_parses_ids_and_names(#[case] reference: &str, #[case] is_id: bool) {
        let key = EntryKey::parse(reference).unwrap();
        assert_eq!(matches!(key, EntryKey::Id(_)), is_id);
        if let EntryKey::Name(name) = key {
            assert_eq!(name, reference.trim());
        }
    }

    #[test]
    fn explicit_name_key_never_becomes_an_id() {
        let raw = "550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(EntryKey::name(raw).unwrap(), EntryKey::Name(raw.to_string()));
        assert_matches!(EntryKey::name(" "), Err(ServiceError::ValidationError(_)));
    }

    #[test]
    fn blank_reference_is_rejected() {
        assert_matches!(EntryKey::parse("   "), Err(ServiceError::ValidationError(_)));
    }

    #[test]
    fn deltas_reject_negative_and_zero_quantities() {
        assert_matches!(
            LedgerDelta::new(-1, 0),
            Err(ServiceError::InvariantViolation(_))
        );
        assert_matches!(LedgerDelta::credit(0), Err(ServiceError::InvalidQuantity(_)));
        assert_matches!(LedgerDelta::debit(-3), Err(ServiceError::InvalidQuantity(_)));

        let debit = LedgerDelta::debit(4).unwrap();
        assert_eq!(debit.required_stock(), 4);
        assert_eq!(LedgerDelta::credit(4).unwrap().required_stock(), -4);
    }

    #[test]
    fn names_are_trimmed_and_bounded() {
        assert_eq!(validate_name("  Lettuce ").unwrap(), "Lettuce");
        assert_matches!(validate_name(""), Err(ServiceError::ValidationError(_)));
        let long = "x".repeat(MAX_ITEM_NAME_LEN + 1);
        assert_matches!(validate_name(&long), Err(ServiceError::ValidationError(_)));
    }
}
