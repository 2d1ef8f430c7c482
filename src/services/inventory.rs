//! Stock ledger for sellable finished goods.
//!
//! Rows are matched by [`StockKey`] rather than by foreign key. Every mutation
//! runs under the key's lock and writes with an UPDATE guarded on the quantity
//! that was read, so a concurrent writer outside this process surfaces as
//! [`ServiceError::ConcurrencyConflict`] instead of a lost update.

use crate::{
    db::{self, DbPool},
    entities::inventory::{self, ActiveModel as InventoryActiveModel, Entity as InventoryEntity},
    errors::ServiceError,
    events::{Event, EventSender},
    services::key_locks::KeyedLocks,
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Composite identity shared by stock, finished-product and sales rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StockKey {
    pub product_type: String,
    pub level: String,
    pub size: Option<String>,
}

impl StockKey {
    /// Builds a normalised key: fields are trimmed and a blank size means "no size".
    pub fn new(product_type: &str, level: &str, size: Option<&str>) -> Self {
        Self {
            product_type: product_type.trim().to_string(),
            level: level.trim().to_string(),
            size: size
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        }
    }

    /// Exact match on all three columns. A missing size only matches NULL.
    pub fn condition<C: ColumnTrait>(&self, product_type: C, level: C, size: C) -> Condition {
        let size_condition = match &self.size {
            Some(value) => size.eq(value.as_str()),
            None => size.is_null(),
        };
        Condition::all()
            .add(product_type.eq(self.product_type.as_str()))
            .add(level.eq(self.level.as_str()))
            .add(size_condition)
    }
}

impl fmt::Display for StockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.product_type,
            self.level,
            self.size.as_deref().unwrap_or("-")
        )
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum StockStatus {
    InStock,
    OutOfStock,
}

impl StockStatus {
    pub fn from_quantity(quantity: i32) -> Self {
        if quantity <= 0 {
            StockStatus::OutOfStock
        } else {
            StockStatus::InStock
        }
    }
}

/// What a decrement does when it would take quantity below zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StockPolicy {
    /// Fail with `InsufficientStock` and leave the row untouched
    #[default]
    Reject,
    /// Floor the result at zero
    Clamp,
    /// Record the shortfall as a negative quantity
    AllowNegative,
}

impl StockPolicy {
    /// Computes the quantity left after removing `amount` from `current`.
    pub fn apply(self, key: &StockKey, current: i32, amount: i32) -> Result<i32, ServiceError> {
        let remaining = current.saturating_sub(amount);
        match self {
            StockPolicy::Reject if remaining < 0 => Err(ServiceError::InsufficientStock(format!(
                "{key}: requested {amount}, available {current}"
            ))),
            StockPolicy::Reject | StockPolicy::AllowNegative => Ok(remaining),
            StockPolicy::Clamp => Ok(remaining.max(0)),
        }
    }
}

fn ensure_positive(amount: i32) -> Result<(), ServiceError> {
    if amount <= 0 {
        return Err(ServiceError::ValidationError(format!(
            "Quantity must be positive, got {amount}"
        )));
    }
    Ok(())
}

pub(crate) async fn find_by_key<C: ConnectionTrait>(
    conn: &C,
    key: &StockKey,
) -> Result<Option<inventory::Model>, ServiceError> {
    InventoryEntity::find()
        .filter(key.condition(
            inventory::Column::ProductType,
            inventory::Column::Level,
            inventory::Column::Size,
        ))
        .order_by_asc(inventory::Column::CreatedAt)
        .one(conn)
        .await
        .map_err(|e| {
            error!(error = %e, key = %key, "Failed to look up stock entry");
            ServiceError::DatabaseError(e)
        })
}

/// Writes `new_quantity` only if the row still holds `current.quantity`.
async fn write_quantity<C: ConnectionTrait>(
    conn: &C,
    current: inventory::Model,
    new_quantity: i32,
) -> Result<inventory::Model, ServiceError> {
    let status = StockStatus::from_quantity(new_quantity);
    let now = Utc::now();

    let result = InventoryEntity::update_many()
        .col_expr(inventory::Column::Quantity, Expr::value(new_quantity))
        .col_expr(inventory::Column::Status, Expr::value(status.to_string()))
        .col_expr(inventory::Column::UpdatedAt, Expr::value(now))
        .filter(inventory::Column::Id.eq(current.id))
        .filter(inventory::Column::Quantity.eq(current.quantity))
        .exec(conn)
        .await
        .map_err(|e| {
            error!(error = %e, inventory_id = %current.id, "Failed to write stock quantity");
            ServiceError::DatabaseError(e)
        })?;

    if result.rows_affected == 0 {
        warn!(inventory_id = %current.id, expected = current.quantity, "Stock row changed underneath update");
        return Err(ServiceError::ConcurrencyConflict(format!(
            "Stock entry {} was modified concurrently",
            current.id
        )));
    }

    Ok(inventory::Model {
        quantity: new_quantity,
        status: status.to_string(),
        updated_at: now,
        ..current
    })
}

/// Adds `amount` to the entry for `key`, creating it when absent.
/// The caller holds the key lock.
pub(crate) async fn apply_increment<C: ConnectionTrait>(
    conn: &C,
    key: &StockKey,
    amount: i32,
) -> Result<inventory::Model, ServiceError> {
    ensure_positive(amount)?;

    match find_by_key(conn, key).await? {
        Some(current) => {
            let new_quantity = current.quantity.checked_add(amount).ok_or_else(|| {
                ServiceError::ValidationError(format!("Stock quantity for {key} would overflow"))
            })?;
            write_quantity(conn, current, new_quantity).await
        }
        None => {
            let now = Utc::now();
            InventoryActiveModel {
                id: Set(Uuid::new_v4()),
                level: Set(key.level.clone()),
                product_type: Set(key.product_type.clone()),
                size: Set(key.size.clone()),
                quantity: Set(amount),
                status: Set(StockStatus::from_quantity(amount).to_string()),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(conn)
            .await
            .map_err(|e| {
                error!(error = %e, key = %key, "Failed to create stock entry");
                ServiceError::DatabaseError(e)
            })
        }
    }
}

/// Removes `amount` from the entry for `key` under `policy`.
///
/// Returns `NotFound` when no entry matches. The caller holds the key lock.
pub(crate) async fn apply_decrement<C: ConnectionTrait>(
    conn: &C,
    key: &StockKey,
    amount: i32,
    policy: StockPolicy,
) -> Result<inventory::Model, ServiceError> {
    ensure_positive(amount)?;

    let current = find_by_key(conn, key)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("No stock entry for {key}")))?;

    let new_quantity = policy.apply(key, current.quantity, amount)?;
    write_quantity(conn, current, new_quantity).await
}

pub(crate) fn depleted_event(entry: &inventory::Model) -> Option<Event> {
    (entry.quantity <= 0).then(|| Event::StockDepleted {
        inventory_id: entry.id,
        product_type: entry.product_type.clone(),
        level: entry.level.clone(),
        size: entry.size.clone(),
        quantity: entry.quantity,
    })
}

/// Service for the finished-goods stock ledger
#[derive(Clone)]
pub struct InventoryService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    locks: Arc<KeyedLocks<StockKey>>,
    policy: StockPolicy,
}

impl InventoryService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        locks: Arc<KeyedLocks<StockKey>>,
        policy: StockPolicy,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            locks,
            policy,
        }
    }

    pub fn policy(&self) -> StockPolicy {
        self.policy
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<inventory::Model>, u64), ServiceError> {
        let db = &*self.db_pool;
        let paginator = InventoryEntity::find()
            .order_by_asc(inventory::Column::ProductType)
            .order_by_asc(inventory::Column::Level)
            .order_by_asc(inventory::Column::Size)
            .paginate(db, limit);

        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count stock entries");
            ServiceError::DatabaseError(e)
        })?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await.map_err(|e| {
            error!(error = %e, page, limit, "Failed to fetch stock page");
            ServiceError::DatabaseError(e)
        })?;

        Ok((items, total))
    }

    #[instrument(skip(self), fields(inventory_id = %id))]
    pub async fn get(&self, id: Uuid) -> Result<inventory::Model, ServiceError> {
        InventoryEntity::find_by_id(id)
            .one(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch stock entry");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("Inventory item {id} not found")))
    }

    pub async fn find(&self, key: &StockKey) -> Result<Option<inventory::Model>, ServiceError> {
        find_by_key(&*self.db_pool, key).await
    }

    /// Restocks `key` by `amount`, creating the entry on first use.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn increment(
        &self,
        key: &StockKey,
        amount: i32,
    ) -> Result<inventory::Model, ServiceError> {
        let _guard = self.locks.lock(key).await;
        let started = Instant::now();
        let txn = db::begin(&self.db_pool, "inventory.increment").await?;
        let entry = apply_increment(&txn, key, amount).await?;
        db::commit(txn, "inventory.increment", started).await?;

        info!(inventory_id = %entry.id, quantity = entry.quantity, "Stock incremented");
        self.publish(Event::StockReplenished {
            inventory_id: entry.id,
            quantity: entry.quantity,
        })
        .await;
        Ok(entry)
    }

    /// Removes `amount` from `key` under the configured policy.
    #[instrument(skip(self), fields(key = %key, policy = ?self.policy))]
    pub async fn decrement(
        &self,
        key: &StockKey,
        amount: i32,
    ) -> Result<inventory::Model, ServiceError> {
        let _guard = self.locks.lock(key).await;
        let started = Instant::now();
        let txn = db::begin(&self.db_pool, "inventory.decrement").await?;
        let entry = apply_decrement(&txn, key, amount, self.policy).await?;
        db::commit(txn, "inventory.decrement", started).await?;

        info!(inventory_id = %entry.id, quantity = entry.quantity, "Stock decremented");
        if let Some(event) = depleted_event(&entry) {
            self.publish(event).await;
        }
        Ok(entry)
    }

    async fn publish(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::memory_db;
    use assert_matches::assert_matches;
    use proptest::prelude::*;
    use rstest::rstest;

    fn service(db: Arc<DbPool>, policy: StockPolicy) -> InventoryService {
        InventoryService::new(db, None, Arc::new(KeyedLocks::new()), policy)
    }

    #[test]
    fn key_normalises_whitespace_and_blank_size() {
        let key = StockKey::new("  Polo ", "Grade7 ", Some("   "));
        assert_eq!(key.product_type, "Polo");
        assert_eq!(key.level, "Grade7");
        assert_eq!(key.size, None);
        assert_eq!(key.to_string(), "Polo/Grade7/-");
    }

    #[test]
    fn key_preserves_case() {
        assert_ne!(
            StockKey::new("Polo", "Grade7", Some("M")),
            StockKey::new("Polo", "Grade7", Some("m"))
        );
    }

    #[rstest]
    #[case(StockPolicy::Reject, 5, 3, Some(2))]
    #[case(StockPolicy::Reject, 3, 3, Some(0))]
    #[case(StockPolicy::Reject, 0, 3, None)]
    #[case(StockPolicy::Clamp, 0, 3, Some(0))]
    #[case(StockPolicy::Clamp, 2, 3, Some(0))]
    #[case(StockPolicy::AllowNegative, 4, 5, Some(-1))]
    fn policy_outcomes(
        #[case] policy: StockPolicy,
        #[case] current: i32,
        #[case] amount: i32,
        #[case] expected: Option<i32>,
    ) {
        let key = StockKey::new("Polo", "Grade7", Some("M"));
        match expected {
            Some(quantity) => assert_eq!(policy.apply(&key, current, amount).unwrap(), quantity),
            None => assert_matches!(
                policy.apply(&key, current, amount),
                Err(ServiceError::InsufficientStock(_))
            ),
        }
    }

    proptest! {
        #[test]
        fn status_is_out_of_stock_iff_not_positive(quantity in -1000i32..1000) {
            let status = StockStatus::from_quantity(quantity);
            prop_assert_eq!(status == StockStatus::OutOfStock, quantity <= 0);
        }

        #[test]
        fn clamp_never_goes_negative(current in 0i32..10_000, amount in 1i32..10_000) {
            let key = StockKey::new("Polo", "Grade7", None);
            let remaining = StockPolicy::Clamp.apply(&key, current, amount).unwrap();
            prop_assert!(remaining >= 0);
            prop_assert_eq!(remaining, (current - amount).max(0));
        }
    }

    #[test]
    fn status_strings_match_wire_format() {
        assert_eq!(StockStatus::InStock.to_string(), "IN_STOCK");
        assert_eq!(StockStatus::OutOfStock.to_string(), "OUT_OF_STOCK");
        assert_eq!("OUT_OF_STOCK".parse::<StockStatus>().unwrap(), StockStatus::OutOfStock);
    }

    #[tokio::test]
    async fn increment_creates_then_accumulates() {
        let db = memory_db().await;
        let svc = service(db, StockPolicy::Reject);
        let key = StockKey::new("Polo", "Grade7", Some("M"));

        let created = svc.increment(&key, 5).await.unwrap();
        assert_eq!(created.quantity, 5);
        assert_eq!(created.status, "IN_STOCK");

        let updated = svc.increment(&key, 2).await.unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.quantity, 7);
    }

    #[tokio::test]
    async fn decrement_derives_status() {
        let db = memory_db().await;
        let svc = service(db, StockPolicy::Reject);
        let key = StockKey::new("Skirt", "Grade9", Some("S"));
        svc.increment(&key, 3).await.unwrap();

        let entry = svc.decrement(&key, 3).await.unwrap();
        assert_eq!(entry.quantity, 0);
        assert_eq!(entry.status, "OUT_OF_STOCK");
    }

    #[tokio::test]
    async fn reject_leaves_quantity_unchanged() {
        let db = memory_db().await;
        let svc = service(db, StockPolicy::Reject);
        let key = StockKey::new("Polo", "Grade7", Some("M"));
        svc.increment(&key, 1).await.unwrap();

        assert_matches!(
            svc.decrement(&key, 3).await,
            Err(ServiceError::InsufficientStock(_))
        );
        assert_eq!(svc.find(&key).await.unwrap().unwrap().quantity, 1);
    }

    #[tokio::test]
    async fn decrement_of_unknown_key_is_not_found() {
        let db = memory_db().await;
        let svc = service(db, StockPolicy::Reject);
        let err = svc
            .decrement(&StockKey::new("Blazer", "Grade12", None), 1)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn absent_size_only_matches_null_size() {
        let db = memory_db().await;
        let svc = service(db, StockPolicy::Reject);
        svc.increment(&StockKey::new("Necktie", "Grade7", Some("M")), 4)
            .await
            .unwrap();

        assert!(svc
            .find(&StockKey::new("Necktie", "Grade7", None))
            .await
            .unwrap()
            .is_none());
        assert!(svc
            .find(&StockKey::new(" Necktie", "Grade7 ", Some(" M ")))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn non_positive_amounts_are_rejected() {
        let db = memory_db().await;
        let svc = service(db, StockPolicy::AllowNegative);
        let key = StockKey::new("Polo", "Grade7", None);
        assert_matches!(
            svc.increment(&key, 0).await,
            Err(ServiceError::ValidationError(_))
        );
    }

    #[tokio::test]
    async fn stale_write_is_reported_as_concurrency_conflict() {
        let db = memory_db().await;
        let svc = service(db.clone(), StockPolicy::Reject);
        let key = StockKey::new("Polo", "Grade7", Some("L"));
        let entry = svc.increment(&key, 5).await.unwrap();

        let stale = inventory::Model {
            quantity: 4,
            ..entry
        };
        assert_matches!(
            write_quantity(&*db, stale, 2).await,
            Err(ServiceError::ConcurrencyConflict(_))
        );
    }
}
