//! Sales aggregator: one revenue row per stock key.

use crate::{
    db::{self, DbPool},
    entities::{
        order,
        order_item::{self, Entity as OrderItemEntity},
        sales_report::{self, ActiveModel as SalesReportActiveModel, Entity as SalesReportEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{inventory::StockKey, key_locks::KeyedLocks, order_status},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, JoinType,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

pub(crate) async fn find_by_key<C: ConnectionTrait>(
    conn: &C,
    key: &StockKey,
) -> Result<Option<sales_report::Model>, ServiceError> {
    SalesReportEntity::find()
        .filter(key.condition(
            sales_report::Column::ProductType,
            sales_report::Column::Level,
            sales_report::Column::Size,
        ))
        .order_by_asc(sales_report::Column::CreatedAt)
        .one(conn)
        .await
        .map_err(|e| {
            error!(error = %e, key = %key, "Failed to look up sales report");
            ServiceError::DatabaseError(e)
        })
}

/// Sets `total_revenue` only if the row still holds the value that was read.
async fn write_revenue<C: ConnectionTrait>(
    conn: &C,
    current: sales_report::Model,
    total_revenue: Decimal,
) -> Result<sales_report::Model, ServiceError> {
    let now = Utc::now();
    let result = SalesReportEntity::update_many()
        .col_expr(sales_report::Column::TotalRevenue, Expr::value(total_revenue))
        .col_expr(sales_report::Column::UpdatedAt, Expr::value(now))
        .filter(sales_report::Column::Id.eq(current.id))
        .filter(sales_report::Column::TotalRevenue.eq(current.total_revenue))
        .exec(conn)
        .await
        .map_err(|e| {
            error!(error = %e, report_id = %current.id, "Failed to write sales revenue");
            ServiceError::DatabaseError(e)
        })?;

    if result.rows_affected == 0 {
        warn!(report_id = %current.id, "Sales report changed underneath update");
        return Err(ServiceError::ConcurrencyConflict(format!(
            "Sales report {} was modified concurrently",
            current.id
        )));
    }

    Ok(sales_report::Model {
        total_revenue,
        updated_at: now,
        ..current
    })
}

async fn insert_report<C: ConnectionTrait>(
    conn: &C,
    key: &StockKey,
    total_revenue: Decimal,
    sales_date: DateTime<Utc>,
) -> Result<sales_report::Model, ServiceError> {
    let now = Utc::now();
    SalesReportActiveModel {
        id: Set(Uuid::new_v4()),
        product_type: Set(key.product_type.clone()),
        level: Set(key.level.clone()),
        size: Set(key.size.clone()),
        total_revenue: Set(total_revenue),
        sales_date: Set(sales_date),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await
    .map_err(|e| {
        error!(error = %e, key = %key, "Failed to create sales report");
        ServiceError::DatabaseError(e)
    })
}

/// Adds `amount` to the aggregate for `key`, creating it dated `occurred_at`
/// when absent. The caller holds the key lock.
pub(crate) async fn apply_record_revenue<C: ConnectionTrait>(
    conn: &C,
    key: &StockKey,
    amount: Decimal,
    occurred_at: DateTime<Utc>,
) -> Result<sales_report::Model, ServiceError> {
    if amount < Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "Revenue for {key} must not be negative, got {amount}"
        )));
    }

    match find_by_key(conn, key).await? {
        Some(current) => {
            let total = current.total_revenue.checked_add(amount).ok_or_else(|| {
                ServiceError::ValidationError(format!("Revenue total for {key} would overflow"))
            })?;
            write_revenue(conn, current, total).await
        }
        None => insert_report(conn, key, amount, occurred_at).await,
    }
}

/// Sum of stored line totals for `key` across claimed orders.
pub(crate) async fn claimed_revenue<C: ConnectionTrait>(
    conn: &C,
    key: &StockKey,
) -> Result<Option<Decimal>, ServiceError> {
    let lines = OrderItemEntity::find()
        .join(JoinType::InnerJoin, order_item::Relation::Order.def())
        .filter(order::Column::Status.eq(order_status::CLAIMED))
        .filter(key.condition(
            order_item::Column::ProductType,
            order_item::Column::Level,
            order_item::Column::Size,
        ))
        .all(conn)
        .await
        .map_err(|e| {
            error!(error = %e, key = %key, "Failed to load claimed order lines");
            ServiceError::DatabaseError(e)
        })?;

    if lines.is_empty() {
        return Ok(None);
    }
    lines
        .iter()
        .try_fold(Decimal::ZERO, |total, line| total.checked_add(line.total_price))
        .map(Some)
        .ok_or_else(|| ServiceError::ValidationError(format!("Revenue total for {key} would overflow")))
}

#[derive(Clone)]
pub struct SalesReportService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    locks: Arc<KeyedLocks<StockKey>>,
}

impl SalesReportService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        locks: Arc<KeyedLocks<StockKey>>,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            locks,
        }
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<sales_report::Model>, u64), ServiceError> {
        let paginator = SalesReportEntity::find()
            .order_by_desc(sales_report::Column::SalesDate)
            .paginate(&*self.db_pool, limit);

        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count sales reports");
            ServiceError::DatabaseError(e)
        })?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await.map_err(|e| {
            error!(error = %e, page, limit, "Failed to fetch sales reports page");
            ServiceError::DatabaseError(e)
        })?;

        Ok((items, total))
    }

    #[instrument(skip(self), fields(report_id = %id))]
    pub async fn get(&self, id: Uuid) -> Result<sales_report::Model, ServiceError> {
        SalesReportEntity::find_by_id(id)
            .one(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch sales report");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("Sales report {id} not found")))
    }

    pub async fn find(&self, key: &StockKey) -> Result<Option<sales_report::Model>, ServiceError> {
        find_by_key(&*self.db_pool, key).await
    }

    /// Accumulates `amount` into the aggregate for `key`.
    #[instrument(skip(self), fields(key = %key, amount = %amount))]
    pub async fn record_revenue(
        &self,
        key: &StockKey,
        amount: Decimal,
        occurred_at: DateTime<Utc>,
    ) -> Result<sales_report::Model, ServiceError> {
        let _guard = self.locks.lock(key).await;
        let started = Instant::now();
        let txn = db::begin(&self.db_pool, "sales_report.record").await?;
        let report = apply_record_revenue(&txn, key, amount, occurred_at).await?;
        db::commit(txn, "sales_report.record", started).await?;

        info!(report_id = %report.id, total_revenue = %report.total_revenue, "Revenue recorded");
        Ok(report)
    }

    /// Recomputes the aggregate for `key` from stored lines of claimed orders.
    ///
    /// Running it twice yields the same row. The sales date of an existing
    /// row is kept.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn reconcile(&self, key: &StockKey) -> Result<sales_report::Model, ServiceError> {
        let _guard = self.locks.lock(key).await;
        let started = Instant::now();
        let txn = db::begin(&self.db_pool, "sales_report.reconcile").await?;

        let revenue = claimed_revenue(&txn, key).await?;
        let existing = find_by_key(&txn, key).await?;

        let report = match (existing, revenue) {
            (None, None) => {
                return Err(ServiceError::NotFound(format!(
                    "No claimed sales found for {key}"
                )))
            }
            (Some(current), revenue) => {
                let total = revenue.unwrap_or(Decimal::ZERO);
                if current.total_revenue == total {
                    current
                } else {
                    write_revenue(&txn, current, total).await?
                }
            }
            (None, Some(total)) => insert_report(&txn, key, total, Utc::now()).await?,
        };

        db::commit(txn, "sales_report.reconcile", started).await?;
        info!(report_id = %report.id, total_revenue = %report.total_revenue, "Sales report reconciled");

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::SalesReportReconciled {
                    report_id: report.id,
                    total_revenue: report.total_revenue,
                })
                .await;
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::memory_db;
    use assert_matches::assert_matches;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn service(db: Arc<DbPool>) -> SalesReportService {
        SalesReportService::new(db, None, Arc::new(KeyedLocks::new()))
    }

    #[tokio::test]
    async fn record_revenue_accumulates_and_keeps_first_date() {
        let svc = service(memory_db().await);
        let key = StockKey::new("Polo", "Grade7", Some("M"));
        let first = Utc::now() - Duration::days(2);
        let later = Utc::now();

        let created = svc.record_revenue(&key, dec!(30), first).await.unwrap();
        assert_eq!(created.total_revenue, dec!(30));

        let updated = svc.record_revenue(&key, dec!(12.5), later).await.unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.total_revenue, dec!(42.5));

        let stored = svc.get(created.id).await.unwrap();
        assert_eq!(stored.total_revenue, dec!(42.5));
        assert_eq!(stored.sales_date.timestamp(), first.timestamp());
    }

    #[tokio::test]
    async fn negative_revenue_is_rejected() {
        let svc = service(memory_db().await);
        let key = StockKey::new("Polo", "Grade7", Some("M"));
        assert_matches!(
            svc.record_revenue(&key, dec!(-1), Utc::now()).await,
            Err(ServiceError::ValidationError(_))
        );
        assert!(svc.find(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn zero_revenue_creates_row() {
        let svc = service(memory_db().await);
        let key = StockKey::new("Socks", "Grade1", None);
        let report = svc.record_revenue(&key, Decimal::ZERO, Utc::now()).await.unwrap();
        assert_eq!(report.total_revenue, Decimal::ZERO);
    }

    #[tokio::test]
    async fn reconcile_without_sales_is_not_found() {
        let svc = service(memory_db().await);
        let err = svc
            .reconcile(&StockKey::new("Blazer", "Grade12", Some("XL")))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn reconcile_resets_drifted_total_to_zero_without_claims() {
        let svc = service(memory_db().await);
        let key = StockKey::new("Polo", "Grade8", Some("S"));
        let report = svc.record_revenue(&key, dec!(99), Utc::now()).await.unwrap();

        let reconciled = svc.reconcile(&key).await.unwrap();
        assert_eq!(reconciled.id, report.id);
        assert_eq!(reconciled.total_revenue, Decimal::ZERO);
    }
}
