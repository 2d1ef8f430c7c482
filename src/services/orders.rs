use crate::{
    db::{self, DbPool},
    entities::{
        order::{self, ActiveModel as OrderActiveModel, Entity as OrderEntity},
        order_item::{self, ActiveModel as OrderItemActiveModel, Entity as OrderItemEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        fulfillment::FulfillmentService,
        inventory::{StockKey, StockPolicy},
        key_locks::KeyedLocks,
        order_status::OrderStatus,
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// A line as supplied by a caller. Totals are always derived.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderLineInput {
    pub key: StockKey,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Largest amount a `decimal(14, 2)` money column holds.
pub const MAX_AMOUNT: Decimal = dec!(999999999999.99);
/// Decimal places kept by money columns.
pub const MONEY_SCALE: u32 = 2;

fn bounded_amount(
    amount: Option<Decimal>,
    what: impl FnOnce() -> String,
) -> Result<Decimal, ServiceError> {
    match amount {
        Some(value) if value <= MAX_AMOUNT => Ok(value),
        _ => Err(ServiceError::ValidationError(format!(
            "{} exceeds the maximum amount of {MAX_AMOUNT}",
            what()
        ))),
    }
}

impl OrderLineInput {
    /// `quantity × unit_price`, rejected when it does not fit a money column.
    pub fn total_price(&self) -> Result<Decimal, ServiceError> {
        bounded_amount(
            Decimal::from(self.quantity).checked_mul(self.unit_price),
            || format!("Line total for {}", self.key),
        )
    }

    pub(crate) fn validate(&self) -> Result<(), ServiceError> {
        if self.key.product_type.is_empty() || self.key.level.is_empty() {
            return Err(ServiceError::ValidationError(
                "Order lines need a product type and level".to_string(),
            ));
        }
        if self.quantity < 1 {
            return Err(ServiceError::ValidationError(format!(
                "Quantity for {} must be at least 1",
                self.key
            )));
        }
        if self.unit_price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Unit price for {} must not be negative",
                self.key
            )));
        }
        if self.unit_price.normalize().scale() > MONEY_SCALE {
            return Err(ServiceError::ValidationError(format!(
                "Unit price for {} must have at most {MONEY_SCALE} decimal places",
                self.key
            )));
        }
        bounded_amount(Some(self.unit_price), || format!("Unit price for {}", self.key))?;
        self.total_price().map(|_| ())
    }
}

impl From<&order_item::Model> for OrderLineInput {
    fn from(line: &order_item::Model) -> Self {
        Self {
            key: StockKey::new(&line.product_type, &line.level, line.size.as_deref()),
            quantity: line.quantity,
            unit_price: line.unit_price,
        }
    }
}

/// Sum of line totals, rejected when it does not fit a money column.
pub fn total_of(lines: &[OrderLineInput]) -> Result<Decimal, ServiceError> {
    lines.iter().try_fold(Decimal::ZERO, |total, line| {
        bounded_amount(total.checked_add(line.total_price()?), || "Order total".to_string())
    })
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub student_number: String,
    pub student_name: String,
    pub contact_number: String,
    pub gender: Option<String>,
    pub status: Option<String>,
    pub lines: Vec<OrderLineInput>,
}

/// Fields accepted by an order update. `lines`, when present, drive the
/// recomputed total and any fulfillment side effects.
#[derive(Debug, Clone, Default)]
pub struct OrderUpdate {
    pub student_number: Option<String>,
    pub student_name: Option<String>,
    pub contact_number: Option<String>,
    pub gender: Option<String>,
    pub status: String,
    pub lines: Option<Vec<OrderLineInput>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderWithLines {
    pub order: order::Model,
    pub lines: Vec<order_item::Model>,
}

pub(crate) async fn load_order<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<OrderWithLines, ServiceError> {
    let order = OrderEntity::find_by_id(order_id)
        .one(conn)
        .await
        .map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to fetch order");
            ServiceError::DatabaseError(e)
        })?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

    let lines = OrderItemEntity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .order_by_asc(order_item::Column::CreatedAt)
        .all(conn)
        .await
        .map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to fetch order lines");
            ServiceError::DatabaseError(e)
        })?;

    Ok(OrderWithLines { order, lines })
}

/// Service for managing orders and their lines
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    fulfillment: FulfillmentService,
}

impl OrderService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        locks: Arc<KeyedLocks<StockKey>>,
        policy: StockPolicy,
    ) -> Self {
        let fulfillment =
            FulfillmentService::new(db_pool.clone(), event_sender.clone(), locks, policy);
        Self {
            db_pool,
            event_sender,
            fulfillment,
        }
    }

    /// Creates an order and its lines in one transaction.
    #[instrument(skip(self, request), fields(student_number = %request.student_number, lines = request.lines.len()))]
    pub async fn create_order(&self, request: NewOrder) -> Result<OrderWithLines, ServiceError> {
        if request.lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "An order needs at least one line".to_string(),
            ));
        }
        for line in &request.lines {
            line.validate()?;
        }
        let total = total_of(&request.lines)?;

        let status = match request.status.as_deref() {
            Some(raw) => OrderStatus::parse(raw)?,
            None => OrderStatus::Pending,
        };
        if status.is_claimed() {
            return Err(ServiceError::InvalidStatus(
                "Orders are claimed through an update, not at creation".to_string(),
            ));
        }

        let order_id = Uuid::new_v4();
        let now = Utc::now();
        let started = Instant::now();
        let txn = db::begin(&self.db_pool, "order.create").await?;

        let order = OrderActiveModel {
            id: Set(order_id),
            student_number: Set(request.student_number.trim().to_string()),
            student_name: Set(request.student_name.trim().to_string()),
            contact_number: Set(request.contact_number.trim().to_string()),
            gender: Set(request.gender),
            status: Set(status.to_string()),
            total_price: Set(total),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to create order");
            ServiceError::DatabaseError(e)
        })?;

        let mut lines = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            let stored = OrderItemActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                level: Set(line.key.level.clone()),
                product_type: Set(line.key.product_type.clone()),
                size: Set(line.key.size.clone()),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                total_price: Set(line.total_price()?),
                created_at: Set(now),
            }
            .insert(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to create order line");
                ServiceError::DatabaseError(e)
            })?;
            lines.push(stored);
        }

        db::commit(txn, "order.create", started).await?;
        info!(order_id = %order_id, total_price = %order.total_price, "Order created");

        if let Some(sender) = &self.event_sender {
            sender.send_or_log(Event::OrderCreated(order_id)).await;
        }

        Ok(OrderWithLines { order, lines })
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderWithLines, ServiceError> {
        load_order(&*self.db_pool, order_id).await
    }

    /// Lists orders newest first, each with its lines
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<OrderWithLines>, u64), ServiceError> {
        let db = &*self.db_pool;
        let paginator = OrderEntity::find()
            .order_by_desc(order::Column::CreatedAt)
            .paginate(db, limit);

        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count orders");
            ServiceError::DatabaseError(e)
        })?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await.map_err(|e| {
            error!(error = %e, page, limit, "Failed to fetch orders page");
            ServiceError::DatabaseError(e)
        })?;

        let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let mut lines_by_order: HashMap<Uuid, Vec<order_item::Model>> = HashMap::new();
        if !ids.is_empty() {
            let lines = OrderItemEntity::find()
                .filter(order_item::Column::OrderId.is_in(ids))
                .order_by_asc(order_item::Column::CreatedAt)
                .all(db)
                .await
                .map_err(|e| {
                    error!(error = %e, "Failed to fetch lines for orders page");
                    ServiceError::DatabaseError(e)
                })?;
            for line in lines {
                lines_by_order.entry(line.order_id).or_default().push(line);
            }
        }

        let items = orders
            .into_iter()
            .map(|order| {
                let lines = lines_by_order.remove(&order.id).unwrap_or_default();
                OrderWithLines { order, lines }
            })
            .collect();

        Ok((items, total))
    }

    /// Applies an update, fulfilling the order when it moves to CLAIMED.
    pub async fn update_order(
        &self,
        order_id: Uuid,
        update: OrderUpdate,
    ) -> Result<OrderWithLines, ServiceError> {
        self.fulfillment.fulfill_order(order_id, update).await
    }

    /// Deletes an order and its lines. Stock is not restored.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn delete_order(&self, order_id: Uuid) -> Result<OrderWithLines, ServiceError> {
        let started = Instant::now();
        let txn = db::begin(&self.db_pool, "order.delete").await?;
        let existing = load_order(&txn, order_id).await?;

        OrderItemEntity::delete_many()
            .filter(order_item::Column::OrderId.eq(order_id))
            .exec(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to delete order lines");
                ServiceError::DatabaseError(e)
            })?;
        OrderEntity::delete_by_id(order_id)
            .exec(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to delete order");
                ServiceError::DatabaseError(e)
            })?;

        db::commit(txn, "order.delete", started).await?;
        if OrderStatus::parse(&existing.order.status).is_ok_and(|s| s.is_claimed()) {
            warn!(order_id = %order_id, "Deleted a claimed order; stock was not restored");
        } else {
            info!(order_id = %order_id, "Order deleted");
        }

        if let Some(sender) = &self.event_sender {
            sender.send_or_log(Event::OrderDeleted(order_id)).await;
        }
        Ok(existing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::memory_db;
    use assert_matches::assert_matches;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn service(db: Arc<DbPool>) -> OrderService {
        OrderService::new(db, None, Arc::new(KeyedLocks::new()), StockPolicy::Reject)
    }

    fn line(product_type: &str, size: &str, quantity: i32, unit_price: Decimal) -> OrderLineInput {
        OrderLineInput {
            key: StockKey::new(product_type, "Grade7", Some(size)),
            quantity,
            unit_price,
        }
    }

    fn new_order(lines: Vec<OrderLineInput>) -> NewOrder {
        NewOrder {
            student_number: "2024-0001".into(),
            student_name: "Dana Cruz".into(),
            contact_number: "09171234567".into(),
            gender: Some("F".into()),
            status: None,
            lines,
        }
    }

    proptest! {
        #[test]
        fn order_total_is_sum_of_line_products(
            lines in proptest::collection::vec((1i32..50, 0i64..10_000), 1..8)
        ) {
            let inputs: Vec<OrderLineInput> = lines
                .iter()
                .map(|(q, cents)| line("Polo", "M", *q, Decimal::new(*cents, 2)))
                .collect();
            let expected: Decimal = lines
                .iter()
                .map(|(q, cents)| Decimal::from(*q) * Decimal::new(*cents, 2))
                .sum();
            prop_assert_eq!(total_of(&inputs).unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn create_derives_line_and_order_totals() {
        let svc = service(memory_db().await);
        let created = svc
            .create_order(new_order(vec![
                line("Polo", "M", 3, dec!(10)),
                line("Pants", "L", 2, dec!(12.5)),
            ]))
            .await
            .unwrap();

        assert_eq!(created.order.status, "PENDING");
        assert_eq!(created.order.total_price, dec!(55));
        assert_eq!(created.lines.len(), 2);
        assert_eq!(created.lines[0].total_price, dec!(30));

        let fetched = svc.get_order(created.order.id).await.unwrap();
        assert_eq!(fetched.lines.len(), 2);
        assert_eq!(fetched.order.total_price, dec!(55));
    }

    #[tokio::test]
    async fn create_rejects_claimed_status_and_empty_lines() {
        let svc = service(memory_db().await);

        let mut claimed = new_order(vec![line("Polo", "M", 1, dec!(10))]);
        claimed.status = Some("claimed".into());
        assert_matches!(
            svc.create_order(claimed).await,
            Err(ServiceError::InvalidStatus(_))
        );

        assert_matches!(
            svc.create_order(new_order(vec![])).await,
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            svc.create_order(new_order(vec![line("Polo", "M", 0, dec!(10))])).await,
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn unit_price_must_fit_a_money_column() {
        let huge = Decimal::from_str_exact("79228162514264337593543950335").unwrap();
        assert_matches!(
            line("Polo", "M", 2, huge).validate(),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            line("Polo", "M", 1, MAX_AMOUNT + dec!(0.01)).validate(),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            line("Polo", "M", 1, dec!(0.333)).validate(),
            Err(ServiceError::ValidationError(_))
        );
        assert!(line("Polo", "M", 1, dec!(10.000)).validate().is_ok());
        assert!(line("Polo", "M", 1, MAX_AMOUNT).validate().is_ok());
    }

    #[test]
    fn overflowing_totals_are_rejected() {
        assert_matches!(
            line("Polo", "M", 2, MAX_AMOUNT).total_price(),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            line("Polo", "M", i32::MAX, Decimal::MAX).total_price(),
            Err(ServiceError::ValidationError(_))
        );

        let half = dec!(600000000000);
        let lines = vec![line("Polo", "M", 1, half), line("Pants", "L", 1, half)];
        assert!(lines.iter().all(|l| l.validate().is_ok()));
        assert_matches!(total_of(&lines), Err(ServiceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn create_rejects_unbounded_prices_without_writing() {
        let db = memory_db().await;
        let svc = service(db.clone());
        let huge = Decimal::from_str_exact("79228162514264337593543950335").unwrap();

        assert_matches!(
            svc.create_order(new_order(vec![line("Polo", "M", 2, huge)])).await,
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            svc.create_order(new_order(vec![
                line("Polo", "M", 1, dec!(600000000000)),
                line("Pants", "L", 1, dec!(600000000000)),
            ]))
            .await,
            Err(ServiceError::ValidationError(_))
        );

        assert_eq!(OrderEntity::find().count(&*db).await.unwrap(), 0);
        assert_eq!(OrderItemEntity::find().count(&*db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_groups_lines_per_order() {
        let svc = service(memory_db().await);
        svc.create_order(new_order(vec![line("Polo", "M", 1, dec!(10))]))
            .await
            .unwrap();
        svc.create_order(new_order(vec![
            line("Polo", "S", 1, dec!(10)),
            line("Polo", "L", 1, dec!(10)),
        ]))
        .await
        .unwrap();

        let (orders, total) = svc.list_orders(1, 10).await.unwrap();
        assert_eq!(total, 2);
        let mut counts: Vec<usize> = orders.iter().map(|o| o.lines.len()).collect();
        counts.sort_unstable();
        assert_eq!(counts, vec![1, 2]);
    }

    #[tokio::test]
    async fn delete_returns_order_and_removes_lines() {
        let db = memory_db().await;
        let svc = service(db.clone());
        let created = svc
            .create_order(new_order(vec![line("Polo", "M", 1, dec!(10))]))
            .await
            .unwrap();

        let deleted = svc.delete_order(created.order.id).await.unwrap();
        assert_eq!(deleted.lines.len(), 1);

        let remaining = OrderItemEntity::find().count(&*db).await.unwrap();
        assert_eq!(remaining, 0);
        assert!(svc.get_order(created.order.id).await.unwrap_err().is_not_found());
        assert!(svc.delete_order(created.order.id).await.unwrap_err().is_not_found());
    }
}
