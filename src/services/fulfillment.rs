//! Order fulfillment workflow.
//!
//! Moving an order to CLAIMED decrements the stock ledger and records revenue
//! for every line. All writes happen in one transaction; the order row is
//! claimed with an UPDATE that only matches unclaimed orders, so a second
//! claim can never re-apply side effects.

use crate::{
    db::{self, DbPool},
    entities::order::{self, Entity as OrderEntity},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        inventory::{self, StockKey, StockPolicy},
        key_locks::KeyedLocks,
        order_status::{self, OrderStatus},
        orders::{load_order, total_of, OrderLineInput, OrderUpdate, OrderWithLines},
        sales_reports,
    },
};
use chrono::Utc;
use metrics::counter;
use sea_orm::{sea_query::Expr, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

const OPERATION: &str = "order.fulfill";

/// What a committed update did, for logging and events.
#[derive(Debug, Default)]
struct FulfillmentOutcome {
    claimed: bool,
    lines_applied: usize,
    lines_missing_stock: usize,
    events: Vec<Event>,
}

#[derive(Clone)]
pub struct FulfillmentService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    locks: Arc<KeyedLocks<StockKey>>,
    policy: StockPolicy,
}

impl FulfillmentService {
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

    /// Updates the order and, when the new status is CLAIMED, applies the
    /// stock and revenue effects of every line.
    ///
    /// Lines come from `update.lines` when supplied, otherwise from the
    /// stored order. Stored lines are never rewritten.
    #[instrument(skip(self, update), fields(order_id = %order_id, status = %update.status, policy = ?self.policy))]
    pub async fn fulfill_order(
        &self,
        order_id: Uuid,
        update: OrderUpdate,
    ) -> Result<OrderWithLines, ServiceError> {
        let result = self.run(order_id, update).await;
        if let Err(e) = &result {
            let reason = match e {
                ServiceError::Conflict(_) => "already_claimed",
                ServiceError::InsufficientStock(_) => "insufficient_stock",
                ServiceError::ConcurrencyConflict(_) => "concurrent_update",
                ServiceError::NotFound(_) => "not_found",
                ServiceError::InvalidStatus(_) | ServiceError::ValidationError(_) => "invalid",
                _ => "error",
            };
            counter!("uniform_ops.fulfillment.rejected", 1, "reason" => reason);
        }
        result
    }

    async fn run(
        &self,
        order_id: Uuid,
        update: OrderUpdate,
    ) -> Result<OrderWithLines, ServiceError> {
        let next = OrderStatus::parse(&update.status)?;
        if let Some(lines) = &update.lines {
            if lines.is_empty() {
                return Err(ServiceError::ValidationError(
                    "orderItems must not be empty when supplied".to_string(),
                ));
            }
            for line in lines {
                line.validate()?;
            }
        }

        // Fail fast before taking any locks.
        let snapshot = load_order(&*self.db_pool, order_id).await?;
        stored_status(&snapshot.order).check_transition(&next)?;

        let lines: Vec<OrderLineInput> = match update.lines.clone() {
            Some(lines) => lines,
            None => snapshot.lines.iter().map(OrderLineInput::from).collect(),
        };

        // Locks are taken before the transaction so a waiting request never
        // holds a pooled connection.
        let _guards = if next.is_claimed() {
            self.locks
                .lock_many(lines.iter().map(|line| line.key.clone()))
                .await
        } else {
            Vec::new()
        };

        let started = Instant::now();
        let txn = db::begin(&self.db_pool, OPERATION).await?;
        let outcome = self.apply(&txn, order_id, &update, &next, &lines).await?;
        db::commit(txn, OPERATION, started).await?;

        if outcome.claimed {
            counter!("uniform_ops.fulfillment.claimed", 1);
            info!(
                lines_applied = outcome.lines_applied,
                lines_missing_stock = outcome.lines_missing_stock,
                "Order fulfilled"
            );
        } else {
            info!("Order updated");
        }

        if let Some(sender) = &self.event_sender {
            for event in outcome.events {
                sender.send_or_log(event).await;
            }
        }

        load_order(&*self.db_pool, order_id).await
    }

    async fn apply(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
        update: &OrderUpdate,
        next: &OrderStatus,
        lines: &[OrderLineInput],
    ) -> Result<FulfillmentOutcome, ServiceError> {
        // Re-check under the transaction; another request may have claimed
        // the order while this one waited for locks.
        let current = OrderEntity::find_by_id(order_id)
            .one(txn)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to re-read order");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;
        stored_status(&current).check_transition(next)?;

        let now = Utc::now();
        let total_price = total_of(lines)?;

        let mut statement = OrderEntity::update_many()
            .col_expr(order::Column::Status, Expr::value(next.as_str()))
            .col_expr(order::Column::TotalPrice, Expr::value(total_price))
            .col_expr(order::Column::UpdatedAt, Expr::value(now));
        if let Some(value) = &update.student_number {
            statement = statement.col_expr(order::Column::StudentNumber, Expr::value(value.trim()));
        }
        if let Some(value) = &update.student_name {
            statement = statement.col_expr(order::Column::StudentName, Expr::value(value.trim()));
        }
        if let Some(value) = &update.contact_number {
            statement = statement.col_expr(order::Column::ContactNumber, Expr::value(value.trim()));
        }
        if let Some(value) = &update.gender {
            statement = statement.col_expr(order::Column::Gender, Expr::value(value.as_str()));
        }

        let result = statement
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.ne(order_status::CLAIMED))
            .exec(txn)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to update order row");
                ServiceError::DatabaseError(e)
            })?;

        if result.rows_affected == 0 {
            return Err(ServiceError::Conflict(
                "Order has already been claimed".to_string(),
            ));
        }

        let mut outcome = FulfillmentOutcome::default();
        if !next.is_claimed() {
            return Ok(outcome);
        }

        outcome.claimed = true;
        for line in lines {
            match inventory::apply_decrement(txn, &line.key, line.quantity, self.policy).await {
                Ok(entry) => {
                    outcome.lines_applied += 1;
                    if let Some(event) = inventory::depleted_event(&entry) {
                        outcome.events.push(event);
                    }
                }
                Err(e) if e.is_not_found() => {
                    outcome.lines_missing_stock += 1;
                    warn!(key = %line.key, quantity = line.quantity, "No stock entry for order line; skipping decrement");
                }
                Err(e) => return Err(e),
            }

            sales_reports::apply_record_revenue(txn, &line.key, line.total_price()?, now).await?;
        }

        outcome.events.push(Event::OrderClaimed {
            order_id,
            lines: lines.len(),
            total_price,
        });
        Ok(outcome)
    }
}

// Stored statuses were normalised on write; a blank one is kept as-is.
fn stored_status(order: &order::Model) -> OrderStatus {
    OrderStatus::parse(&order.status).unwrap_or_else(|_| OrderStatus::Other(order.status.clone()))
}
