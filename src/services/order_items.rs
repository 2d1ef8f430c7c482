use crate::{
    db::DbPool,
    entities::{
        order::Entity as OrderEntity,
        order_item::{self, Entity as OrderItemEntity},
    },
    errors::ServiceError,
};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder};
use std::sync::Arc;
use tracing::{error, instrument};
use uuid::Uuid;

/// Read-only access to order lines. Lines are written with their order.
#[derive(Clone)]
pub struct OrderItemService {
    db_pool: Arc<DbPool>,
}

impl OrderItemService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<order_item::Model>, u64), ServiceError> {
        let paginator = OrderItemEntity::find()
            .order_by_desc(order_item::Column::CreatedAt)
            .paginate(&*self.db_pool, limit);
        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count order items");
            ServiceError::DatabaseError(e)
        })?;
        let items = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch order item page");
                ServiceError::DatabaseError(e)
            })?;
        Ok((items, total))
    }

    #[instrument(skip(self), fields(order_item_id = %id))]
    pub async fn get(&self, id: Uuid) -> Result<order_item::Model, ServiceError> {
        OrderItemEntity::find_by_id(id)
            .one(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch order item");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("Order item {id} not found")))
    }

    /// All lines of one order; `NotFound` when the order itself is missing.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn by_order(&self, order_id: Uuid) -> Result<Vec<order_item::Model>, ServiceError> {
        let db = &*self.db_pool;
        if OrderEntity::find_by_id(order_id)
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch order");
                ServiceError::DatabaseError(e)
            })?
            .is_none()
        {
            return Err(ServiceError::NotFound(format!("Order {order_id} not found")));
        }

        OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch order lines");
                ServiceError::DatabaseError(e)
            })
    }
}
