use crate::{
    db::DbPool,
    entities::finished_product::{
        self, ActiveModel as FinishedProductActiveModel, Entity as FinishedProductEntity,
    },
    errors::ServiceError,
    services::inventory::StockKey,
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use tracing::{error, instrument};
use uuid::Uuid;

/// Adds `quantity` to the finished-product row for `key`, creating it if
/// needed. The caller holds the key lock.
pub(crate) async fn apply_accumulate<C: ConnectionTrait>(
    conn: &C,
    key: &StockKey,
    quantity: i32,
    production_id: Uuid,
) -> Result<finished_product::Model, ServiceError> {
    let existing = FinishedProductEntity::find()
        .filter(key.condition(
            finished_product::Column::ProductType,
            finished_product::Column::Level,
            finished_product::Column::Size,
        ))
        .order_by_asc(finished_product::Column::CreatedAt)
        .one(conn)
        .await
        .map_err(|e| {
            error!(error = %e, key = %key, "Failed to look up finished product");
            ServiceError::DatabaseError(e)
        })?;

    let now = Utc::now();
    match existing {
        Some(current) => {
            let total = current.quantity.checked_add(quantity).ok_or_else(|| {
                ServiceError::ValidationError(format!("Finished quantity for {key} would overflow"))
            })?;
            let result = FinishedProductEntity::update_many()
                .col_expr(finished_product::Column::Quantity, Expr::value(total))
                .col_expr(finished_product::Column::ProductionId, Expr::value(production_id))
                .col_expr(finished_product::Column::UpdatedAt, Expr::value(now))
                .filter(finished_product::Column::Id.eq(current.id))
                .filter(finished_product::Column::Quantity.eq(current.quantity))
                .exec(conn)
                .await
                .map_err(|e| {
                    error!(error = %e, "Failed to update finished product");
                    ServiceError::DatabaseError(e)
                })?;
            if result.rows_affected == 0 {
                return Err(ServiceError::ConcurrencyConflict(format!(
                    "Finished product {} was modified concurrently",
                    current.id
                )));
            }
            Ok(finished_product::Model {
                quantity: total,
                production_id: Some(production_id),
                updated_at: now,
                ..current
            })
        }
        None => FinishedProductActiveModel {
            id: Set(Uuid::new_v4()),
            level: Set(key.level.clone()),
            product_type: Set(key.product_type.clone()),
            quantity: Set(quantity),
            size: Set(key.size.clone()),
            production_id: Set(Some(production_id)),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(conn)
        .await
        .map_err(|e| {
            error!(error = %e, key = %key, "Failed to create finished product");
            ServiceError::DatabaseError(e)
        }),
    }
}

/// Read access to finished goods; rows are written by production completion.
#[derive(Clone)]
pub struct FinishedProductService {
    db_pool: Arc<DbPool>,
}

impl FinishedProductService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<finished_product::Model>, u64), ServiceError> {
        let paginator = FinishedProductEntity::find()
            .order_by_asc(finished_product::Column::ProductType)
            .order_by_asc(finished_product::Column::Level)
            .paginate(&*self.db_pool, limit);
        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count finished products");
            ServiceError::DatabaseError(e)
        })?;
        let items = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch finished product page");
                ServiceError::DatabaseError(e)
            })?;
        Ok((items, total))
    }

    #[instrument(skip(self), fields(finished_product_id = %id))]
    pub async fn get(&self, id: Uuid) -> Result<finished_product::Model, ServiceError> {
        FinishedProductEntity::find_by_id(id)
            .one(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch finished product");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("Finished product {id} not found")))
    }
}
