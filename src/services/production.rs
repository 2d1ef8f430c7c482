//! Production runs and their completion into finished goods and stock.

use crate::{
    db::{self, DbPool},
    entities::{
        production::{self, ActiveModel as ProductionActiveModel, Entity as ProductionEntity},
        user::{self, Entity as UserEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        finished_products,
        inventory::{self, StockKey},
        key_locks::KeyedLocks,
        users::normalize_email,
    },
};
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::{Expr, Func, LikeExpr},
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Select,
    Set,
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum ProductionStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl ProductionStatus {
    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        ProductionStatus::from_str(raw.trim()).map_err(|_| {
            ServiceError::ValidationError(format!(
                "Unknown production status '{}'; expected PENDING, IN_PROGRESS, COMPLETED or CANCELLED",
                raw.trim()
            ))
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewProduction {
    /// Email of the user registering the run
    pub email: String,
    pub level: String,
    pub product_type: String,
    pub quantity: i32,
    pub size: Option<String>,
    pub status: Option<String>,
    pub production_start_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct ProductionChanges {
    pub level: Option<String>,
    pub product_type: Option<String>,
    pub quantity: Option<i32>,
    pub size: Option<String>,
    pub status: Option<String>,
    pub production_start_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductionWithUser {
    pub production: production::Model,
    pub user: Option<user::Model>,
}

impl From<(production::Model, Option<user::Model>)> for ProductionWithUser {
    fn from((production, user): (production::Model, Option<user::Model>)) -> Self {
        Self { production, user }
    }
}

fn key_of(production: &production::Model) -> StockKey {
    StockKey::new(&production.product_type, &production.level, production.size.as_deref())
}

fn ensure_positive(quantity: i32) -> Result<(), ServiceError> {
    if quantity <= 0 {
        return Err(ServiceError::ValidationError(
            "Production quantity must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

#[derive(Clone)]
pub struct ProductionService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    locks: Arc<KeyedLocks<StockKey>>,
}

impl ProductionService {
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

    async fn page(
        &self,
        query: Select<ProductionEntity>,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<ProductionWithUser>, u64), ServiceError> {
        let paginator = query
            .find_also_related(UserEntity)
            .order_by_desc(production::Column::ProductionStartTime)
            .paginate(&*self.db_pool, limit);

        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count production runs");
            ServiceError::DatabaseError(e)
        })?;
        let rows = paginator.fetch_page(page.saturating_sub(1)).await.map_err(|e| {
            error!(error = %e, page, limit, "Failed to fetch production runs");
            ServiceError::DatabaseError(e)
        })?;

        Ok((rows.into_iter().map(ProductionWithUser::from).collect(), total))
    }

    #[instrument(skip(self))]
    pub async fn list(&self, page: u64, limit: u64) -> Result<(Vec<ProductionWithUser>, u64), ServiceError> {
        self.page(ProductionEntity::find(), page, limit).await
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn list_by_user(
        &self,
        user_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<ProductionWithUser>, u64), ServiceError> {
        self.page(
            ProductionEntity::find().filter(production::Column::UserId.eq(user_id)),
            page,
            limit,
        )
        .await
    }

    /// Runs whose owner's name starts with `prefix`, ignoring case.
    #[instrument(skip(self))]
    pub async fn list_by_user_name(
        &self,
        prefix: &str,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<ProductionWithUser>, u64), ServiceError> {
        let escaped = prefix
            .trim()
            .to_lowercase()
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let pattern = LikeExpr::new(format!("{escaped}%")).escape('\\');

        let name_matches = Expr::expr(Func::lower(Expr::col((UserEntity, user::Column::Name))))
            .like(pattern);

        // find_also_related joins the user table, so the filter can reference it.
        self.page(ProductionEntity::find().filter(name_matches), page, limit)
            .await
    }

    #[instrument(skip(self), fields(production_id = %id))]
    pub async fn get(&self, id: Uuid) -> Result<ProductionWithUser, ServiceError> {
        ProductionEntity::find_by_id(id)
            .find_also_related(UserEntity)
            .one(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch production run");
                ServiceError::DatabaseError(e)
            })?
            .map(ProductionWithUser::from)
            .ok_or_else(|| ServiceError::NotFound("Production not found".to_string()))
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn create(&self, request: NewProduction) -> Result<ProductionWithUser, ServiceError> {
        ensure_positive(request.quantity)?;
        let status = match request.status.as_deref() {
            Some(raw) => ProductionStatus::parse(raw)?,
            None => ProductionStatus::Pending,
        };
        if status == ProductionStatus::Completed {
            return Err(ServiceError::InvalidStatus(
                "A production run cannot be created as COMPLETED; complete it with an update"
                    .to_string(),
            ));
        }

        let owner = UserEntity::find()
            .filter(user::Column::Email.eq(normalize_email(&request.email)))
            .one(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to look up production owner");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;

        let key = StockKey::new(&request.product_type, &request.level, request.size.as_deref());
        if key.product_type.is_empty() || key.level.is_empty() {
            return Err(ServiceError::ValidationError(
                "Production runs need a product type and level".to_string(),
            ));
        }

        let now = Utc::now();
        let created = ProductionActiveModel {
            id: Set(Uuid::new_v4()),
            level: Set(key.level),
            product_type: Set(key.product_type),
            quantity: Set(request.quantity),
            size: Set(key.size),
            status: Set(status.to_string()),
            production_start_time: Set(request.production_start_time.unwrap_or(now)),
            production_end_time: Set(None),
            user_id: Set(owner.id),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db_pool)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to create production run");
            ServiceError::DatabaseError(e)
        })?;

        info!(production_id = %created.id, user_id = %owner.id, "Production run created");
        Ok(ProductionWithUser {
            production: created,
            user: Some(owner),
        })
    }

    /// Applies changes to a run. Moving it to COMPLETED adds its quantity to
    /// finished products and the stock ledger in the same transaction.
    #[instrument(skip(self, changes), fields(production_id = %id))]
    pub async fn update(
        &self,
        id: Uuid,
        changes: ProductionChanges,
    ) -> Result<ProductionWithUser, ServiceError> {
        let current = self.get(id).await?.production;
        let current_status = ProductionStatus::parse(&current.status)?;
        if current_status == ProductionStatus::Completed {
            return Err(ServiceError::Conflict(
                "Production run is already completed".to_string(),
            ));
        }

        let next_status = match changes.status.as_deref() {
            Some(raw) => ProductionStatus::parse(raw)?,
            None => current_status,
        };
        let quantity = changes.quantity.unwrap_or(current.quantity);
        ensure_positive(quantity)?;

        let key = StockKey::new(
            changes.product_type.as_deref().unwrap_or(&current.product_type),
            changes.level.as_deref().unwrap_or(&current.level),
            changes.size.as_deref().or(current.size.as_deref()),
        );
        if key.product_type.is_empty() || key.level.is_empty() {
            return Err(ServiceError::ValidationError(
                "Production runs need a product type and level".to_string(),
            ));
        }
        let start_time = changes
            .production_start_time
            .unwrap_or(current.production_start_time);

        let completing = next_status == ProductionStatus::Completed;
        let _guard = if completing {
            Some(self.locks.lock(&key).await)
        } else {
            None
        };

        let now = Utc::now();
        let end_time = completing.then_some(now);
        let started = Instant::now();
        let txn = db::begin(&self.db_pool, "production.update").await?;

        let result = ProductionEntity::update_many()
            .col_expr(production::Column::Level, Expr::value(key.level.as_str()))
            .col_expr(production::Column::ProductType, Expr::value(key.product_type.as_str()))
            .col_expr(production::Column::Size, Expr::value(key.size.clone()))
            .col_expr(production::Column::Quantity, Expr::value(quantity))
            .col_expr(production::Column::Status, Expr::value(next_status.to_string()))
            .col_expr(production::Column::ProductionStartTime, Expr::value(start_time))
            .col_expr(production::Column::ProductionEndTime, Expr::value(end_time))
            .col_expr(production::Column::UpdatedAt, Expr::value(now))
            .filter(production::Column::Id.eq(id))
            .filter(production::Column::Status.ne(ProductionStatus::Completed.to_string()))
            .exec(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to update production run");
                ServiceError::DatabaseError(e)
            })?;

        if result.rows_affected == 0 {
            warn!("Production run was completed or removed concurrently");
            return Err(ServiceError::Conflict(
                "Production run is already completed".to_string(),
            ));
        }

        let mut stock_entry = None;
        if completing {
            finished_products::apply_accumulate(&txn, &key, quantity, id).await?;
            stock_entry = Some(inventory::apply_increment(&txn, &key, quantity).await?);
        }

        db::commit(txn, "production.update", started).await?;

        if let Some(entry) = stock_entry {
            info!(key = %key, quantity, stock = entry.quantity, "Production run completed");
            if let Some(sender) = &self.event_sender {
                sender
                    .send_or_log(Event::ProductionCompleted {
                        production_id: id,
                        quantity,
                        completed_at: now,
                    })
                    .await;
                sender
                    .send_or_log(Event::StockReplenished {
                        inventory_id: entry.id,
                        quantity: entry.quantity,
                    })
                    .await;
            }
        } else {
            info!(status = %next_status, "Production run updated");
        }

        self.get(id).await
    }

    #[instrument(skip(self), fields(production_id = %id))]
    pub async fn delete(&self, id: Uuid) -> Result<production::Model, ServiceError> {
        let existing = self.get(id).await?.production;
        ProductionEntity::delete_by_id(id)
            .exec(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to delete production run");
                ServiceError::DatabaseError(e)
            })?;
        info!("Production run deleted");
        Ok(existing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::PasswordPolicy;
    use crate::services::{
        finished_products::FinishedProductService,
        inventory::{InventoryService, StockPolicy},
        test_support::memory_db,
        users::{NewUser, UserService},
    };
    use assert_matches::assert_matches;
    use rstest::rstest;

    struct Fixture {
        productions: ProductionService,
        users: UserService,
        inventory: InventoryService,
        finished: FinishedProductService,
    }

    async fn fixture() -> Fixture {
        let db = memory_db().await;
        let locks = Arc::new(KeyedLocks::new());
        let users = UserService::new(db.clone(), PasswordPolicy::default());
        users
            .create(NewUser {
                name: "Maria Santos".into(),
                email: "maria@example.com".into(),
                password: "sewing-room-3".into(),
                birth_date: None,
                address: None,
                contact_number: None,
                role: None,
            })
            .await
            .unwrap();
        Fixture {
            productions: ProductionService::new(db.clone(), None, locks.clone()),
            inventory: InventoryService::new(db.clone(), None, locks, StockPolicy::Reject),
            finished: FinishedProductService::new(db),
            users,
        }
    }

    fn polo_run(quantity: i32) -> NewProduction {
        NewProduction {
            email: "maria@example.com".into(),
            level: "Grade7".into(),
            product_type: "Polo".into(),
            quantity,
            size: Some("M".into()),
            status: None,
            production_start_time: None,
        }
    }

    fn complete() -> ProductionChanges {
        ProductionChanges {
            status: Some("completed".into()),
            ..Default::default()
        }
    }

    #[rstest]
    #[case("pending", ProductionStatus::Pending)]
    #[case(" IN_PROGRESS ", ProductionStatus::InProgress)]
    #[case("Completed", ProductionStatus::Completed)]
    fn status_parsing(#[case] raw: &str, #[case] expected: ProductionStatus) {
        assert_eq!(ProductionStatus::parse(raw).unwrap(), expected);
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert_matches!(
            ProductionStatus::parse("DONE"),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[tokio::test]
    async fn create_requires_known_user() {
        let fx = fixture().await;
        let mut request = polo_run(10);
        request.email = "ghost@example.com".into();
        let err = fx.productions.create(request).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn create_as_completed_is_rejected() {
        let fx = fixture().await;
        let mut request = polo_run(10);
        request.status = Some("COMPLETED".into());
        assert_matches!(
            fx.productions.create(request).await,
            Err(ServiceError::InvalidStatus(_))
        );
    }

    #[tokio::test]
    async fn completion_moves_quantity_into_stock_once() {
        let fx = fixture().await;
        let run = fx.productions.create(polo_run(10)).await.unwrap();
        assert_eq!(run.user.as_ref().unwrap().name, "Maria Santos");

        let done = fx
            .productions
            .update(run.production.id, complete())
            .await
            .unwrap();
        assert_eq!(done.production.status, "COMPLETED");
        assert!(done.production.production_end_time.is_some());

        let key = StockKey::new("Polo", "Grade7", Some("M"));
        let stock = fx.inventory.find(&key).await.unwrap().unwrap();
        assert_eq!(stock.quantity, 10);
        assert_eq!(stock.status, "IN_STOCK");

        let (finished, _) = fx.finished.list(1, 10).await.unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].quantity, 10);

        assert_matches!(
            fx.productions.update(run.production.id, complete()).await,
            Err(ServiceError::Conflict(_))
        );
        assert_eq!(fx.inventory.find(&key).await.unwrap().unwrap().quantity, 10);
    }

    #[tokio::test]
    async fn two_completions_accumulate_finished_goods() {
        let fx = fixture().await;
        let a = fx.productions.create(polo_run(4)).await.unwrap();
        let b = fx.productions.create(polo_run(6)).await.unwrap();
        fx.productions.update(a.production.id, complete()).await.unwrap();
        fx.productions.update(b.production.id, complete()).await.unwrap();

        let (finished, total) = fx.finished.list(1, 10).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(finished[0].quantity, 10);
        assert_eq!(finished[0].production_id, Some(b.production.id));
    }

    #[tokio::test]
    async fn non_completing_update_clears_end_time() {
        let fx = fixture().await;
        let run = fx.productions.create(polo_run(3)).await.unwrap();
        let updated = fx
            .productions
            .update(
                run.production.id,
                ProductionChanges {
                    status: Some("in_progress".into()),
                    quantity: Some(5),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.production.status, "IN_PROGRESS");
        assert_eq!(updated.production.quantity, 5);
        assert!(updated.production.production_end_time.is_none());
        assert!(fx
            .inventory
            .find(&StockKey::new("Polo", "Grade7", Some("M")))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn lookup_by_user_and_name_prefix() {
        let fx = fixture().await;
        fx.productions.create(polo_run(3)).await.unwrap();
        let owner = fx.users.find_by_email("maria@example.com").await.unwrap().unwrap();

        let (by_user, total) = fx.productions.list_by_user(owner.id, 1, 10).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(by_user.len(), 1);

        let (by_name, _) = fx.productions.list_by_user_name("mAR", 1, 10).await.unwrap();
        assert_eq!(by_name.len(), 1);
        let (none, _) = fx.productions.list_by_user_name("santos", 1, 10).await.unwrap();
        assert!(none.is_empty());
        let (wildcard, _) = fx.productions.list_by_user_name("%", 1, 10).await.unwrap();
        assert!(wildcard.is_empty());
    }

    #[tokio::test]
    async fn deleting_user_removes_their_runs() {
        let fx = fixture().await;
        let run = fx.productions.create(polo_run(3)).await.unwrap();
        let owner = run.user.unwrap();
        fx.users.delete(owner.id).await.unwrap();
        assert!(fx
            .productions
            .get(run.production.id)
            .await
            .unwrap_err()
            .is_not_found());
    }
}
