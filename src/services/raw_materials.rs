use crate::{
    db::DbPool,
    entities::raw_material::{self, ActiveModel as RawMaterialActiveModel, Entity as RawMaterialEntity},
    errors::ServiceError,
    services::{inventory::StockStatus, users::map_write_error},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMaterialInput {
    pub raw_material_type: String,
    pub quantity: i32,
    pub unit: Option<String>,
}

impl RawMaterialInput {
    fn normalized(self) -> Result<Self, ServiceError> {
        let raw_material_type = self.raw_material_type.trim().to_string();
        if raw_material_type.is_empty() {
            return Err(ServiceError::ValidationError(
                "Raw material type must not be empty".to_string(),
            ));
        }
        if self.quantity < 0 {
            return Err(ServiceError::ValidationError(
                "Raw material quantity cannot be negative".to_string(),
            ));
        }
        Ok(Self {
            raw_material_type,
            quantity: self.quantity,
            unit: self
                .unit
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty()),
        })
    }
}

/// Raw material stock, one row per material type.
#[derive(Clone)]
pub struct RawMaterialService {
    db_pool: Arc<DbPool>,
}

impl RawMaterialService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<raw_material::Model>, u64), ServiceError> {
        let paginator = RawMaterialEntity::find()
            .order_by_asc(raw_material::Column::RawMaterialType)
            .paginate(&*self.db_pool, limit);
        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count raw materials");
            ServiceError::DatabaseError(e)
        })?;
        let items = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch raw material page");
                ServiceError::DatabaseError(e)
            })?;
        Ok((items, total))
    }

    #[instrument(skip(self), fields(raw_material_id = %id))]
    pub async fn get(&self, id: Uuid) -> Result<raw_material::Model, ServiceError> {
        RawMaterialEntity::find_by_id(id)
            .one(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch raw material");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("Raw material {id} not found")))
    }

    async fn find_by_type(&self, raw_material_type: &str) -> Result<Option<raw_material::Model>, ServiceError> {
        RawMaterialEntity::find()
            .filter(raw_material::Column::RawMaterialType.eq(raw_material_type))
            .one(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to look up raw material by type");
                ServiceError::DatabaseError(e)
            })
    }

    /// Records the current quantity for a material type. Returns the row and
    /// whether it was newly created.
    #[instrument(skip(self, input), fields(raw_material_type = %input.raw_material_type))]
    pub async fn upsert(
        &self,
        input: RawMaterialInput,
    ) -> Result<(raw_material::Model, bool), ServiceError> {
        let input = input.normalized()?;
        let status = StockStatus::from_quantity(input.quantity).to_string();

        match self.find_by_type(&input.raw_material_type).await? {
            Some(existing) => {
                let mut active = existing.into_active_model();
                active.quantity = Set(input.quantity);
                if input.unit.is_some() {
                    active.unit = Set(input.unit);
                }
                active.status = Set(status);
                let updated = active
                    .update(&*self.db_pool)
                    .await
                    .map_err(|e| map_write_error(e, "raw material"))?;
                info!(raw_material_id = %updated.id, quantity = updated.quantity, "Raw material restated");
                Ok((updated, false))
            }
            None => {
                let now = Utc::now();
                let created = RawMaterialActiveModel {
                    id: Set(Uuid::new_v4()),
                    raw_material_type: Set(input.raw_material_type),
                    quantity: Set(input.quantity),
                    unit: Set(input.unit),
                    status: Set(status),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&*self.db_pool)
                .await
                .map_err(|e| map_write_error(e, "raw material"))?;
                info!(raw_material_id = %created.id, "Raw material recorded");
                Ok((created, true))
            }
        }
    }

    #[instrument(skip(self, input), fields(raw_material_id = %id))]
    pub async fn update(
        &self,
        id: Uuid,
        input: RawMaterialInput,
    ) -> Result<raw_material::Model, ServiceError> {
        let input = input.normalized()?;
        let existing = self.get(id).await?;

        if let Some(other) = self.find_by_type(&input.raw_material_type).await? {
            if other.id != id {
                return Err(ServiceError::Conflict(format!(
                    "Raw material {} already exists",
                    input.raw_material_type
                )));
            }
        }

        let status = StockStatus::from_quantity(input.quantity).to_string();
        let mut active = existing.into_active_model();
        active.raw_material_type = Set(input.raw_material_type);
        active.quantity = Set(input.quantity);
        active.unit = Set(input.unit);
        active.status = Set(status);
        active
            .update(&*self.db_pool)
            .await
            .map_err(|e| map_write_error(e, "raw material"))
    }

    #[instrument(skip(self), fields(raw_material_id = %id))]
    pub async fn delete(&self, id: Uuid) -> Result<raw_material::Model, ServiceError> {
        let existing = self.get(id).await?;
        RawMaterialEntity::delete_by_id(id)
            .exec(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to delete raw material");
                ServiceError::DatabaseError(e)
            })?;
        info!("Raw material deleted");
        Ok(existing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::memory_db;
    use assert_matches::assert_matches;

    fn input(kind: &str, quantity: i32) -> RawMaterialInput {
        RawMaterialInput {
            raw_material_type: kind.to_string(),
            quantity,
            unit: Some("meters".to_string()),
        }
    }

    #[tokio::test]
    async fn upsert_creates_then_restates() {
        let service = RawMaterialService::new(memory_db().await);

        let (created, was_created) = service.upsert(input(" Cotton ", 40)).await.unwrap();
        assert!(was_created);
        assert_eq!(created.raw_material_type, "Cotton");
        assert_eq!(created.status, "IN_STOCK");

        let (updated, was_created) = service.upsert(input("Cotton", 0)).await.unwrap();
        assert!(!was_created);
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.quantity, 0);
        assert_eq!(updated.status, "OUT_OF_STOCK");

        let (_, total) = service.list(1, 10).await.unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn update_rejects_type_collision() {
        let service = RawMaterialService::new(memory_db().await);
        service.upsert(input("Cotton", 5)).await.unwrap();
        let (thread, _) = service.upsert(input("Thread", 5)).await.unwrap();

        assert_matches!(
            service.update(thread.id, input("Cotton", 1)).await,
            Err(ServiceError::Conflict(_))
        );
        let renamed = service.update(thread.id, input("Buttons", 0)).await.unwrap();
        assert_eq!(renamed.raw_material_type, "Buttons");
        assert_eq!(renamed.status, "OUT_OF_STOCK");
    }

    #[tokio::test]
    async fn negative_quantity_is_rejected() {
        let service = RawMaterialService::new(memory_db().await);
        assert_matches!(
            service.upsert(input("Cotton", -1)).await,
            Err(ServiceError::ValidationError(_))
        );
    }

    #[tokio::test]
    async fn delete_missing_row_is_not_found() {
        let service = RawMaterialService::new(memory_db().await);
        assert!(service.delete(Uuid::new_v4()).await.unwrap_err().is_not_found());
    }
}
