use crate::{
    auth::{self, PasswordPolicy},
    db::DbPool,
    entities::admin::{self, ActiveModel as AdminActiveModel, Entity as AdminEntity},
    errors::ServiceError,
    services::users::{map_write_error, normalize_email},
};
use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewAdmin {
    pub name: String,
    pub email: String,
    pub password: String,
    pub birth_date: Option<NaiveDate>,
    pub address: Option<String>,
    pub contact_number: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AdminChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub address: Option<String>,
    pub contact_number: Option<String>,
}

#[derive(Clone)]
pub struct AdminService {
    db_pool: Arc<DbPool>,
    password_policy: PasswordPolicy,
}

impl AdminService {
    pub fn new(db_pool: Arc<DbPool>, password_policy: PasswordPolicy) -> Self {
        Self {
            db_pool,
            password_policy,
        }
    }

    async fn ensure_unique(&self, email: &str, name: &str, exclude: Option<Uuid>) -> Result<(), ServiceError> {
        let mut query = AdminEntity::find().filter(
            Condition::any()
                .add(admin::Column::Email.eq(email))
                .add(admin::Column::Name.eq(name)),
        );
        if let Some(id) = exclude {
            query = query.filter(admin::Column::Id.ne(id));
        }

        let clash = query.one(&*self.db_pool).await.map_err(|e| {
            error!(error = %e, "Failed to check admin uniqueness");
            ServiceError::DatabaseError(e)
        })?;

        if clash.is_some() {
            return Err(ServiceError::Conflict(
                "An admin with that email or name already exists".to_string(),
            ));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list(&self, page: u64, limit: u64) -> Result<(Vec<admin::Model>, u64), ServiceError> {
        let paginator = AdminEntity::find()
            .order_by_asc(admin::Column::Name)
            .paginate(&*self.db_pool, limit);
        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count admins");
            ServiceError::DatabaseError(e)
        })?;
        let items = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch admin page");
                ServiceError::DatabaseError(e)
            })?;
        Ok((items, total))
    }

    #[instrument(skip(self), fields(admin_id = %id))]
    pub async fn get(&self, id: Uuid) -> Result<admin::Model, ServiceError> {
        AdminEntity::find_by_id(id)
            .one(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch admin");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound("Admin not found".to_string()))
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn create(&self, request: NewAdmin) -> Result<admin::Model, ServiceError> {
        self.password_policy.validate(&request.password)?;
        let email = normalize_email(&request.email);
        let name = request.name.trim().to_string();
        self.ensure_unique(&email, &name, None).await?;

        let now = Utc::now();
        let created = AdminActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            email: Set(email),
            password_hash: Set(auth::hash_password(&request.password)?),
            birth_date: Set(request.birth_date),
            address: Set(request.address),
            contact_number: Set(request.contact_number),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db_pool)
        .await
        .map_err(|e| map_write_error(e, "Admin"))?;

        info!(admin_id = %created.id, "Admin created");
        Ok(created)
    }

    #[instrument(skip(self, changes), fields(admin_id = %id))]
    pub async fn update(&self, id: Uuid, changes: AdminChanges) -> Result<admin::Model, ServiceError> {
        let current = self.get(id).await?;
        let email = changes
            .email
            .as_deref()
            .map(normalize_email)
            .unwrap_or_else(|| current.email.clone());
        let name = changes
            .name
            .as_deref()
            .map(|n| n.trim().to_string())
            .unwrap_or_else(|| current.name.clone());
        self.ensure_unique(&email, &name, Some(id)).await?;

        let mut active: AdminActiveModel = current.into();
        active.email = Set(email);
        active.name = Set(name);
        if let Some(password) = changes.password.as_deref() {
            self.password_policy.validate(password)?;
            active.password_hash = Set(auth::hash_password(password)?);
        }
        if let Some(birth_date) = changes.birth_date {
            active.birth_date = Set(Some(birth_date));
        }
        if let Some(address) = changes.address {
            active.address = Set(Some(address));
        }
        if let Some(contact_number) = changes.contact_number {
            active.contact_number = Set(Some(contact_number));
        }

        let updated = active
            .update(&*self.db_pool)
            .await
            .map_err(|e| map_write_error(e, "Admin"))?;
        info!("Admin updated");
        Ok(updated)
    }
}
