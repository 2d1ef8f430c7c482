use crate::{
    auth::{self, PasswordPolicy},
    db::{self, DbPool},
    entities::{
        production::{self, Entity as ProductionEntity},
        user::{self, ActiveModel as UserActiveModel, Entity as UserEntity},
    },
    errors::ServiceError,
};
use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, SqlErr,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

pub const DEFAULT_ROLE: &str = "STAFF";
const INVALID_CREDENTIALS: &str = "Invalid email or password";

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub birth_date: Option<NaiveDate>,
    pub address: Option<String>,
    pub contact_number: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub address: Option<String>,
    pub contact_number: Option<String>,
    pub role: Option<String>,
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Maps a unique-index violation on insert/update to a 409.
pub(crate) fn map_write_error(e: sea_orm::DbErr, what: &str) -> ServiceError {
    if let Some(SqlErr::UniqueConstraintViolation(detail)) = e.sql_err() {
        warn!(detail = %detail, "{what} violates a unique constraint");
        return ServiceError::Conflict(format!("{what} already exists"));
    }
    error!(error = %e, "Failed to write {what}");
    ServiceError::DatabaseError(e)
}

#[derive(Clone)]
pub struct UserService {
    db_pool: Arc<DbPool>,
    password_policy: PasswordPolicy,
}

impl UserService {
    pub fn new(db_pool: Arc<DbPool>, password_policy: PasswordPolicy) -> Self {
        Self {
            db_pool,
            password_policy,
        }
    }

    async fn ensure_unique<C: ConnectionTrait>(
        conn: &C,
        email: &str,
        name: &str,
        exclude: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let mut query = UserEntity::find().filter(
            Condition::any()
                .add(user::Column::Email.eq(email))
                .add(user::Column::Name.eq(name)),
        );
        if let Some(id) = exclude {
            query = query.filter(user::Column::Id.ne(id));
        }

        let clash = query.one(conn).await.map_err(|e| {
            error!(error = %e, "Failed to check user uniqueness");
            ServiceError::DatabaseError(e)
        })?;

        match clash {
            Some(existing) if existing.email == email => Err(ServiceError::Conflict(format!(
                "A user with email {email} already exists"
            ))),
            Some(_) => Err(ServiceError::Conflict(format!(
                "A user named {name} already exists"
            ))),
            None => Ok(()),
        }
    }

    #[instrument(skip(self))]
    pub async fn list(&self, page: u64, limit: u64) -> Result<(Vec<user::Model>, u64), ServiceError> {
        let paginator = UserEntity::find()
            .order_by_asc(user::Column::Name)
            .paginate(&*self.db_pool, limit);
        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count users");
            ServiceError::DatabaseError(e)
        })?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await.map_err(|e| {
            error!(error = %e, page, limit, "Failed to fetch users page");
            ServiceError::DatabaseError(e)
        })?;
        Ok((items, total))
    }

    #[instrument(skip(self), fields(user_id = %id))]
    pub async fn get(&self, id: Uuid) -> Result<user::Model, ServiceError> {
        UserEntity::find_by_id(id)
            .one(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch user");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<user::Model>, ServiceError> {
        UserEntity::find()
            .filter(user::Column::Email.eq(normalize_email(email)))
            .one(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to look up user by email");
                ServiceError::DatabaseError(e)
            })
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn create(&self, request: NewUser) -> Result<user::Model, ServiceError> {
        self.password_policy.validate(&request.password)?;
        let email = normalize_email(&request.email);
        let name = request.name.trim().to_string();
        Self::ensure_unique(&*self.db_pool, &email, &name, None).await?;

        let password_hash = auth::hash_password(&request.password)?;
        let now = Utc::now();
        let created = UserActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            email: Set(email),
            password_hash: Set(password_hash),
            birth_date: Set(request.birth_date),
            address: Set(request.address),
            contact_number: Set(request.contact_number),
            role: Set(request
                .role
                .map(|r| r.trim().to_uppercase())
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| DEFAULT_ROLE.to_string())),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db_pool)
        .await
        .map_err(|e| map_write_error(e, "User"))?;

        info!(user_id = %created.id, "User created");
        Ok(created)
    }

    #[instrument(skip(self, changes), fields(user_id = %id))]
    pub async fn update(&self, id: Uuid, changes: UserChanges) -> Result<user::Model, ServiceError> {
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
        Self::ensure_unique(&*self.db_pool, &email, &name, Some(id)).await?;

        let mut active: UserActiveModel = current.into();
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
        if let Some(role) = changes.role {
            active.role = Set(role.trim().to_uppercase());
        }

        let updated = active
            .update(&*self.db_pool)
            .await
            .map_err(|e| map_write_error(e, "User"))?;
        info!("User updated");
        Ok(updated)
    }

    /// Deletes the user together with their production runs.
    #[instrument(skip(self), fields(user_id = %id))]
    pub async fn delete(&self, id: Uuid) -> Result<user::Model, ServiceError> {
        let started = Instant::now();
        let txn = db::begin(&self.db_pool, "user.delete").await?;
        let existing = UserEntity::find_by_id(id)
            .one(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch user for delete");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;

        let removed = ProductionEntity::delete_many()
            .filter(production::Column::UserId.eq(id))
            .exec(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to delete user's production runs");
                ServiceError::DatabaseError(e)
            })?;
        UserEntity::delete_by_id(id)
            .exec(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to delete user");
                ServiceError::DatabaseError(e)
            })?;
        db::commit(txn, "user.delete", started).await?;

        info!(productions_removed = removed.rows_affected, "User deleted");
        Ok(existing)
    }

    /// Verifies credentials. Unknown email and wrong password are indistinguishable.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn login(&self, email: &str, password: &str) -> Result<user::Model, ServiceError> {
        let Some(user) = self.find_by_email(email).await? else {
            warn!("Login attempt for unknown email");
            return Err(ServiceError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        };

        if !auth::verify_password(password, &user.password_hash)? {
            warn!(user_id = %user.id, "Login attempt with wrong password");
            return Err(ServiceError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }

        info!(user_id = %user.id, "User logged in");
        Ok(user)
    }
}
