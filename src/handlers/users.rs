use super::common::{created_response, page_response, trimmed, validate_input};
use crate::{
    entities::user,
    errors::ServiceError,
    services::users::{NewUser, UserChanges},
    ApiResponse, ApiResult, AppState, ListQuery,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[validate(length(min = 1, message = "Name is required"))]
    #[schema(example = "Maria Santos")]
    pub name: String,

    #[validate(email(message = "Email must be a valid address"))]
    #[schema(example = "maria@example.com")]
    pub email: String,

    /// Plain-text password; hashed before storage. `passwordHash` is accepted
    /// for older clients.
    #[serde(alias = "passwordHash")]
    pub password: String,

    pub birth_date: Option<NaiveDate>,
    pub address: Option<String>,
    pub contact_number: Option<String>,
    /// Defaults to STAFF
    pub role: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, message = "Name must not be empty"))]
    pub name: Option<String>,
    #[validate(email(message = "Email must be a valid address"))]
    pub email: Option<String>,
    #[serde(alias = "passwordHash")]
    pub password: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub address: Option<String>,
    pub contact_number: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(length(min = 1))]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub birth_date: Option<NaiveDate>,
    pub address: Option<String>,
    pub contact_number: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<user::Model> for UserResponse {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            email: model.email,
            birth_date: model.birth_date,
            address: model.address,
            contact_number: model.contact_number,
            role: model.role,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/login", post(login))
        .route("/:id", get(get_user).put(update_user).delete(delete_user))
}

/// List users
#[utoipa::path(
    get,
    path = "/api/user",
    params(ListQuery),
    responses(
        (status = 200, description = "Page of users"),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "users"
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, limit) = state.page_params(&query);
    let (users, total) = state.services.users.list(page, limit).await?;
    Ok(page_response::<_, UserResponse>(users, total, page, limit))
}

/// Get a user by ID
#[utoipa::path(
    get,
    path = "/api/user/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User found"),
        (status = 404, description = "User not found", body = crate::errors::ErrorResponse)
    ),
    tag = "users"
)]
pub async fn get_user(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<UserResponse> {
    let user = state.services.users.get(id).await?;
    Ok(Json(ApiResponse::success(user.into())))
}

/// Register a user
#[utoipa::path(
    post,
    path = "/api/user",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created"),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 409, description = "Email or name already taken", body = crate::errors::ErrorResponse)
    ),
    tag = "users"
)]
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let user = state
        .services
        .users
        .create(NewUser {
            name: payload.name,
            email: payload.email,
            password: payload.password,
            birth_date: payload.birth_date,
            address: trimmed(payload.address),
            contact_number: trimmed(payload.contact_number),
            role: trimmed(payload.role),
        })
        .await?;

    info!(user_id = %user.id, "User registered");
    Ok(created_response(UserResponse::from(user)))
}

/// Update a user
#[utoipa::path(
    put,
    path = "/api/user/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated"),
        (status = 404, description = "User not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Email or name already taken", body = crate::errors::ErrorResponse)
    ),
    tag = "users"
)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> ApiResult<UserResponse> {
    validate_input(&payload)?;

    let user = state
        .services
        .users
        .update(
            id,
            UserChanges {
                name: payload.name,
                email: payload.email,
                password: payload.password,
                birth_date: payload.birth_date,
                address: payload.address,
                contact_number: payload.contact_number,
                role: payload.role,
            },
        )
        .await?;
    Ok(Json(ApiResponse::success(user.into())))
}

/// Delete a user and their production runs
#[utoipa::path(
    delete,
    path = "/api/user/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User deleted"),
        (status = 404, description = "User not found", body = crate::errors::ErrorResponse)
    ),
    tag = "users"
)]
pub async fn delete_user(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<UserResponse> {
    let user = state.services.users.delete(id).await?;
    Ok(Json(ApiResponse::with_message(user.into(), "User deleted")))
}

/// Check a user's credentials
#[utoipa::path(
    post,
    path = "/api/user/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Credentials accepted"),
        (status = 401, description = "Invalid email or password", body = crate::errors::ErrorResponse)
    ),
    tag = "users"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<UserResponse> {
    validate_input(&payload)?;
    let user = state
        .services
        .users
        .login(&payload.email, &payload.password)
        .await?;
    Ok(Json(ApiResponse::with_message(user.into(), "Login successful")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_password_field_is_accepted() {
        let payload: CreateUserRequest = serde_json::from_value(serde_json::json!({
            "name": "Maria",
            "email": "maria@example.com",
            "passwordHash": "sewing-room-3"
        }))
        .unwrap();
        assert_eq!(payload.password, "sewing-room-3");
    }

    #[test]
    fn invalid_email_fails_validation() {
        let payload = CreateUserRequest {
            name: "Maria".into(),
            email: "not-an-email".into(),
            password: "sewing-room-3".into(),
            birth_date: None,
            address: None,
            contact_number: None,
            role: None,
        };
        assert!(validate_input(&payload).is_err());
    }
}
