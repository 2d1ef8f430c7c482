use super::common::{created_response, page_response, trimmed, validate_input};
use crate::{
    entities::admin,
    errors::ServiceError,
    services::admins::{AdminChanges, NewAdmin},
    ApiResponse, ApiResult, AppState, ListQuery,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateAdminRequest {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Email must be a valid address"))]
    pub email: String,
    #[serde(alias = "passwordHash")]
    pub password: String,
    pub birth_date: Option<NaiveDate>,
    pub address: Option<String>,
    pub contact_number: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAdminRequest {
    #[validate(length(min = 1, message = "Name must not be empty"))]
    pub name: Option<String>,
    #[validate(email(message = "Email must be a valid address"))]
    pub email: Option<String>,
    #[serde(alias = "passwordHash")]
    pub password: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub address: Option<String>,
    pub contact_number: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub birth_date: Option<NaiveDate>,
    pub address: Option<String>,
    pub contact_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<admin::Model> for AdminResponse {
    fn from(model: admin::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            email: model.email,
            birth_date: model.birth_date,
            address: model.address,
            contact_number: model.contact_number,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_admins).post(create_admin))
        .route("/:id", get(get_admin).put(update_admin))
}

#[utoipa::path(
    get,
    path = "/api/admin",
    params(ListQuery),
    responses((status = 200, description = "Page of admins")),
    tag = "admins"
)]
pub async fn list_admins(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, limit) = state.page_params(&query);
    let (admins, total) = state.services.admins.list(page, limit).await?;
    Ok(page_response::<_, AdminResponse>(admins, total, page, limit))
}

#[utoipa::path(
    get,
    path = "/api/admin/{id}",
    params(("id" = Uuid, Path, description = "Admin ID")),
    responses(
        (status = 200, description = "Admin found"),
        (status = 404, description = "Admin not found", body = crate::errors::ErrorResponse)
    ),
    tag = "admins"
)]
pub async fn get_admin(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<AdminResponse> {
    let admin = state.services.admins.get(id).await?;
    Ok(Json(ApiResponse::success(admin.into())))
}

#[utoipa::path(
    post,
    path = "/api/admin",
    request_body = CreateAdminRequest,
    responses(
        (status = 201, description = "Admin created"),
        (status = 409, description = "Email or name already taken", body = crate::errors::ErrorResponse)
    ),
    tag = "admins"
)]
pub async fn create_admin(
    State(state): State<AppState>,
    Json(payload): Json<CreateAdminRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let admin = state
        .services
        .admins
        .create(NewAdmin {
            name: payload.name,
            email: payload.email,
            password: payload.password,
            birth_date: payload.birth_date,
            address: trimmed(payload.address),
            contact_number: trimmed(payload.contact_number),
        })
        .await?;
    Ok(created_response(AdminResponse::from(admin)))
}

#[utoipa::path(
    put,
    path = "/api/admin/{id}",
    params(("id" = Uuid, Path, description = "Admin ID")),
    request_body = UpdateAdminRequest,
    responses(
        (status = 200, description = "Admin updated"),
        (status = 404, description = "Admin not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Email or name already taken", body = crate::errors::ErrorResponse)
    ),
    tag = "admins"
)]
pub async fn update_admin(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAdminRequest>,
) -> ApiResult<AdminResponse> {
    validate_input(&payload)?;
    let admin = state
        .services
        .admins
        .update(
            id,
            AdminChanges {
                name: payload.name,
                email: payload.email,
                password: payload.password,
                birth_date: payload.birth_date,
                address: payload.address,
                contact_number: payload.contact_number,
            },
        )
        .await?;
    Ok(Json(ApiResponse::success(admin.into())))
}
