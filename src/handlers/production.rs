use super::common::{created_response, success_response, trimmed, validate_input};
use crate::{
    errors::ServiceError,
    services::production::{NewProduction, ProductionChanges, ProductionWithUser},
    ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductionRequest {
    /// Email of the registering user
    #[validate(email(message = "Email must be a valid address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Level is required"))]
    #[schema(example = "Grade7")]
    pub level: String,
    #[validate(length(min = 1, message = "Product type is required"))]
    #[schema(example = "Polo")]
    pub product_type: String,
    #[validate(range(min = 1, message = "Quantity must be greater than zero"))]
    pub quantity: i32,
    pub size: Option<String>,
    /// PENDING, IN_PROGRESS or CANCELLED
    pub status: Option<String>,
    pub production_start_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductionRequest {
    #[validate(length(min = 1))]
    pub level: Option<String>,
    #[validate(length(min = 1))]
    pub product_type: Option<String>,
    #[validate(range(min = 1, message = "Quantity must be greater than zero"))]
    pub quantity: Option<i32>,
    pub size: Option<String>,
    /// Moving to COMPLETED adds the run to finished products and stock
    pub status: Option<String>,
    pub production_start_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductionOwner {
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductionResponse {
    pub id: Uuid,
    pub level: String,
    pub product_type: String,
    pub quantity: i32,
    pub size: Option<String>,
    pub status: String,
    pub production_start_time: DateTime<Utc>,
    pub production_end_time: Option<DateTime<Utc>>,
    pub user_id: Uuid,
    pub user: Option<ProductionOwner>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProductionWithUser> for ProductionResponse {
    fn from(ProductionWithUser { production, user }: ProductionWithUser) -> Self {
        Self {
            id: production.id,
            level: production.level,
            product_type: production.product_type,
            quantity: production.quantity,
            size: production.size,
            status: production.status,
            production_start_time: production.production_start_time,
            production_end_time: production.production_end_time,
            user_id: production.user_id,
            user: user.map(|u| ProductionOwner {
                id: u.id,
                email: u.email,
                name: u.name,
            }),
            created_at: production.created_at,
            updated_at: production.updated_at,
        }
    }
}

fn page_of(rows: Vec<ProductionWithUser>, total: u64, page: u64, limit: u64) -> impl IntoResponse {
    let items = rows.into_iter().map(ProductionResponse::from).collect();
    success_response(PaginatedResponse::new(items, total, page, limit))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_productions).post(create_production))
        .route(
            "/:id",
            get(get_production)
                .put(update_production)
                .delete(delete_production),
        )
        .route("/user/:user_id", get(list_productions_by_user))
        .route("/name/:name", get(list_productions_by_user_name))
}

#[utoipa::path(
    get,
    path = "/api/production",
    params(ListQuery),
    responses((status = 200, description = "Page of production runs")),
    tag = "production"
)]
pub async fn list_productions(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, limit) = state.page_params(&query);
    let (rows, total) = state.services.productions.list(page, limit).await?;
    Ok(page_of(rows, total, page, limit))
}

#[utoipa::path(
    get,
    path = "/api/production/{id}",
    params(("id" = Uuid, Path, description = "Production run ID")),
    responses(
        (status = 200, description = "Production run found"),
        (status = 404, description = "Production run not found", body = crate::errors::ErrorResponse)
    ),
    tag = "production"
)]
pub async fn get_production(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ProductionResponse> {
    let row = state.services.productions.get(id).await?;
    Ok(Json(ApiResponse::success(row.into())))
}

#[utoipa::path(
    post,
    path = "/api/production",
    request_body = CreateProductionRequest,
    responses(
        (status = 201, description = "Production run registered"),
        (status = 400, description = "Invalid request or status", body = crate::errors::ErrorResponse),
        (status = 404, description = "User not found", body = crate::errors::ErrorResponse)
    ),
    tag = "production"
)]
pub async fn create_production(
    State(state): State<AppState>,
    Json(payload): Json<CreateProductionRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let row = state
        .services
        .productions
        .create(NewProduction {
            email: payload.email,
            level: payload.level,
            product_type: payload.product_type,
            quantity: payload.quantity,
            size: trimmed(payload.size),
            status: payload.status,
            production_start_time: payload.production_start_time,
        })
        .await?;
    Ok(created_response(ProductionResponse::from(row)))
}

#[utoipa::path(
    put,
    path = "/api/production/{id}",
    params(("id" = Uuid, Path, description = "Production run ID")),
    request_body = UpdateProductionRequest,
    responses(
        (status = 200, description = "Production run updated"),
        (status = 400, description = "Invalid request or status", body = crate::errors::ErrorResponse),
        (status = 404, description = "Production run not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Production run already completed", body = crate::errors::ErrorResponse)
    ),
    tag = "production"
)]
pub async fn update_production(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProductionRequest>,
) -> ApiResult<ProductionResponse> {
    validate_input(&payload)?;
    let row = state
        .services
        .productions
        .update(
            id,
            ProductionChanges {
                level: payload.level,
                product_type: payload.product_type,
                quantity: payload.quantity,
                size: payload.size,
                status: payload.status,
                production_start_time: payload.production_start_time,
            },
        )
        .await?;
    Ok(Json(ApiResponse::success(row.into())))
}

#[utoipa::path(
    delete,
    path = "/api/production/{id}",
    params(("id" = Uuid, Path, description = "Production run ID")),
    responses(
        (status = 200, description = "Production run deleted"),
        (status = 404, description = "Production run not found", body = crate::errors::ErrorResponse)
    ),
    tag = "production"
)]
pub async fn delete_production(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ProductionResponse> {
    let deleted = state.services.productions.delete(id).await?;
    let response = ProductionWithUser {
        production: deleted,
        user: None,
    };
    Ok(Json(ApiResponse::with_message(
        response.into(),
        "Production run deleted",
    )))
}

#[utoipa::path(
    get,
    path = "/api/production/user/{user_id}",
    params(("user_id" = Uuid, Path, description = "Owning user ID"), ListQuery),
    responses((status = 200, description = "Production runs of the user")),
    tag = "production"
)]
pub async fn list_productions_by_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, limit) = state.page_params(&query);
    let (rows, total) = state
        .services
        .productions
        .list_by_user(user_id, page, limit)
        .await?;
    Ok(page_of(rows, total, page, limit))
}

#[utoipa::path(
    get,
    path = "/api/production/name/{name}",
    params(("name" = String, Path, description = "Prefix of the owning user's name"), ListQuery),
    responses((status = 200, description = "Production runs whose owner matches")),
    tag = "production"
)]
pub async fn list_productions_by_user_name(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, limit) = state.page_params(&query);
    let (rows, total) = state
        .services
        .productions
        .list_by_user_name(&name, page, limit)
        .await?;
    Ok(page_of(rows, total, page, limit))
}
