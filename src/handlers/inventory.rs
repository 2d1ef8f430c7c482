use super::common::{created_response, page_response, validate_input};
use crate::{
    entities::inventory,
    errors::ServiceError,
    services::inventory::StockKey,
    ApiResponse, ApiResult, AppState, ListQuery,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Quantity change for one stock key, used for both restocks and adjustments
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StockChangeRequest {
    #[validate(length(min = 1, message = "Product type is required"))]
    #[schema(example = "Polo")]
    pub product_type: String,
    #[validate(length(min = 1, message = "Level is required"))]
    #[schema(example = "Grade7")]
    pub level: String,
    #[schema(example = "M")]
    pub size: Option<String>,
    #[validate(range(min = 1, message = "Quantity must be greater than zero"))]
    pub quantity: i32,
}

impl StockChangeRequest {
    fn key(&self) -> StockKey {
        StockKey::new(&self.product_type, &self.level, self.size.as_deref())
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InventoryResponse {
    pub id: Uuid,
    pub product_type: String,
    pub level: String,
    pub size: Option<String>,
    pub quantity: i32,
    /// IN_STOCK or OUT_OF_STOCK
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<inventory::Model> for InventoryResponse {
    fn from(model: inventory::Model) -> Self {
        Self {
            id: model.id,
            product_type: model.product_type,
            level: model.level,
            size: model.size,
            quantity: model.quantity,
            status: model.status,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_inventory).post(restock_inventory))
        .route("/adjust", post(adjust_inventory))
        .route("/:id", get(get_inventory))
}

/// List stock entries
#[utoipa::path(
    get,
    path = "/api/inventory",
    params(ListQuery),
    responses(
        (status = 200, description = "Page of stock entries"),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn list_inventory(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, limit) = state.page_params(&query);
    let (rows, total) = state.services.inventory.list(page, limit).await?;
    Ok(page_response::<_, InventoryResponse>(rows, total, page, limit))
}

#[utoipa::path(
    get,
    path = "/api/inventory/{id}",
    params(("id" = Uuid, Path, description = "Stock entry ID")),
    responses(
        (status = 200, description = "Stock entry found"),
        (status = 404, description = "Stock entry not found", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn get_inventory(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<InventoryResponse> {
    let row = state.services.inventory.get(id).await?;
    Ok(Json(ApiResponse::success(row.into())))
}

/// Add stock for a key, creating the entry on first restock
#[utoipa::path(
    post,
    path = "/api/inventory",
    request_body = StockChangeRequest,
    responses(
        (status = 201, description = "Stock added"),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn restock_inventory(
    State(state): State<AppState>,
    Json(payload): Json<StockChangeRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let row = state
        .services
        .inventory
        .increment(&payload.key(), payload.quantity)
        .await?;
    Ok(created_response(InventoryResponse::from(row)))
}

/// Remove stock for a key under the configured stock policy
#[utoipa::path(
    post,
    path = "/api/inventory/adjust",
    request_body = StockChangeRequest,
    responses(
        (status = 200, description = "Stock removed"),
        (status = 404, description = "No stock entry for the key", body = crate::errors::ErrorResponse),
        (status = 409, description = "Concurrent modification", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn adjust_inventory(
    State(state): State<AppState>,
    Json(payload): Json<StockChangeRequest>,
) -> ApiResult<InventoryResponse> {
    validate_input(&payload)?;
    let row = state
        .services
        .inventory
        .decrement(&payload.key(), payload.quantity)
        .await?;
    Ok(Json(ApiResponse::success(row.into())))
}
