use super::common::page_response;
use crate::{entities::finished_product, errors::ServiceError, ApiResponse, ApiResult, AppState, ListQuery};
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

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FinishedProductResponse {
    pub id: Uuid,
    pub level: String,
    pub product_type: String,
    pub quantity: i32,
    pub size: Option<String>,
    /// Most recent production run that added to this row
    pub production_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<finished_product::Model> for FinishedProductResponse {
    fn from(model: finished_product::Model) -> Self {
        Self {
            id: model.id,
            level: model.level,
            product_type: model.product_type,
            quantity: model.quantity,
            size: model.size,
            production_id: model.production_id,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_finished_products))
        .route("/:id", get(get_finished_product))
}

#[utoipa::path(
    get,
    path = "/api/finished-product",
    params(ListQuery),
    responses((status = 200, description = "Page of finished products")),
    tag = "finished-products"
)]
pub async fn list_finished_products(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, limit) = state.page_params(&query);
    let (rows, total) = state.services.finished_products.list(page, limit).await?;
    Ok(page_response::<_, FinishedProductResponse>(rows, total, page, limit))
}

#[utoipa::path(
    get,
    path = "/api/finished-product/{id}",
    params(("id" = Uuid, Path, description = "Finished product ID")),
    responses(
        (status = 200, description = "Finished product found"),
        (status = 404, description = "Finished product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "finished-products"
)]
pub async fn get_finished_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<FinishedProductResponse> {
    let row = state.services.finished_products.get(id).await?;
    Ok(Json(ApiResponse::success(row.into())))
}
