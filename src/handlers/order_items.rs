use super::common::page_response;
use crate::{entities::order_item, errors::ServiceError, ApiResponse, ApiResult, AppState, ListQuery};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_type: String,
    pub level: String,
    pub size: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    /// quantity × unitPrice, fixed when the order was created
    pub total_price: Decimal,
    pub created_at: DateTime<Utc>,
}

impl From<order_item::Model> for OrderItemResponse {
    fn from(model: order_item::Model) -> Self {
        Self {
            id: model.id,
            order_id: model.order_id,
            product_type: model.product_type,
            level: model.level,
            size: model.size,
            quantity: model.quantity,
            unit_price: model.unit_price,
            total_price: model.total_price,
            created_at: model.created_at,
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_order_items))
        .route("/:id", get(get_order_item))
        .route("/order/:order_id", get(list_items_for_order))
}

#[utoipa::path(
    get,
    path = "/api/order-items",
    params(ListQuery),
    responses((status = 200, description = "Page of order lines")),
    tag = "order-items"
)]
pub async fn list_order_items(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, limit) = state.page_params(&query);
    let (rows, total) = state.services.order_items.list(page, limit).await?;
    Ok(page_response::<_, OrderItemResponse>(rows, total, page, limit))
}

#[utoipa::path(
    get,
    path = "/api/order-items/{id}",
    params(("id" = Uuid, Path, description = "Order line ID")),
    responses(
        (status = 200, description = "Order line found"),
        (status = 404, description = "Order line not found", body = crate::errors::ErrorResponse)
    ),
    tag = "order-items"
)]
pub async fn get_order_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderItemResponse> {
    let row = state.services.order_items.get(id).await?;
    Ok(Json(ApiResponse::success(row.into())))
}

#[utoipa::path(
    get,
    path = "/api/order-items/order/{order_id}",
    params(("order_id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Lines of the order"),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "order-items"
)]
pub async fn list_items_for_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Vec<OrderItemResponse>> {
    let rows = state.services.order_items.by_order(order_id).await?;
    Ok(Json(ApiResponse::success(
        rows.into_iter().map(OrderItemResponse::from).collect(),
    )))
}
