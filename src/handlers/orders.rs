use super::{
    common::{created_response, success_response, trimmed, validate_input},
    order_items::OrderItemResponse,
};
use crate::{
    errors::ServiceError,
    services::{
        inventory::StockKey,
        orders::{NewOrder, OrderLineInput, OrderUpdate, OrderWithLines},
    },
    ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse,
};
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
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineRequest {
    #[validate(length(min = 1, message = "Product type is required"))]
    #[schema(example = "Polo")]
    pub product_type: String,
    #[validate(length(min = 1, message = "Level is required"))]
    #[schema(example = "Grade7")]
    pub level: String,
    #[schema(example = "M")]
    pub size: Option<String>,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    pub unit_price: Decimal,
    /// Ignored; line totals are always computed
    #[serde(default)]
    pub total_price: Option<Decimal>,
}

impl From<OrderLineRequest> for OrderLineInput {
    fn from(line: OrderLineRequest) -> Self {
        Self {
            key: StockKey::new(&line.product_type, &line.level, line.size.as_deref()),
            quantity: line.quantity,
            unit_price: line.unit_price,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "Student number is required"))]
    pub student_number: String,
    #[validate(length(min = 1, message = "Student name is required"))]
    pub student_name: String,
    #[validate(length(min = 1, message = "Contact number is required"))]
    pub contact_number: String,
    pub gender: Option<String>,
    /// Defaults to PENDING; CLAIMED is rejected
    pub status: Option<String>,
    #[validate(length(min = 1, message = "An order needs at least one line"))]
    pub order_items: Vec<OrderLineRequest>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderRequest {
    pub student_number: Option<String>,
    pub student_name: Option<String>,
    pub contact_number: Option<String>,
    pub gender: Option<String>,
    /// Moving to CLAIMED decrements stock and records revenue for every line
    #[validate(length(min = 1, message = "Status is required"))]
    #[schema(example = "CLAIMED")]
    pub status: String,
    /// Lines to fulfil instead of the stored ones
    pub order_items: Option<Vec<OrderLineRequest>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: Uuid,
    pub student_number: String,
    pub student_name: String,
    pub contact_number: String,
    pub gender: Option<String>,
    pub status: String,
    pub total_price: Decimal,
    pub order_items: Vec<OrderItemResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<OrderWithLines> for OrderResponse {
    fn from(OrderWithLines { order, lines }: OrderWithLines) -> Self {
        Self {
            id: order.id,
            student_number: order.student_number,
            student_name: order.student_name,
            contact_number: order.contact_number,
            gender: order.gender,
            status: order.status,
            total_price: order.total_price,
            order_items: lines.into_iter().map(OrderItemResponse::from).collect(),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

fn validate_lines(lines: &[OrderLineRequest]) -> Result<(), ServiceError> {
    lines.iter().try_for_each(validate_input)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders).post(create_order))
        .route("/:id", get(get_order).put(update_order).delete(delete_order))
}

/// List orders with their lines
#[utoipa::path(
    get,
    path = "/api/order",
    params(ListQuery),
    responses((status = 200, description = "Page of orders")),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, limit) = state.page_params(&query);
    let (orders, total) = state.services.orders.list_orders(page, limit).await?;
    let items = orders.into_iter().map(OrderResponse::from).collect();
    Ok(success_response(PaginatedResponse::new(items, total, page, limit)))
}

#[utoipa::path(
    get,
    path = "/api/order/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order found"),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn get_order(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<OrderResponse> {
    let order = state.services.orders.get_order(id).await?;
    Ok(Json(ApiResponse::success(order.into())))
}

/// Take a new order
#[utoipa::path(
    post,
    path = "/api/order",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created"),
        (status = 400, description = "Invalid request or status", body = crate::errors::ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    validate_lines(&payload.order_items)?;

    let order = state
        .services
        .orders
        .create_order(NewOrder {
            student_number: payload.student_number,
            student_name: payload.student_name,
            contact_number: payload.contact_number,
            gender: trimmed(payload.gender),
            status: payload.status,
            lines: payload.order_items.into_iter().map(Into::into).collect(),
        })
        .await?;
    Ok(created_response(OrderResponse::from(order)))
}

/// Update an order; claiming it fulfils every line
#[utoipa::path(
    put,
    path = "/api/order/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdateOrderRequest,
    responses(
        (status = 200, description = "Order updated"),
        (status = 400, description = "Invalid request or transition", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order already claimed or stock modified concurrently", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn update_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderRequest>,
) -> ApiResult<OrderResponse> {
    validate_input(&payload)?;
    if let Some(lines) = &payload.order_items {
        validate_lines(lines)?;
    }

    let order = state
        .services
        .orders
        .update_order(
            id,
            OrderUpdate {
                student_number: payload.student_number,
                student_name: payload.student_name,
                contact_number: payload.contact_number,
                gender: payload.gender,
                status: payload.status,
                lines: payload
                    .order_items
                    .map(|lines| lines.into_iter().map(Into::into).collect()),
            },
        )
        .await?;
    Ok(Json(ApiResponse::success(order.into())))
}

/// Delete an order and its lines. Stock is not restored.
#[utoipa::path(
    delete,
    path = "/api/order/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order deleted"),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn delete_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderResponse> {
    let order = state.services.orders.delete_order(id).await?;
    Ok(Json(ApiResponse::with_message(order.into(), "Order deleted")))
}
