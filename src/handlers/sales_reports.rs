use super::common::{page_response, validate_input};
use crate::{
    entities::sales_report,
    errors::ServiceError,
    services::inventory::StockKey,
    ApiResponse, ApiResult, AppState, ListQuery,
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

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSalesRequest {
    #[validate(length(min = 1, message = "Product type is required"))]
    #[schema(example = "Polo")]
    pub product_type: String,
    #[validate(length(min = 1, message = "Level is required"))]
    #[schema(example = "Grade7")]
    pub level: String,
    pub size: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SalesReportResponse {
    pub id: Uuid,
    pub product_type: String,
    pub level: String,
    pub size: Option<String>,
    pub total_revenue: Decimal,
    /// When the first sale for this key was recorded
    pub sales_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<sales_report::Model> for SalesReportResponse {
    fn from(model: sales_report::Model) -> Self {
        Self {
            id: model.id,
            product_type: model.product_type,
            level: model.level,
            size: model.size,
            total_revenue: model.total_revenue,
            sales_date: model.sales_date,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_sales_reports).post(reconcile_sales_report))
        .route("/:id", get(get_sales_report))
}

#[utoipa::path(
    get,
    path = "/api/sales-report",
    params(ListQuery),
    responses((status = 200, description = "Page of sales aggregates")),
    tag = "sales-reports"
)]
pub async fn list_sales_reports(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, limit) = state.page_params(&query);
    let (rows, total) = state.services.sales_reports.list(page, limit).await?;
    Ok(page_response::<_, SalesReportResponse>(rows, total, page, limit))
}

#[utoipa::path(
    get,
    path = "/api/sales-report/{id}",
    params(("id" = Uuid, Path, description = "Sales report ID")),
    responses(
        (status = 200, description = "Sales report found"),
        (status = 404, description = "Sales report not found", body = crate::errors::ErrorResponse)
    ),
    tag = "sales-reports"
)]
pub async fn get_sales_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<SalesReportResponse> {
    let row = state.services.sales_reports.get(id).await?;
    Ok(Json(ApiResponse::success(row.into())))
}

/// Recompute the revenue aggregate for a key from claimed orders
#[utoipa::path(
    post,
    path = "/api/sales-report",
    request_body = ReconcileSalesRequest,
    responses(
        (status = 200, description = "Aggregate reconciled"),
        (status = 404, description = "No claimed sales for the key", body = crate::errors::ErrorResponse)
    ),
    tag = "sales-reports"
)]
pub async fn reconcile_sales_report(
    State(state): State<AppState>,
    Json(payload): Json<ReconcileSalesRequest>,
) -> ApiResult<SalesReportResponse> {
    validate_input(&payload)?;
    let key = StockKey::new(&payload.product_type, &payload.level, payload.size.as_deref());
    let row = state.services.sales_reports.reconcile(&key).await?;
    Ok(Json(ApiResponse::success(row.into())))
}
