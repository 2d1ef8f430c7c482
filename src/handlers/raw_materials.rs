use super::common::{created_response, page_response, success_response, validate_input};
use crate::{
    entities::raw_material,
    errors::ServiceError,
    services::raw_materials::RawMaterialInput,
    ApiResponse, ApiResult, AppState, ListQuery,
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
pub struct RawMaterialRequest {
    #[validate(length(min = 1, message = "Raw material type is required"))]
    #[schema(example = "Cotton twill")]
    pub raw_material_type: String,
    #[validate(range(min = 0, message = "Quantity cannot be negative"))]
    pub quantity: i32,
    #[schema(example = "meters")]
    pub unit: Option<String>,
}

impl From<RawMaterialRequest> for RawMaterialInput {
    fn from(request: RawMaterialRequest) -> Self {
        Self {
            raw_material_type: request.raw_material_type,
            quantity: request.quantity,
            unit: request.unit,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RawMaterialResponse {
    pub id: Uuid,
    pub raw_material_type: String,
    pub quantity: i32,
    pub unit: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<raw_material::Model> for RawMaterialResponse {
    fn from(model: raw_material::Model) -> Self {
        Self {
            id: model.id,
            raw_material_type: model.raw_material_type,
            quantity: model.quantity,
            unit: model.unit,
            status: model.status,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_raw_materials).post(upsert_raw_material))
        .route(
            "/:id",
            get(get_raw_material)
                .put(update_raw_material)
                .delete(delete_raw_material),
        )
}

#[utoipa::path(
    get,
    path = "/api/raw-material-inventory",
    params(ListQuery),
    responses((status = 200, description = "Page of raw materials")),
    tag = "raw-materials"
)]
pub async fn list_raw_materials(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, limit) = state.page_params(&query);
    let (rows, total) = state.services.raw_materials.list(page, limit).await?;
    Ok(page_response::<_, RawMaterialResponse>(rows, total, page, limit))
}

#[utoipa::path(
    get,
    path = "/api/raw-material-inventory/{id}",
    params(("id" = Uuid, Path, description = "Raw material ID")),
    responses(
        (status = 200, description = "Raw material found"),
        (status = 404, description = "Raw material not found", body = crate::errors::ErrorResponse)
    ),
    tag = "raw-materials"
)]
pub async fn get_raw_material(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<RawMaterialResponse> {
    let row = state.services.raw_materials.get(id).await?;
    Ok(Json(ApiResponse::success(row.into())))
}

/// Record the on-hand quantity of a material type
#[utoipa::path(
    post,
    path = "/api/raw-material-inventory",
    request_body = RawMaterialRequest,
    responses(
        (status = 201, description = "Raw material created"),
        (status = 200, description = "Existing raw material restated"),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse)
    ),
    tag = "raw-materials"
)]
pub async fn upsert_raw_material(
    State(state): State<AppState>,
    Json(payload): Json<RawMaterialRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let (row, created) = state.services.raw_materials.upsert(payload.into()).await?;
    let body = RawMaterialResponse::from(row);
    Ok(if created {
        created_response(body)
    } else {
        success_response(body)
    })
}

#[utoipa::path(
    put,
    path = "/api/raw-material-inventory/{id}",
    params(("id" = Uuid, Path, description = "Raw material ID")),
    request_body = RawMaterialRequest,
    responses(
        (status = 200, description = "Raw material updated"),
        (status = 404, description = "Raw material not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Type already used by another row", body = crate::errors::ErrorResponse)
    ),
    tag = "raw-materials"
)]
pub async fn update_raw_material(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RawMaterialRequest>,
) -> ApiResult<RawMaterialResponse> {
    validate_input(&payload)?;
    let row = state
        .services
        .raw_materials
        .update(id, payload.into())
        .await?;
    Ok(Json(ApiResponse::success(row.into())))
}

#[utoipa::path(
    delete,
    path = "/api/raw-material-inventory/{id}",
    params(("id" = Uuid, Path, description = "Raw material ID")),
    responses(
        (status = 200, description = "Raw material deleted"),
        (status = 404, description = "Raw material not found", body = crate::errors::ErrorResponse)
    ),
    tag = "raw-materials"
)]
pub async fn delete_raw_material(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<RawMaterialResponse> {
    let row = state.services.raw_materials.delete(id).await?;
    Ok(Json(ApiResponse::with_message(row.into(), "Raw material deleted")))
}
