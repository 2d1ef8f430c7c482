use crate::{handlers, AppState};
use axum::{response::Json, routing::get, Router};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Uniform Ops API",
        version = "1.0.0",
        description = r#"
Production, stock, order and sales tracking for a school uniform workshop.

## Conventions

- Field names are camelCase.
- Successful responses use the envelope `{ success, data, message, errors, meta }`.
- Failures return `{ error, message, details?, requestId?, timestamp }`.
- List endpoints accept `page` (default 1) and `limit` (default 20, capped by configuration).

## Fulfillment

Moving an order to `CLAIMED` decrements stock for every line and records the
revenue in one transaction. A claimed order is final.
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers((url = "http://localhost:8080", description = "Local development")),
    tags(
        (name = "users", description = "Staff accounts and credential checks"),
        (name = "admins", description = "Administrator accounts"),
        (name = "production", description = "Production runs"),
        (name = "finished-products", description = "Finished goods produced by completed runs"),
        (name = "inventory", description = "Sellable stock ledger"),
        (name = "raw-materials", description = "Raw material stock"),
        (name = "orders", description = "Student orders and fulfillment"),
        (name = "order-items", description = "Order lines"),
        (name = "sales-reports", description = "Revenue aggregates")
    ),
    paths(
        handlers::users::list_users,
        handlers::users::get_user,
        handlers::users::create_user,
        handlers::users::update_user,
        handlers::users::delete_user,
        handlers::users::login,
        handlers::admins::list_admins,
        handlers::admins::get_admin,
        handlers::admins::create_admin,
        handlers::admins::update_admin,
        handlers::production::list_productions,
        handlers::production::get_production,
        handlers::production::create_production,
        handlers::production::update_production,
        handlers::production::delete_production,
        handlers::production::list_productions_by_user,
        handlers::production::list_productions_by_user_name,
        handlers::finished_products::list_finished_products,
        handlers::finished_products::get_finished_product,
        handlers::inventory::list_inventory,
        handlers::inventory::get_inventory,
        handlers::inventory::restock_inventory,
        handlers::inventory::adjust_inventory,
        handlers::raw_materials::list_raw_materials,
        handlers::raw_materials::get_raw_material,
        handlers::raw_materials::upsert_raw_material,
        handlers::raw_materials::update_raw_material,
        handlers::raw_materials::delete_raw_material,
        handlers::orders::list_orders,
        handlers::orders::get_order,
        handlers::orders::create_order,
        handlers::orders::update_order,
        handlers::orders::delete_order,
        handlers::order_items::list_order_items,
        handlers::order_items::get_order_item,
        handlers::order_items::list_items_for_order,
        handlers::sales_reports::list_sales_reports,
        handlers::sales_reports::get_sales_report,
        handlers::sales_reports::reconcile_sales_report,
    ),
    components(
        schemas(
            crate::ResponseMeta,
            crate::errors::ErrorResponse,
            crate::services::inventory::StockKey,
            handlers::users::CreateUserRequest,
            handlers::users::UpdateUserRequest,
            handlers::users::LoginRequest,
            handlers::users::UserResponse,
            handlers::admins::CreateAdminRequest,
            handlers::admins::UpdateAdminRequest,
            handlers::admins::AdminResponse,
            handlers::production::CreateProductionRequest,
            handlers::production::UpdateProductionRequest,
            handlers::production::ProductionOwner,
            handlers::production::ProductionResponse,
            handlers::finished_products::FinishedProductResponse,
            handlers::inventory::StockChangeRequest,
            handlers::inventory::InventoryResponse,
            handlers::raw_materials::RawMaterialRequest,
            handlers::raw_materials::RawMaterialResponse,
            handlers::orders::OrderLineRequest,
            handlers::orders::CreateOrderRequest,
            handlers::orders::UpdateOrderRequest,
            handlers::orders::OrderResponse,
            handlers::order_items::OrderItemResponse,
            handlers::sales_reports::ReconcileSalesRequest,
            handlers::sales_reports::SalesReportResponse,
        )
    )
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Serves the generated document at `/api-docs/openapi.json`
pub fn routes() -> Router<AppState> {
    Router::new().route("/api-docs/openapi.json", get(openapi_json))
}
