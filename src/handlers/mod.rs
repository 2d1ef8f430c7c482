use crate::{
    auth::PasswordPolicy,
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    services::{
        admins::AdminService,
        finished_products::FinishedProductService,
        inventory::{InventoryService, StockKey},
        key_locks::KeyedLocks,
        order_items::OrderItemService,
        orders::OrderService,
        production::ProductionService,
        raw_materials::RawMaterialService,
        sales_reports::SalesReportService,
        users::UserService,
    },
};
use std::sync::Arc;

pub mod admins;
pub mod common;
pub mod finished_products;
pub mod inventory;
pub mod order_items;
pub mod orders;
pub mod production;
pub mod raw_materials;
pub mod sales_reports;
pub mod users;

/// Services shared by the HTTP handlers.
///
/// Every stock writer gets the same [`KeyedLocks`] registry so that
/// fulfillment, restocks and production completion serialise per key.
#[derive(Clone)]
pub struct AppServices {
    pub users: Arc<UserService>,
    pub admins: Arc<AdminService>,
    pub productions: Arc<ProductionService>,
    pub finished_products: Arc<FinishedProductService>,
    pub inventory: Arc<InventoryService>,
    pub raw_materials: Arc<RawMaterialService>,
    pub orders: Arc<OrderService>,
    pub order_items: Arc<OrderItemService>,
    pub sales_reports: Arc<SalesReportService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        config: &AppConfig,
    ) -> Self {
        let locks: Arc<KeyedLocks<StockKey>> = Arc::new(KeyedLocks::new());
        let password_policy = PasswordPolicy::with_min_length(config.password_min_length);
        let policy = config.stock_policy;

        Self {
            users: Arc::new(UserService::new(db_pool.clone(), password_policy.clone())),
            admins: Arc::new(AdminService::new(db_pool.clone(), password_policy)),
            productions: Arc::new(ProductionService::new(
                db_pool.clone(),
                event_sender.clone(),
                locks.clone(),
            )),
            finished_products: Arc::new(FinishedProductService::new(db_pool.clone())),
            inventory: Arc::new(InventoryService::new(
                db_pool.clone(),
                event_sender.clone(),
                locks.clone(),
                policy,
            )),
            raw_materials: Arc::new(RawMaterialService::new(db_pool.clone())),
            orders: Arc::new(OrderService::new(
                db_pool.clone(),
                event_sender.clone(),
                locks.clone(),
                policy,
            )),
            order_items: Arc::new(OrderItemService::new(db_pool.clone())),
            sales_reports: Arc::new(SalesReportService::new(db_pool, event_sender, locks)),
        }
    }
}
