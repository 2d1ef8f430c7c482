pub mod admin;
pub mod finished_product;
pub mod inventory;
pub mod order;
pub mod order_item;
pub mod production;
pub mod raw_material;
pub mod sales_report;
pub mod user;
