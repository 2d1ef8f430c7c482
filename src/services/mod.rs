// Per-key coordination shared by every stock writer
pub mod key_locks;

// Stock and revenue ledgers
pub mod inventory;
pub mod sales_reports;

// Orders and the claim workflow
pub mod fulfillment;
pub mod order_items;
pub mod order_status;
pub mod orders;

// Manufacturing
pub mod finished_products;
pub mod production;
pub mod raw_materials;

// Accounts
pub mod admins;
pub mod users;
