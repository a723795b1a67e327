pub mod audit_log;
pub mod product;
pub mod stock_movement;
pub mod store;
pub mod user;
