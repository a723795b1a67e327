pub mod common;
pub mod movements;
pub mod products;
pub mod stores;
