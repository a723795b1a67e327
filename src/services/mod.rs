pub mod catalog;
pub mod ledger;
pub mod low_stock;
pub mod movements;

/// Identity a store-scoped operation runs under. The store id always comes
/// from the verified caller, never from request input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreScope {
    pub user_id: i32,
    pub store_id: i32,
}

/// Identity for catalog writes, which are not tied to a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: i32,
    pub store_id: Option<i32>,
}
