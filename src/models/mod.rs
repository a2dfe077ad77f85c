pub mod delivery;
pub mod order_request;
pub mod principal;
pub mod tracking;
pub mod vehicle;
