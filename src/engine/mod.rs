pub mod conflict;
pub mod deliveries;
pub mod locks;
pub mod order_requests;
pub mod pricing;
pub mod reports;
pub mod scheduler;
pub mod tracking;
pub mod vehicles;
