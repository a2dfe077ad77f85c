pub mod bus;
pub mod catalog;
pub mod session;

pub use bus::{ConnectionId, EventBus};
pub use catalog::{Event, Room};
