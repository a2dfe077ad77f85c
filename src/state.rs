use dashmap::DashMap;
use uuid::Uuid;

use crate::engine::conflict::{Booking, ResourceKey, ResourceKind};
use crate::engine::locks::KeyedLocks;
use crate::engine::pricing::FareSchedule;
use crate::events::bus::EventBus;
use crate::models::delivery::Delivery;
use crate::models::order_request::OrderRequest;
use crate::models::tracking::TrackingSample;
use crate::models::vehicle::Vehicle;
use crate::observability::metrics::Metrics;

pub struct AppState {
    pub deliveries: DashMap<Uuid, Delivery>,
    pub order_requests: DashMap<Uuid, OrderRequest>,
    pub vehicles: DashMap<Uuid, Vehicle>,
    /// Normalized number plate to vehicle id.
    pub vehicle_plates: DashMap<String, Uuid>,
    pub tracking: DashMap<Uuid, Vec<TrackingSample>>,
    pub request_locks: KeyedLocks<Uuid>,
    pub resource_locks: KeyedLocks<ResourceKey>,
    pub events: EventBus,
    pub fare: FareSchedule,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(subscriber_buffer_size: usize, fare: FareSchedule) -> Self {
        let metrics = Metrics::new();

        Self {
            deliveries: DashMap::new(),
            order_requests: DashMap::new(),
            vehicles: DashMap::new(),
            vehicle_plates: DashMap::new(),
            tracking: DashMap::new(),
            request_locks: KeyedLocks::new(),
            resource_locks: KeyedLocks::new(),
            events: EventBus::new(subscriber_buffer_size, metrics.clone()),
            fare,
            metrics,
        }
    }

    /// Every interval currently bound to `resource`.
    pub fn bookings_for(&self, resource: ResourceKey) -> Vec<Booking> {
        self.deliveries
            .iter()
            .filter(|entry| {
                let delivery = entry.value();
                match resource.kind {
                    ResourceKind::Driver => delivery.driver_id == resource.id,
                    ResourceKind::Vehicle => delivery.vehicle_id == resource.id,
                }
            })
            .map(|entry| Booking {
                delivery_id: *entry.key(),
                interval: entry.value().interval(),
            })
            .collect()
    }
}
