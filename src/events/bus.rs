use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::events::catalog::{Event, Room};
use crate::observability::metrics::Metrics;

pub type ConnectionId = u64;

struct Subscriber {
    tx: mpsc::Sender<Event>,
    rooms: HashSet<Room>,
}

/// Room-scoped fan-out over per-connection bounded queues.
///
/// Publishing never waits on a subscriber: a full or closed queue drops the
/// event for that subscriber only. Events a single caller publishes to one
/// room reach each subscriber in publish order.
pub struct EventBus {
    next_id: AtomicU64,
    buffer_size: usize,
    connections: DashMap<ConnectionId, Subscriber>,
    rooms: DashMap<Room, HashSet<ConnectionId>>,
    metrics: Metrics,
}

impl EventBus {
    pub fn new(buffer_size: usize, metrics: Metrics) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            buffer_size: buffer_size.max(1),
            connections: DashMap::new(),
            rooms: DashMap::new(),
            metrics,
        }
    }

    /// Registers a connection with no room membership.
    pub fn connect(&self) -> (ConnectionId, mpsc::Receiver<Event>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer_size);

        self.connections.insert(
            id,
            Subscriber {
                tx,
                rooms: HashSet::new(),
            },
        );
        self.metrics.active_connections.inc();
        debug!(connection_id = id, "subscriber connected");

        (id, rx)
    }

    /// The room entry is written while the connection entry is held, so a
    /// concurrent `disconnect` either fails this join or sees the membership.
    /// Lock order is always `connections` before `rooms`.
    pub fn join(&self, connection_id: ConnectionId, room: Room) -> Result<(), AppError> {
        {
            let mut subscriber = self.connections.get_mut(&connection_id).ok_or_else(|| {
                AppError::NotFound(format!("connection {connection_id} not found"))
            })?;
            subscriber.rooms.insert(room);
            self.rooms.entry(room).or_default().insert(connection_id);
        }

        debug!(connection_id, room = %room, "joined room");
        Ok(())
    }

    pub fn leave(&self, connection_id: ConnectionId, room: Room) {
        if let Some(mut subscriber) = self.connections.get_mut(&connection_id) {
            subscriber.rooms.remove(&room);
        }
        self.remove_member(room, connection_id);
        debug!(connection_id, room = %room, "left room");
    }

    /// Drops the connection and all of its room memberships.
    pub fn disconnect(&self, connection_id: ConnectionId) {
        let Some((_, subscriber)) = self.connections.remove(&connection_id) else {
            return;
        };

        for room in subscriber.rooms {
            self.remove_member(room, connection_id);
        }
        self.metrics.active_connections.dec();
        debug!(connection_id, "subscriber disconnected");
    }

    /// Closes every subscriber queue. Used on shutdown.
    pub fn close_all(&self) {
        let ids: Vec<ConnectionId> = self.connections.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            self.disconnect(id);
        }
    }

    /// Delivers `event` to every current member of `room` and returns how many
    /// subscribers accepted it.
    pub fn publish(&self, room: Room, event: Event) -> Result<usize, AppError> {
        if event.room() != room {
            return Err(AppError::validation(
                "room",
                format!("{} cannot be published to {room}", event.name()),
            ));
        }

        let members: Vec<ConnectionId> = match self.rooms.get(&room) {
            Some(entry) => entry.value().iter().copied().collect(),
            None => Vec::new(),
        };

        Ok(self.fan_out(members, &event))
    }

    /// Delivers `event` to every connected subscriber regardless of rooms.
    pub fn broadcast(&self, event: Event) -> usize {
        let everyone: Vec<ConnectionId> =
            self.connections.iter().map(|entry| *entry.key()).collect();
        self.fan_out(everyone, &event)
    }

    /// Publishes to the event's own room, or to everyone for broadcast events.
    /// Failures are logged, never returned.
    pub fn emit(&self, event: Event) {
        let room = event.room();
        let name = event.name();
        if event.is_broadcast() {
            let delivered = self.broadcast(event);
            debug!(event = name, delivered, "event broadcast");
            return;
        }
        match self.publish(room, event) {
            Ok(delivered) => debug!(room = %room, event = name, delivered, "event published"),
            Err(err) => warn!(room = %room, event = name, error = %err, "event publish failed"),
        }
    }

    pub fn room_size(&self, room: &Room) -> usize {
        self.rooms.get(room).map(|entry| entry.len()).unwrap_or(0)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn fan_out(&self, members: Vec<ConnectionId>, event: &Event) -> usize {
        self.metrics
            .events_published_total
            .with_label_values(&[event.name()])
            .inc();

        let mut delivered = 0;
        for connection_id in members {
            let Some(tx) = self
                .connections
                .get(&connection_id)
                .map(|subscriber| subscriber.tx.clone())
            else {
                continue;
            };

            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    self.metrics
                        .events_dropped_total
                        .with_label_values(&["full"])
                        .inc();
                    warn!(connection_id, event = event.name(), "subscriber queue full; event dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    self.metrics
                        .events_dropped_total
                        .with_label_values(&["closed"])
                        .inc();
                    self.disconnect(connection_id);
                }
            }
        }

        delivered
    }

    fn remove_member(&self, room: Room, connection_id: ConnectionId) {
        let now_empty = match self.rooms.get_mut(&room) {
            Some(mut members) => {
                members.remove(&connection_id);
                members.is_empty()
            }
            None => false,
        };

        if now_empty {
            self.rooms.remove_if(&room, |_, members| members.is_empty());
        }
    }
}
