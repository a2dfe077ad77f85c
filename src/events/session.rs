use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::engine::tracking::{ingest_driver_location, relay_customer_location};
use crate::error::AppError;
use crate::events::bus::ConnectionId;
use crate::events::catalog::Room;
use crate::models::principal::{Principal, Role};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRef {
    pub delivery_id: Uuid,
}

/// Frames a connected client may send, `{"event": "<name>", "data": {...}}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    JoinDelivery(DeliveryRef),
    LeaveDelivery(DeliveryRef),
    JoinOrderRequests,
    LeaveOrderRequests,
    DriverLocation(Value),
    CustomerLocation(Value),
}

impl ClientMessage {
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        serde_json::from_str(raw).map_err(|err| AppError::validation("event", err.to_string()))
    }
}

/// One subscriber connection bound to its authenticated principal.
pub struct Session<'a> {
    state: &'a AppState,
    principal: Principal,
    connection_id: ConnectionId,
}

impl<'a> Session<'a> {
    pub fn new(state: &'a AppState, principal: Principal, connection_id: ConnectionId) -> Self {
        Self {
            state,
            principal,
            connection_id,
        }
    }

    pub fn handle(&self, message: ClientMessage) -> Result<(), AppError> {
        match message {
            ClientMessage::JoinDelivery(target) => {
                self.authorize_delivery(target.delivery_id)?;
                self.state
                    .events
                    .join(self.connection_id, Room::Delivery(target.delivery_id))
            }
            ClientMessage::LeaveDelivery(target) => {
                self.state
                    .events
                    .leave(self.connection_id, Room::Delivery(target.delivery_id));
                Ok(())
            }
            ClientMessage::JoinOrderRequests => {
                self.principal.require(Role::Admin)?;
                self.state.events.join(self.connection_id, Room::OrderRequests)
            }
            ClientMessage::LeaveOrderRequests => {
                self.state
                    .events
                    .leave(self.connection_id, Room::OrderRequests);
                Ok(())
            }
            ClientMessage::DriverLocation(payload) => {
                self.principal.require(Role::Driver)?;
                ingest_driver_location(self.state, self.principal.id, &payload).map(|_| ())
            }
            ClientMessage::CustomerLocation(payload) => {
                self.principal.require(Role::Customer)?;
                relay_customer_location(self.state, self.principal.id, &payload).map(|_| ())
            }
        }
    }

    pub fn close(&self) {
        self.state.events.disconnect(self.connection_id);
        debug!(connection_id = self.connection_id, user_id = %self.principal.id, "session closed");
    }

    fn authorize_delivery(&self, delivery_id: Uuid) -> Result<(), AppError> {
        let delivery = self
            .state
            .deliveries
            .get(&delivery_id)
            .ok_or_else(|| AppError::NotFound(format!("delivery {delivery_id} not found")))?;

        if delivery.visible_to(&self.principal) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "not a participant of delivery {delivery_id}"
            )))
        }
    }
}
