//! Event Cache: folds gateway events into locally cached views of pending
//! offers, active trip rooms and rider status. All mutation happens through
//! [`SessionState::apply`] (inbound events) or the command paths in the
//! session module (optimistic local effects); consumers only ever see clones.

use std::collections::HashMap;

use gateway_proto::{
    ApprovalPayload, GatewayEvent, OfferPayload, PickupPoint, Station, Trip, TripCancelled,
    TripEventPayload, STATUS_AWAITING_PICKUP, STATUS_AWAITING_RIDER, STATUS_COMPLETED,
    STATUS_IN_PROGRESS,
};
use serde_json::Value;
use tracing::debug;

/// Candidate ride a driver has been asked to accept. At most one per rider;
/// a newer offer for the same rider replaces the old one wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct Offer {
    pub rider_id: String,
    pub rider_name: String,
    pub pickup: Option<PickupPoint>,
    pub station: Option<Station>,
    pub destination: Option<String>,
    /// 1-based ordinal of how many drivers have been tried for this rider.
    /// Display-only, supplied by the gateway without validation.
    pub attempt: u32,
    pub total: u32,
}

/// Realtime-tracked state of one active trip pairing.
#[derive(Debug, Clone, PartialEq)]
pub struct Room {
    pub trip_id: String,
    pub driver_id: Option<String>,
    pub rider_id: Option<String>,
    pub status: String,
    pub pickup: Option<PickupPoint>,
    pub station: Option<Station>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub updated_at: Option<String>,
    pub trip: Option<Trip>,
}

/// Most recent status record for the signed-in rider, replaced wholesale on
/// every `rider:status` event.
#[derive(Debug, Clone, PartialEq)]
pub struct RiderStatus {
    pub trip_id: Option<String>,
    pub status: String,
    pub rider_id: Option<String>,
    pub driver_id: Option<String>,
    pub pickup: Option<PickupPoint>,
    pub station: Option<Station>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub recorded_at: Option<String>,
    pub description: Option<String>,
}

/// Pending approval prompt for the signed-in rider. At most one at a time.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalRequest {
    pub trip_id: String,
    pub driver_id: Option<String>,
    pub driver_name: Option<String>,
    pub pickup: Option<PickupPoint>,
    pub station: Option<Station>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// True once the gateway acknowledged the session handshake. While false
    /// the consumer should fall back to pull-based refresh.
    pub ready: bool,
    /// Opaque queue summary from `driver:rider-queue`, passed through.
    pub queue: Option<Value>,
    pub offers: HashMap<String, Offer>,
    pub rooms: HashMap<String, Room>,
    pub rider_status: Option<RiderStatus>,
    pub approval: Option<ApprovalRequest>,
    /// Most recent gateway-reported error or cancellation notice.
    pub last_error: Option<String>,
}

impl SessionState {
    /// Folds one inbound event into the caches. Events lacking their
    /// required key are dropped without mutating state.
    pub fn apply(&mut self, event: GatewayEvent) {
        match event {
            GatewayEvent::SessionAck(_) => {
                self.ready = true;
                self.last_error = None;
            }
            GatewayEvent::SessionError(err) => {
                self.last_error = err.message;
            }
            GatewayEvent::DriverRiderQueue(summary) => {
                self.queue = Some(summary);
            }
            GatewayEvent::DriverRiderOffer(payload) => self.upsert_offer(payload),
            GatewayEvent::DriverRiderError(err) => {
                self.last_error = err.message;
            }
            GatewayEvent::DriverTripCancelled(cancelled) => self.cancel_trip(cancelled),
            GatewayEvent::TripRoomCreated(payload) => self.open_room(payload),
            GatewayEvent::TripLocation(payload) | GatewayEvent::TripStatus(payload) => {
                self.merge_room(payload)
            }
            GatewayEvent::RiderStatus(payload) => self.set_rider_status(payload),
            GatewayEvent::RiderApprovalRequest(payload) => self.set_approval(payload),
        }
    }

    /// Resets everything tied to the live channel. Called on transport
    /// disconnect and on identity change: a fresh identity starts clean.
    pub fn reset_live(&mut self) {
        self.ready = false;
        self.queue = None;
        self.offers.clear();
        self.rooms.clear();
        self.rider_status = None;
        self.approval = None;
        self.last_error = None;
    }

    fn upsert_offer(&mut self, payload: OfferPayload) {
        if payload.rider.id.is_empty() {
            debug!("dropping rider offer without rider id");
            return;
        }
        let offer = Offer {
            rider_id: payload.rider.id.clone(),
            rider_name: payload.rider.name.unwrap_or_else(|| "Rider".to_string()),
            pickup: payload.pickup,
            station: payload.station,
            destination: payload.rider.destination,
            attempt: payload.attempt.unwrap_or(1),
            total: payload.total.unwrap_or(1),
        };
        self.offers.insert(payload.rider.id, offer);
    }

    fn open_room(&mut self, payload: TripEventPayload) {
        let Some(trip_id) = payload.resolved_trip_id().map(str::to_string) else {
            debug!("dropping room-created event without trip id");
            return;
        };
        // The offer was accepted upstream, possibly by a different driver.
        if let Some(rider_id) = payload.rider_id.as_deref() {
            self.offers.remove(rider_id);
        }
        let previous_trip = self
            .rooms
            .get(&trip_id)
            .and_then(|room| room.trip.clone());
        let room = Room {
            trip_id: trip_id.clone(),
            driver_id: payload.driver_id,
            rider_id: payload.rider_id,
            status: payload
                .status
                .unwrap_or_else(|| STATUS_AWAITING_PICKUP.to_string()),
            pickup: payload.pickup,
            station: payload.station,
            latitude: payload.latitude,
            longitude: payload.longitude,
            updated_at: payload.recorded_at,
            trip: payload.trip.or(previous_trip),
        };
        self.rooms.insert(trip_id, room);
    }

    fn merge_room(&mut self, payload: TripEventPayload) {
        let Some(trip_id) = payload.resolved_trip_id().map(str::to_string) else {
            debug!("dropping trip event without trip id");
            return;
        };
        if payload.status.as_deref() == Some(STATUS_COMPLETED) {
            self.rooms.remove(&trip_id);
            return;
        }
        let previous_trip = self
            .rooms
            .get(&trip_id)
            .and_then(|room| room.trip.clone());
        let room = Room {
            trip_id: trip_id.clone(),
            driver_id: payload.driver_id,
            rider_id: payload.rider_id,
            status: payload
                .status
                .unwrap_or_else(|| STATUS_IN_PROGRESS.to_string()),
            pickup: payload.pickup,
            station: payload.station,
            latitude: payload.latitude,
            longitude: payload.longitude,
            updated_at: payload.recorded_at,
            // A location/status event that omits the embedded trip detail
            // must not erase what an earlier event established.
            trip: payload.trip.or(previous_trip),
        };
        self.rooms.insert(trip_id, room);
    }

    fn set_rider_status(&mut self, payload: TripEventPayload) {
        let Some(status) = payload.status.clone() else {
            debug!("dropping rider status without a status field");
            return;
        };
        let status_trip = payload.trip_id.clone();
        self.rider_status = Some(RiderStatus {
            trip_id: payload.trip_id,
            status: status.clone(),
            rider_id: payload.rider_id,
            driver_id: payload.driver_id,
            pickup: payload.pickup,
            station: payload.station,
            latitude: payload.latitude,
            longitude: payload.longitude,
            recorded_at: payload.recorded_at,
            description: payload.description,
        });

        // Self-healing clear: once the trip moved past the approval stage the
        // prompt is stale even if an explicit clear was missed.
        if let (Some(approval), Some(trip_id)) = (&self.approval, status_trip) {
            if approval.trip_id == trip_id && status != STATUS_AWAITING_RIDER {
                self.approval = None;
            }
        }
    }

    fn set_approval(&mut self, payload: ApprovalPayload) {
        let Some(trip_id) = payload.trip_id.filter(|id| !id.is_empty()) else {
            debug!("dropping approval request without trip id");
            return;
        };
        self.approval = Some(ApprovalRequest {
            trip_id,
            driver_id: payload.driver_id,
            driver_name: payload.driver_name,
            pickup: payload.pickup,
            station: payload.station,
        });
    }

    fn cancel_trip(&mut self, cancelled: TripCancelled) {
        self.rooms.remove(&cancelled.trip_id);
        self.last_error = Some(match cancelled.reason {
            Some(reason) => format!("trip {} cancelled: {reason}", cancelled.trip_id),
            None => format!("trip {} cancelled", cancelled.trip_id),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_proto::{ErrorMessage, RiderInfo, SessionAck};
    use serde_json::json;

    fn offer_event(rider_id: &str, attempt: u32, total: u32) -> GatewayEvent {
        GatewayEvent::DriverRiderOffer(OfferPayload {
            rider: RiderInfo {
                id: rider_id.to_string(),
                name: Some(format!("rider {rider_id}")),
                destination: Some("Tech Park".into()),
                pickup_id: None,
                pickup_name: None,
                status: None,
            },
            pickup: None,
            station: None,
            attempt: Some(attempt),
            total: Some(total),
        })
    }

    fn room_created(trip_id: &str, rider_id: &str) -> GatewayEvent {
        GatewayEvent::TripRoomCreated(TripEventPayload {
            trip_id: Some(trip_id.to_string()),
            rider_id: Some(rider_id.to_string()),
            driver_id: Some("d1".into()),
            status: Some(STATUS_AWAITING_PICKUP.into()),
            ..TripEventPayload::default()
        })
    }

    fn trip_status(trip_id: &str, status: &str) -> GatewayEvent {
        GatewayEvent::TripStatus(TripEventPayload {
            trip_id: Some(trip_id.to_string()),
            status: Some(status.to_string()),
            ..TripEventPayload::default()
        })
    }

    fn rider_status(trip_id: Option<&str>, status: &str) -> GatewayEvent {
        GatewayEvent::RiderStatus(TripEventPayload {
            trip_id: trip_id.map(str::to_string),
            rider_id: Some("r1".into()),
            status: Some(status.to_string()),
            recorded_at: Some("2026-08-24T10:00:00Z".into()),
            ..TripEventPayload::default()
        })
    }

    #[test]
    fn at_most_one_offer_per_rider_newest_wins() {
        let mut state = SessionState::default();
        state.apply(offer_event("r1", 1, 3));
        state.apply(offer_event("r2", 1, 3));
        state.apply(offer_event("r1", 2, 3));

        assert_eq!(state.offers.len(), 2);
        assert_eq!(state.offers["r1"].attempt, 2);
        assert_eq!(state.offers["r2"].attempt, 1);
    }

    #[test]
    fn completed_status_removes_the_room() {
        let mut state = SessionState::default();
        state.apply(room_created("T1", "r1"));
        state.apply(GatewayEvent::TripLocation(TripEventPayload {
            trip_id: Some("T1".into()),
            latitude: Some(12.9),
            longitude: Some(77.6),
            status: Some(STATUS_IN_PROGRESS.into()),
            ..TripEventPayload::default()
        }));
        assert_eq!(state.rooms["T1"].latitude, Some(12.9));

        state.apply(trip_status("T1", STATUS_COMPLETED));
        assert!(state.rooms.is_empty());
    }

    #[test]
    fn room_creation_removes_the_matching_offer() {
        let mut state = SessionState::default();
        state.apply(offer_event("r1", 1, 2));
        state.apply(offer_event("r2", 1, 2));
        state.apply(room_created("T1", "r1"));

        assert!(!state.offers.contains_key("r1"));
        assert!(state.offers.contains_key("r2"));
        assert_eq!(state.rooms["T1"].status, STATUS_AWAITING_PICKUP);
    }

    #[test]
    fn merge_preserves_previously_known_trip_detail() {
        let mut state = SessionState::default();
        let trip: Trip =
            serde_json::from_value(json!({ "id": "T1", "destination": "Tech Park" })).unwrap();
        state.apply(GatewayEvent::TripRoomCreated(TripEventPayload {
            trip_id: Some("T1".into()),
            rider_id: Some("r1".into()),
            trip: Some(trip),
            ..TripEventPayload::default()
        }));

        state.apply(GatewayEvent::TripLocation(TripEventPayload {
            trip_id: Some("T1".into()),
            latitude: Some(12.9),
            ..TripEventPayload::default()
        }));

        let trip = state.rooms["T1"].trip.as_ref().expect("trip detail kept");
        assert_eq!(trip.destination.as_deref(), Some("Tech Park"));
        assert_eq!(state.rooms["T1"].latitude, Some(12.9));
    }

    #[test]
    fn rider_status_is_replaced_wholesale() {
        let mut state = SessionState::default();
        state.apply(rider_status(Some("T1"), "matched"));
        state.apply(rider_status(None, "no_drivers"));

        let status = state.rider_status.as_ref().unwrap();
        assert_eq!(status.status, "no_drivers");
        assert_eq!(status.trip_id, None);
    }

    #[test]
    fn approval_clears_when_same_trip_moves_past_awaiting_rider() {
        let mut state = SessionState::default();
        state.apply(GatewayEvent::RiderApprovalRequest(ApprovalPayload {
            trip_id: Some("T2".into()),
            driver_id: Some("d1".into()),
            ..ApprovalPayload::default()
        }));
        assert!(state.approval.is_some());

        // A different trip's status leaves the prompt alone.
        state.apply(rider_status(Some("T9"), STATUS_IN_PROGRESS));
        assert!(state.approval.is_some());

        // Same trip still awaiting approval: keep the prompt.
        state.apply(rider_status(Some("T2"), STATUS_AWAITING_RIDER));
        assert!(state.approval.is_some());

        state.apply(rider_status(Some("T2"), STATUS_IN_PROGRESS));
        assert!(state.approval.is_none());
    }

    #[test]
    fn approval_without_trip_id_is_dropped() {
        let mut state = SessionState::default();
        state.apply(GatewayEvent::RiderApprovalRequest(ApprovalPayload::default()));
        assert!(state.approval.is_none());
    }

    #[test]
    fn events_missing_their_key_leave_state_untouched() {
        let mut state = SessionState::default();
        state.apply(GatewayEvent::TripLocation(TripEventPayload::default()));
        state.apply(GatewayEvent::TripRoomCreated(TripEventPayload::default()));
        state.apply(GatewayEvent::DriverRiderOffer(OfferPayload {
            rider: RiderInfo {
                id: String::new(),
                name: None,
                destination: None,
                pickup_id: None,
                pickup_name: None,
                status: None,
            },
            pickup: None,
            station: None,
            attempt: None,
            total: None,
        }));

        assert!(state.offers.is_empty());
        assert!(state.rooms.is_empty());
    }

    #[test]
    fn disconnect_reset_clears_live_caches() {
        let mut state = SessionState::default();
        state.apply(GatewayEvent::SessionAck(SessionAck::default()));
        state.apply(offer_event("r1", 1, 1));
        state.apply(room_created("T1", "r1"));
        state.apply(rider_status(Some("T1"), STATUS_IN_PROGRESS));
        state.apply(GatewayEvent::DriverRiderQueue(json!({ "requests": [] })));
        assert!(state.ready);

        state.reset_live();

        assert!(!state.ready);
        assert!(state.offers.is_empty());
        assert!(state.rooms.is_empty());
        assert!(state.queue.is_none());
        assert!(state.rider_status.is_none());
        assert!(state.approval.is_none());
    }

    #[test]
    fn cancellation_drops_the_room_and_records_the_reason() {
        let mut state = SessionState::default();
        state.apply(room_created("T3", "r1"));
        state.apply(GatewayEvent::DriverTripCancelled(TripCancelled {
            trip_id: "T3".into(),
            reason: Some("rider_timeout".into()),
        }));

        assert!(state.rooms.is_empty());
        assert_eq!(
            state.last_error.as_deref(),
            Some("trip T3 cancelled: rider_timeout")
        );
    }

    #[test]
    fn gateway_errors_are_surfaced_and_cleared_by_ack() {
        let mut state = SessionState::default();
        state.apply(GatewayEvent::SessionError(ErrorMessage {
            message: Some("role and userId required".into()),
        }));
        assert_eq!(
            state.last_error.as_deref(),
            Some("role and userId required")
        );
        assert!(!state.ready);

        state.apply(GatewayEvent::SessionAck(SessionAck::default()));
        assert!(state.ready);
        assert!(state.last_error.is_none());
    }

    #[test]
    fn offer_room_complete_end_to_end() {
        let mut state = SessionState::default();

        state.apply(offer_event("r1", 1, 2));
        assert_eq!(state.offers.len(), 1);

        state.apply(room_created("t1", "r1"));
        assert!(state.offers.is_empty());
        assert_eq!(state.rooms.len(), 1);
        assert_eq!(state.rooms["t1"].status, STATUS_AWAITING_PICKUP);

        state.apply(trip_status("t1", STATUS_COMPLETED));
        assert!(state.rooms.is_empty());
    }
}
