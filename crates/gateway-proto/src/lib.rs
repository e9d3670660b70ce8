//! Wire contract for the ride-matching gateway's realtime event channel.
//! Keeping this in a dedicated crate allows regeneration of bindings for
//! the web/mobile clients without pulling in the runtime.
//!
//! Frames are JSON text messages of the shape `{"event": <name>, "payload": <value>}`.
//! The `event`/`payload` envelope maps directly onto the adjacently tagged
//! enums below, so encode/decode is a single serde round trip.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Trip status the gateway reports when a room is finished; the client
/// prunes the room on sight of it.
pub const STATUS_COMPLETED: &str = "completed";
/// Status a trip holds while the rider has a pending approval prompt.
pub const STATUS_AWAITING_RIDER: &str = "awaiting_rider";
/// Initial status of a freshly created trip room.
pub const STATUS_AWAITING_PICKUP: &str = "awaiting_pickup";
/// Status a room falls back to when an update omits one.
pub const STATUS_IN_PROGRESS: &str = "in_progress";

#[derive(Error, Debug)]
pub enum ProtoError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Driver,
    Rider,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Driver => "driver",
            Role::Rider => "rider",
        }
    }
}

/// Geographic reference supplied by the gateway. Treated as opaque display
/// data by the client; only `id` is required for identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickupPoint {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub station_id: Option<String>,
    #[serde(default)]
    pub station_name: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub nearby_areas: Vec<String>,
    #[serde(default)]
    pub load_factor: Option<f64>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// Trip detail the gateway embeds in room events. Passed through to the
/// consumer; the client never interprets anything beyond `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub id: String,
    #[serde(default)]
    pub driver_id: Option<String>,
    #[serde(default)]
    pub rider_id: Option<String>,
    #[serde(default)]
    pub station_id: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub pickup_point_id: Option<String>,
    #[serde(default)]
    pub pickup: Option<PickupPoint>,
    #[serde(default)]
    pub eta_minutes: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub room_id: Option<String>,
}

/// Rider summary embedded in offer and room payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiderInfo {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub pickup_id: Option<String>,
    #[serde(default)]
    pub pickup_name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// `driver:rider-offer` payload. `attempt`/`total` are advisory display
/// counters supplied by the gateway with no validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferPayload {
    pub rider: RiderInfo,
    #[serde(default)]
    pub pickup: Option<PickupPoint>,
    #[serde(default)]
    pub station: Option<Station>,
    #[serde(default)]
    pub attempt: Option<u32>,
    #[serde(default)]
    pub total: Option<u32>,
}

/// Shared payload shape for `trip:room-created`, `trip:location`,
/// `trip:status` and `rider:status`. Room-creation events may carry the trip
/// id either at the top level or inside the embedded trip detail.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripEventPayload {
    #[serde(default)]
    pub trip_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub driver_id: Option<String>,
    #[serde(default)]
    pub rider_id: Option<String>,
    #[serde(default)]
    pub pickup: Option<PickupPoint>,
    #[serde(default)]
    pub station: Option<Station>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub recorded_at: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub trip: Option<Trip>,
    #[serde(default)]
    pub rider: Option<RiderInfo>,
}

impl TripEventPayload {
    /// Trip id from the top-level field, falling back to the embedded trip.
    pub fn resolved_trip_id(&self) -> Option<&str> {
        self.trip_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .or_else(|| self.trip.as_ref().map(|trip| trip.id.as_str()))
            .filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalPayload {
    #[serde(default)]
    pub trip_id: Option<String>,
    #[serde(default)]
    pub driver_id: Option<String>,
    #[serde(default)]
    pub driver_name: Option<String>,
    #[serde(default)]
    pub pickup: Option<PickupPoint>,
    #[serde(default)]
    pub station: Option<Station>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInit {
    pub role: Role,
    pub user_id: String,
    pub name: String,
}

/// `session:ack` payload. Arrival alone flips readiness; the fields are
/// echoes of the init and are not consumed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionAck {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripCancelled {
    pub trip_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Events emitted by the client over the event channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum ClientEvent {
    #[serde(rename = "session:init")]
    SessionInit(SessionInit),
    #[serde(rename = "driver:rider-response", rename_all = "camelCase")]
    DriverRiderResponse { rider_id: String, accept: bool },
    /// Bare trip id as payload, matching the gateway handler signature.
    #[serde(rename = "trip:complete")]
    TripComplete(String),
    #[serde(rename = "rider:approval-response", rename_all = "camelCase")]
    RiderApprovalResponse { trip_id: String, accept: bool },
}

impl ClientEvent {
    pub fn encode(&self) -> Result<String, ProtoError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, ProtoError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Events the gateway pushes to a connected client. Unknown event names fail
/// to decode and are dropped by the transport adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum GatewayEvent {
    #[serde(rename = "session:ack")]
    SessionAck(SessionAck),
    #[serde(rename = "session:error")]
    SessionError(ErrorMessage),
    /// Opaque queue summary, passed through to the consumer unmodified.
    #[serde(rename = "driver:rider-queue")]
    DriverRiderQueue(Value),
    #[serde(rename = "driver:rider-offer")]
    DriverRiderOffer(OfferPayload),
    #[serde(rename = "driver:rider-error")]
    DriverRiderError(ErrorMessage),
    #[serde(rename = "driver:trip-cancelled")]
    DriverTripCancelled(TripCancelled),
    #[serde(rename = "trip:room-created")]
    TripRoomCreated(TripEventPayload),
    #[serde(rename = "trip:location")]
    TripLocation(TripEventPayload),
    #[serde(rename = "trip:status")]
    TripStatus(TripEventPayload),
    #[serde(rename = "rider:status")]
    RiderStatus(TripEventPayload),
    #[serde(rename = "rider:approval-request")]
    RiderApprovalRequest(ApprovalPayload),
}

impl GatewayEvent {
    pub fn encode(&self) -> Result<String, ProtoError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, ProtoError> {
        Ok(serde_json::from_str(text)?)
    }
}
