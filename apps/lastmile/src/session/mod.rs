//! Realtime session: one live event-channel connection per signed-in
//! identity, the session handshake, optimistic command emission, and the
//! read-only consumer surface over the event cache.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use gateway_proto::{ClientEvent, Role, SessionInit};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};
use url::Url;

use crate::config::{ConfigError, GatewayConfig};
use crate::state::SessionState;

pub mod socket;

use socket::{SocketEvent, SocketHandle};

/// Fallback announce name when the identity carries no usable name.
pub const DEFAULT_DISPLAY_NAME: &str = "LastMile User";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Signed-in identity, supplied by the caller's auth layer. Changing it (or
/// clearing it) tears the connection down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub role: Role,
    pub user_id: String,
    pub display_name: Option<String>,
    pub account_name: Option<String>,
    pub email: Option<String>,
}

impl Identity {
    pub fn new(role: Role, user_id: impl Into<String>) -> Self {
        Self {
            role,
            user_id: user_id.into(),
            display_name: None,
            account_name: None,
            email: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Name announced in the handshake: display name, account name, email,
    /// then the generic fallback.
    pub fn announce_name(&self) -> String {
        [&self.display_name, &self.account_name, &self.email]
            .into_iter()
            .flatten()
            .map(|name| name.trim())
            .find(|name| !name.is_empty())
            .unwrap_or(DEFAULT_DISPLAY_NAME)
            .to_string()
    }

    /// Two identities drive the same connection iff role and user id match.
    fn same_session(&self, other: &Identity) -> bool {
        self.role == other.role && self.user_id == other.user_id
    }
}

struct Connection {
    identity: Identity,
    socket: SocketHandle,
    connected: Arc<AtomicBool>,
    pump: tokio::task::JoinHandle<()>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

struct Inner {
    state: Mutex<SessionState>,
    updates: watch::Sender<SessionState>,
    conn: Mutex<Option<Connection>>,
}

impl Inner {
    fn publish(&self) {
        let snapshot = self.state.lock().clone();
        let _ = self.updates.send(snapshot);
    }
}

/// Handle to the realtime session. Cheap to clone; all clones share the same
/// connection and cache.
#[derive(Clone)]
pub struct RealtimeSession {
    socket_url: Url,
    inner: Arc<Inner>,
}

impl RealtimeSession {
    pub fn new(config: GatewayConfig) -> Result<Self, SessionError> {
        let socket_url = config.websocket_url()?;
        let (updates, _) = watch::channel(SessionState::default());
        Ok(Self {
            socket_url,
            inner: Arc::new(Inner {
                state: Mutex::new(SessionState::default()),
                updates,
                conn: Mutex::new(None),
            }),
        })
    }

    /// Reacts to identity changes: absent identity closes the connection;
    /// a different identity closes and reopens; the same identity is a
    /// no-op. Every teardown resets the caches to a clean slate.
    pub fn set_identity(&self, identity: Option<Identity>) {
        let mut conn = self.inner.conn.lock();
        if let (Some(existing), Some(next)) = (conn.as_ref(), identity.as_ref()) {
            if existing.identity.same_session(next) {
                trace!(user_id = %next.user_id, "identity unchanged, keeping connection");
                return;
            }
        }
        if conn.is_none() && identity.is_none() {
            return;
        }

        *conn = None; // drop tears down socket and pump
        self.inner.state.lock().reset_live();

        if let Some(identity) = identity {
            debug!(role = identity.role.as_str(), user_id = %identity.user_id, "opening event channel");
            let (socket, events) = SocketHandle::spawn(self.socket_url.clone());
            let connected = Arc::new(AtomicBool::new(false));
            let pump = tokio::spawn(pump_events(
                Arc::clone(&self.inner),
                identity.clone(),
                socket.sender(),
                events,
                Arc::clone(&connected),
            ));
            *conn = Some(Connection {
                identity,
                socket,
                connected,
                pump,
            });
        }
        drop(conn);
        self.inner.publish();
    }

    /// Equivalent to `set_identity(None)`.
    pub fn close(&self) {
        self.set_identity(None);
    }

    /// Immutable snapshot of the cached session state.
    pub fn snapshot(&self) -> SessionState {
        self.inner.state.lock().clone()
    }

    /// Subscription that yields a fresh snapshot after every cache change.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.updates.subscribe()
    }

    pub fn ready(&self) -> bool {
        self.inner.state.lock().ready
    }

    /// Responds to a pending offer. Declining removes the offer locally at
    /// once; accepting leaves it in place until the gateway confirms with a
    /// `trip:room-created` event (another driver may win the rider).
    pub fn respond_to_offer(&self, rider_id: &str, accept: bool) {
        self.emit(ClientEvent::DriverRiderResponse {
            rider_id: rider_id.to_string(),
            accept,
        });
        if !accept {
            self.inner.state.lock().offers.remove(rider_id);
            self.inner.publish();
        }
    }

    /// Asks the gateway to complete a trip. No optimistic removal: the room
    /// is pruned by the authoritative `trip:status` completed event.
    pub fn complete_trip(&self, trip_id: &str) {
        self.emit(ClientEvent::TripComplete(trip_id.to_string()));
    }

    /// Responds to the pending approval prompt. The local prompt is cleared
    /// immediately regardless of accept or decline.
    pub fn respond_to_approval(&self, trip_id: &str, accept: bool) {
        if trip_id.is_empty() {
            return;
        }
        self.emit(ClientEvent::RiderApprovalResponse {
            trip_id: trip_id.to_string(),
            accept,
        });
        self.inner.state.lock().approval = None;
        self.inner.publish();
    }

    /// Silent no-op when there is no live connection.
    fn emit(&self, event: ClientEvent) {
        let conn = self.inner.conn.lock();
        match conn.as_ref() {
            Some(conn) if conn.connected.load(Ordering::SeqCst) => {
                conn.socket.send(event);
            }
            Some(_) => trace!("dropping command while transport is offline"),
            None => trace!("dropping command without a session identity"),
        }
    }
}

async fn pump_events(
    inner: Arc<Inner>,
    identity: Identity,
    outbound: mpsc::UnboundedSender<ClientEvent>,
    mut events: mpsc::UnboundedReceiver<SocketEvent>,
    connected: Arc<AtomicBool>,
) {
    while let Some(event) = events.recv().await {
        match event {
            SocketEvent::Connected => {
                connected.store(true, Ordering::SeqCst);
                let init = ClientEvent::SessionInit(SessionInit {
                    role: identity.role,
                    user_id: identity.user_id.clone(),
                    name: identity.announce_name(),
                });
                let _ = outbound.send(init);
                debug!(user_id = %identity.user_id, "announced session identity");
            }
            SocketEvent::Disconnected => {
                connected.store(false, Ordering::SeqCst);
                inner.state.lock().reset_live();
                inner.publish();
            }
            SocketEvent::Event(event) => {
                trace!(?event, "applying gateway event");
                inner.state.lock().apply(event);
                inner.publish();
            }
        }
    }
}
