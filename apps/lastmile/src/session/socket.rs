//! Transport adapter around the gateway's websocket event channel. Owns the
//! connection and its reconnect loop; the session layer only sees a stream
//! of [`SocketEvent`]s and an outbound sender for client events.

use futures_util::{SinkExt, StreamExt};
use gateway_proto::{ClientEvent, GatewayEvent};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};
use url::Url;

const RECONNECT_STEP: Duration = Duration::from_secs(1);
const RECONNECT_MAX: Duration = Duration::from_secs(15);

/// Transport notifications delivered to the session layer, in order.
#[derive(Debug)]
pub enum SocketEvent {
    Connected,
    Event(GatewayEvent),
    Disconnected,
}

/// Handle to a running socket task. Dropping it tears the connection down.
pub struct SocketHandle {
    outbound: mpsc::UnboundedSender<ClientEvent>,
    task: tokio::task::JoinHandle<()>,
}

impl SocketHandle {
    /// Spawns the socket task for `url` and returns the handle plus the
    /// inbound event stream.
    pub fn spawn(url: Url) -> (Self, mpsc::UnboundedReceiver<SocketEvent>) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_socket(url, outbound_rx, inbound_tx));
        (Self { outbound, task }, inbound_rx)
    }

    /// Queues an event for delivery on the live connection. Returns false if
    /// the socket task has already shut down.
    pub fn send(&self, event: ClientEvent) -> bool {
        self.outbound.send(event).is_ok()
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<ClientEvent> {
        self.outbound.clone()
    }
}

impl Drop for SocketHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_socket(
    url: Url,
    mut outbound: mpsc::UnboundedReceiver<ClientEvent>,
    inbound: mpsc::UnboundedSender<SocketEvent>,
) {
    let mut failures: u32 = 0;
    loop {
        match connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                failures = 0;
                debug!(url = %url, "event channel connected");
                if inbound.send(SocketEvent::Connected).is_err() {
                    return;
                }
                run_connection(stream, &mut outbound, &inbound).await;
                debug!(url = %url, "event channel disconnected");
                if inbound.send(SocketEvent::Disconnected).is_err() {
                    return;
                }
            }
            Err(err) => {
                failures = failures.saturating_add(1);
                debug!(url = %url, error = %err, failures, "event channel connect failed");
            }
        }

        // Commands issued while offline are best-effort no-ops, not a queue
        // to replay against the next connection.
        while outbound.try_recv().is_ok() {}

        let backoff = RECONNECT_STEP
            .saturating_mul(failures.saturating_add(1))
            .min(RECONNECT_MAX);
        trace!(?backoff, "waiting before reconnect attempt");
        sleep(backoff).await;
    }
}

async fn run_connection(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    outbound: &mut mpsc::UnboundedReceiver<ClientEvent>,
    inbound: &mpsc::UnboundedSender<SocketEvent>,
) {
    let (mut sink, mut source) = stream.split();
    loop {
        tokio::select! {
            queued = outbound.recv() => match queued {
                Some(event) => match event.encode() {
                    Ok(text) => {
                        if let Err(err) = sink.send(Message::Text(text)).await {
                            debug!(error = %err, "outbound send failed");
                            break;
                        }
                    }
                    Err(err) => warn!(error = %err, "failed to encode outbound event"),
                },
                // Session handle dropped; the task is about to be aborted.
                None => break,
            },
            received = source.next() => match received {
                Some(Ok(Message::Text(text))) => match GatewayEvent::decode(&text) {
                    Ok(event) => {
                        if inbound.send(SocketEvent::Event(event)).is_err() {
                            break;
                        }
                    }
                    // Malformed or unknown frames are dropped silently.
                    Err(err) => debug!(error = %err, "dropping undecodable frame"),
                },
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_))) => {}
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}
