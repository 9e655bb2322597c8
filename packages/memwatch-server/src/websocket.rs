use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info};

use crate::state::AppState;

/// Handle WebSocket upgrade for a dashboard connection
pub async fn handle_websocket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Forwards hub events to one connection. The replay is queued atomically
/// at attach; afterwards the subscriber only ever sees live events, in
/// publish order.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (id, mut events) = state.attach_subscriber();
    info!(subscriber = %id, "dashboard connected");

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            event = events.recv() => {
                // None means the hub evicted this subscriber.
                let Some(event) = event else { break };
                match serde_json::to_string(&event) {
                    Ok(json) => {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "failed to serialize event");
                    }
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    // Client chatter is read and discarded.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "websocket receive error");
                        break;
                    }
                }
            }
        }
    }

    state.hub().remove(id);
    info!(subscriber = %id, "dashboard disconnected");
}
