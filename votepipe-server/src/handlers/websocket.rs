use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, warn};

use crate::infra::app_state::ResultState;

/// Handle WebSocket upgrade request
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<ResultState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Push viewer events until either side goes away. Anything the client
/// sends other than a close frame is ignored.
async fn handle_socket(socket: WebSocket, state: ResultState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let mut subscription = state.broadcaster.subscribe();
    let viewer = state.viewers.add();
    debug!(viewer_id = %viewer.id, viewers = state.viewers.count(), "viewer connected");

    loop {
        tokio::select! {
            event = subscription.next() => {
                let Some(event) = event else { break };
                let text = match event.to_json() {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(error = %err, "failed to encode viewer event");
                        continue;
                    }
                };
                if ws_sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
                viewer.record_delivery();
            }
            incoming = ws_receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(err)) => {
                    debug!(viewer_id = %viewer.id, error = %err, "viewer socket error");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    state.viewers.remove(&viewer.id);
    debug!(
        viewer_id = %viewer.id,
        delivered = viewer.delivered(),
        "viewer disconnected"
    );
}
