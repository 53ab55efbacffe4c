//! Live price updates over WebSocket.
//!
//! Each subscriber gets its own frame channel from the hub. The socket task
//! enforces a write deadline per frame, pings every 30 seconds, and closes
//! the connection when the client stays silent past the liveness deadline.
//! There is no replay: clients that miss frames resynchronize through the
//! query endpoints.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use tracing::debug;

use crate::api::routes::AppState;
use crate::trade::PriceFeedHub;

const WRITE_DEADLINE: Duration = Duration::from_secs(10);
const PING_INTERVAL: Duration = Duration::from_secs(30);
const LIVENESS_DEADLINE: Duration = Duration::from_secs(60);

/// GET /api/v1/ws upgrade handler.
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub.clone()))
}

async fn handle_socket(socket: WebSocket, hub: Arc<PriceFeedHub>) {
    let (id, mut updates) = hub.subscribe();
    let (mut sink, mut stream) = socket.split();

    let mut ping = interval(PING_INTERVAL);
    ping.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(update) = update else { break };
                if !send_with_deadline(&mut sink, Message::Text(update)).await {
                    break;
                }
            }
            _ = ping.tick() => {
                if last_seen.elapsed() > LIVENESS_DEADLINE {
                    debug!(subscriber = id, "ws liveness deadline missed");
                    break;
                }
                if !send_with_deadline(&mut sink, Message::Ping(Vec::new())).await {
                    break;
                }
            }
            // The read half exists only to observe pongs and disconnects.
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => last_seen = Instant::now(),
                }
            }
        }
    }

    hub.unsubscribe(id);
    debug!(subscriber = id, "ws client disconnected");
}

async fn send_with_deadline<S>(sink: &mut S, message: Message) -> bool
where
    S: Sink<Message> + Unpin,
{
    matches!(
        timeout(WRITE_DEADLINE, sink.send(message)).await,
        Ok(Ok(()))
    )
}
