/// Real-time push channel
///
/// Each upgraded socket registers one connection for the acting user. Pushes
/// queued by the dispatcher are forwarded as text frames in order; inbound
/// frames are read only to notice the close.

use crate::api::{identity::ActingUser, AppState};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

pub fn create_ws_routes() -> Router<AppState> {
    Router::new().route("/ws", get(handler))
}

/// GET /ws
async fn handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ActingUser(user): ActingUser,
) -> impl IntoResponse {
    let dispatcher = state.engine.dispatcher().clone();
    ws.on_upgrade(move |socket| async move {
        let (handle, rx) = dispatcher.connect(&user);
        tracing::info!(
            "🔌 {} connected ({}), {} users online",
            user,
            handle.id,
            dispatcher.presence().online_users()
        );
        process(socket, rx).await;
        dispatcher.disconnect(&handle);
        tracing::info!("🔌 {} disconnected ({})", user, handle.id);
    })
}

/// Forward queued pushes until either side goes away
async fn process(socket: WebSocket, mut rx: mpsc::Receiver<String>) {
    let (mut sink, mut stream) = socket.split();

    let forward = async {
        while let Some(text) = rx.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    };
    let watch = async {
        while let Some(Ok(msg)) = stream.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    };

    tokio::select! {
        _ = forward => {}
        _ = watch => {}
    }
}
