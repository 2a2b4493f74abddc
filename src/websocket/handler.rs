//! WebSocket Handler
//!
//! Handles upgrade requests and the per-connection lifecycle. The bearer
//! token arrives as a `token` query parameter and is verified before the
//! connection can touch the hub; rejected handshakes are closed with a
//! policy-violation frame carrying the documented reason.

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::hub::BroadcastHub;
use crate::auth::{AuthError, Identity};
use crate::server::AppState;

/// Handshake query parameters
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// WebSocket upgrade handler
///
/// Token verification runs here, before the upgrade completes, but the
/// close frame for a rejection has to travel over the upgraded socket,
/// so the outcome rides along into the socket task.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let auth = state.verifier.authenticate(query.token.as_deref());
    let hub = Arc::clone(&state.hub);
    ws.on_upgrade(move |socket| handle_socket(socket, hub, auth))
}

/// Handle an established WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    hub: Arc<BroadcastHub>,
    auth: Result<Identity, AuthError>,
) {
    let identity = match auth {
        Ok(identity) => identity,
        Err(e) => {
            reject(socket, e).await;
            return;
        }
    };

    let (connection_id, outbound) = match hub.register(identity).await {
        Ok(pair) => pair,
        Err(e) => {
            tracing::warn!(error = %e, "Refusing connection");
            close_with(socket, close_code::AGAIN, "too many connections").await;
            return;
        }
    };

    let (sender, receiver) = socket.split();

    let mut send_task = tokio::spawn(write_outbound(sender, outbound));
    let mut recv_task = tokio::spawn(drain_inbound(receiver, connection_id.clone()));

    // Whichever side finishes first tears the other down
    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    hub.unregister(&connection_id).await;
}

/// Close a rejected handshake with a policy-violation frame
async fn reject(mut socket: WebSocket, error: AuthError) {
    tracing::warn!(reason = error.close_reason(), "Connection rejected");
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: error.close_reason().into(),
        })))
        .await;
}

async fn close_with(mut socket: WebSocket, code: u16, reason: &'static str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await;
}

/// Forward serialized events from the hub queue to the socket
///
/// Ends when the socket write fails (peer vanished) or when the hub drops
/// the queue, in which case the peer gets a going-away frame.
async fn write_outbound(
    mut sender: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<String>,
) {
    while let Some(text) = outbound.recv().await {
        if sender.send(Message::Text(text)).await.is_err() {
            return;
        }
    }

    let _ = sender
        .send(Message::Close(Some(CloseFrame {
            code: close_code::AWAY,
            reason: "server shutting down".into(),
        })))
        .await;
}

/// Drain inbound frames until the peer closes or errors
///
/// The relay is one-way; client frames carry no commands. Text and binary
/// frames are ignored, ping/pong is handled by axum.
async fn drain_inbound(mut receiver: SplitStream<WebSocket>, connection_id: String) {
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Close(_)) => {
                tracing::debug!(connection_id = %connection_id, "Client requested close");
                break;
            }
            Ok(Message::Text(_)) | Ok(Message::Binary(_)) => {
                tracing::debug!(
                    connection_id = %connection_id,
                    "Ignoring client frame on one-way stream"
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(
                    connection_id = %connection_id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Uri;

    #[test]
    fn test_token_query_parsing() {
        let uri: Uri = "/ws?token=abc.def.ghi".parse().unwrap();
        let Query(query): Query<WsQuery> = Query::try_from_uri(&uri).unwrap();
        assert_eq!(query.token.as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_missing_token_query() {
        let uri: Uri = "/ws".parse().unwrap();
        let Query(query): Query<WsQuery> = Query::try_from_uri(&uri).unwrap();
        assert_eq!(query.token, None);
    }
}
