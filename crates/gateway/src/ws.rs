use std::sync::Arc;

use {
    axum::extract::ws::{Message, WebSocket},
    futures::{SinkExt, StreamExt},
    tokio::sync::mpsc,
    tracing::{debug, info},
};

use vstatus_sessions::SessionToken;

use crate::{channel::StatusChannel, state::GatewayState};

/// Serve one status socket until the client disconnects or the channel is
/// closed server-side.
///
/// A write loop drains the channel's queue into the socket; the read loop
/// answers client frames. No idle timeout applies: a status socket may wait
/// as long as its verification flow does.
pub async fn handle_status_socket(
    socket: WebSocket,
    token: SessionToken,
    state: Arc<GatewayState>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(state.outbound_capacity());

    let channel = StatusChannel::open(tx, token, &state.registry);
    let shutdown = channel.shutdown_token();
    state.channel_opened();

    // Ends once the channel drops its sender (close or degrade) and the queue
    // is flushed, or when the socket stops accepting writes.
    let write_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_tx.send(Message::text(frame)).await.is_err() {
                break;
            }
        }
        // The peer may already be gone.
        let _ = ws_tx.send(Message::Close(None)).await;
        let _ = ws_tx.close().await;
    });

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => channel.on_message(text.as_str()),
                Some(Ok(Message::Binary(data))) => {
                    channel.on_message(&String::from_utf8_lossy(&data));
                },
                Some(Ok(Message::Close(frame))) => {
                    match frame {
                        Some(f) => info!(
                            token = %channel.token(),
                            code = f.code,
                            reason = f.reason.as_str(),
                            "status socket closed by client"
                        ),
                        None => info!(token = %channel.token(), "status socket closed by client"),
                    }
                    break;
                },
                // Ping/pong are answered by the websocket layer.
                Some(Ok(_)) => {},
                Some(Err(e)) => {
                    debug!(token = %channel.token(), error = %e, "status socket read error");
                    break;
                },
                None => break,
            },
        }
    }

    channel.close();
    state.channel_closed();
    let _ = write_task.await;
    debug!(token = %channel.token(), "status socket finished");
}
