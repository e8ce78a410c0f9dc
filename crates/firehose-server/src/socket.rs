//! Axum `WebSocket` adapter: splits an upgraded socket into a
//! [`ChannelTransport`] writer task and an [`Inbound`] stream.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::connection::FirehoseClient;
use crate::firehose::Firehose;
use crate::transport::{ChannelTransport, Inbound, Transport};

/// Map a socket message to an inbound frame. Control frames yield `None`.
fn inbound_frame(msg: Message) -> Option<Inbound> {
    match msg {
        Message::Text(text) => Some(Inbound::Text(text.as_str().to_owned())),
        Message::Binary(bytes) => Some(Inbound::Binary(bytes.to_vec())),
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) => None,
    }
}

/// How long the writer gets to finish the close handshake once reading stops.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Whether to keep reading after `msg`. A close frame moves the transport
/// to [`ReadyState::Closing`](crate::transport::ReadyState::Closing).
fn keep_reading(transport: &ChannelTransport, msg: &Result<Message, axum::Error>) -> bool {
    match msg {
        Ok(Message::Close(_)) => {
            transport.begin_close();
            false
        }
        Ok(_) => true,
        Err(_) => false,
    }
}

/// Serve one upgraded firehose socket until it closes.
#[instrument(skip_all, fields(remote = ?remote))]
pub async fn serve_websocket(
    firehose: Arc<Firehose>,
    socket: WebSocket,
    remote: Option<SocketAddr>,
    send_queue: usize,
) {
    let (mut ws_tx, ws_rx) = socket.split();
    let (transport, mut send_rx) = ChannelTransport::new(remote, send_queue);
    let transport = Arc::new(transport);
    let client = FirehoseClient::new(transport.clone());

    // invokers may hold client clones past close, so the queue alone never ends the writer
    let stop = CancellationToken::new();
    let writer_stop = stop.clone();
    let writer_transport = Arc::clone(&transport);
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                () = writer_stop.cancelled() => break,
                frame = send_rx.recv() => {
                    let Some(frame) = frame else { break };
                    if ws_tx
                        .send(Message::Text(frame.as_str().to_owned().into()))
                        .await
                        .is_err()
                    {
                        writer_transport.mark_closed();
                        return;
                    }
                }
            }
        }
        // answers a peer close, or starts one
        if let Err(e) = ws_tx.close().await {
            debug!(error = %e, "close handshake not completed");
        }
    });

    let reader_transport = Arc::clone(&transport);
    let inbound = ws_rx
        .take_while(move |msg| futures::future::ready(keep_reading(&reader_transport, msg)))
        .filter_map(|msg| futures::future::ready(msg.ok().and_then(inbound_frame)));

    firehose.run_connection(client, inbound).await;

    stop.cancel();
    let abort = writer.abort_handle();
    if tokio::time::timeout(CLOSE_GRACE, writer).await.is_err() {
        warn!("socket writer did not finish closing, aborting");
        abort.abort();
    }
    debug!("firehose socket released");
}
