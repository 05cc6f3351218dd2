use crate::error::Error;
use crate::params::stream::ConnectParams;
use async_stream::stream;
use axum::extract::{Query, State};
use axum::response::sse::{Event, Sse};
use futures::Stream;
use log::*;
use service::AppState;
use sse::connection::ConnectionId;
use sse::Manager;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Unregisters its connection when the response stream is dropped. A client
/// abort cancels the generator at whatever await point it is suspended on,
/// so cleanup placed after the loop would never run for that path.
struct ConnectionGuard {
    manager: Arc<Manager>,
    connection_id: ConnectionId,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        debug!("Stream connection closed, cleaning up");
        self.manager.unregister_connection(&self.connection_id);
    }
}

/// Stream handler that establishes a long-lived connection for real-time
/// updates. One connection per browsing context, held open across page
/// navigation until the lifetime cap closes it and the client reconnects.
///
/// Heartbeats are ordinary sequence-stamped frames pushed through the same
/// channel as domain frames, so clients observe one gapless sequence. Axum's
/// comment-based keep-alive is deliberately not used.
#[utoipa::path(
    get,
    path = "/sse",
    params(
        ("identity" = Option<String>, Query, description = "Opaque identity token the connection is registered under")
    ),
    responses(
        (status = 200, description = "Stream established, sequence-stamped frames follow as text/event-stream"),
        (status = 400, description = "Missing or blank identity token")
    )
)]
pub(crate) async fn stream_connect(
    State(app_state): State<AppState>,
    Query(params): Query<ConnectParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, Error> {
    let identity = params.identity()?;

    debug!("Establishing stream connection");

    let (tx, mut rx) = mpsc::unbounded_channel();

    let manager = app_state.sse_manager.clone();
    let connection_id = manager.register_connection(identity, tx);
    manager.send_connect_notice(&connection_id);

    let heartbeat_interval = app_state.config.heartbeat_interval();
    let connection_lifetime = app_state.config.connection_lifetime();

    // Frames arrive from the channel already serialized and stamped. The
    // generator owns the per-connection timers: the heartbeat rides the
    // channel like any other frame, and the lifetime cap ends the stream.
    let stream = stream! {
        let guard = ConnectionGuard { manager, connection_id };

        let mut heartbeat = tokio::time::interval(heartbeat_interval);
        heartbeat.tick().await; // the first tick completes immediately

        let lifetime = tokio::time::sleep(connection_lifetime);
        tokio::pin!(lifetime);

        loop {
            let frame = tokio::select! {
                frame = rx.recv() => frame,
                _ = heartbeat.tick() => {
                    if guard.manager.send_heartbeat(&guard.connection_id) {
                        continue;
                    }
                    // The send failed, so the registry already dropped us.
                    break;
                }
                () = &mut lifetime => {
                    debug!("Stream connection reached its lifetime cap, closing");
                    break;
                }
            };

            match frame {
                Some(frame) => yield frame,
                None => break,
            }
        }
    };

    Ok(Sse::new(stream))
}
