//! One-shot WebSocket endpoint the runtime agent connects to.
//!
//! Serves `GET /<path>` on `127.0.0.1:<port>`. The first upgrade request is
//! accepted and becomes the session's only runtime connection; any later
//! attempt is answered with `409 Conflict` and never serviced.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::runtime::bridge::RuntimeLink;
use crate::session::SessionInput;
use crate::{AppError, Result};

#[derive(Clone)]
struct EndpointState {
    accepted: Arc<AtomicBool>,
    input_tx: mpsc::Sender<SessionInput>,
    cancel: CancellationToken,
}

/// Handle to the running endpoint. Closing it stops accepting and closes
/// the accepted socket, if any.
#[derive(Debug)]
pub struct RuntimeListener {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RuntimeListener {
    /// Bind the endpoint and start serving it.
    ///
    /// Port `0` binds an ephemeral port; see [`RuntimeListener::local_addr`].
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transport` if the port cannot be bound.
    pub async fn bind(
        port: u16,
        path: &str,
        input_tx: mpsc::Sender<SessionInput>,
    ) -> Result<Self> {
        let bind = SocketAddr::from(([127, 0, 0, 1], port));
        let listener = TcpListener::bind(bind)
            .await
            .map_err(|err| AppError::Transport(format!("failed to bind {bind}: {err}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|err| AppError::Transport(format!("no local address: {err}")))?;

        let cancel = CancellationToken::new();
        let state = EndpointState {
            accepted: Arc::new(AtomicBool::new(false)),
            input_tx,
            cancel: cancel.clone(),
        };

        let route = format!("/{}", path.trim_matches('/'));
        let router = Router::new()
            .route(&route, get(upgrade))
            .with_state(state);

        info!(%local_addr, %route, "runtime endpoint listening");

        let shutdown = cancel.clone();
        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
            {
                warn!(%err, "runtime endpoint server error");
            }
            debug!("runtime endpoint shut down");
        });

        Ok(Self {
            local_addr,
            cancel,
            handle,
        })
    }

    /// Address actually bound.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// URL of the endpoint as seen by a local client.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("ws://{}/{}", self.local_addr, path.trim_matches('/'))
    }

    /// Stop serving and close any accepted socket. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Whether the server task has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

async fn upgrade(State(state): State<EndpointState>, ws: WebSocketUpgrade) -> Response {
    if state.accepted.swap(true, Ordering::SeqCst) {
        warn!("runtime endpoint: rejecting additional connection");
        return (StatusCode::CONFLICT, "runtime already connected").into_response();
    }

    ws.on_upgrade(move |socket| run_connection(socket, state))
}

/// Pump one accepted socket until either side goes away.
async fn run_connection(socket: WebSocket, state: EndpointState) {
    info!("runtime agent connected");

    let (mut sink, mut stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();

    let link = RuntimeLink::new(outbound_tx);
    if state
        .input_tx
        .send(SessionInput::RuntimeConnected(link))
        .await
        .is_err()
    {
        debug!("runtime endpoint: session loop gone before connect");
        return;
    }

    let lost = loop {
        tokio::select! {
            // Queued requests (a final disconnect) drain before shutdown.
            biased;

            outbound = outbound_rx.recv() => match outbound {
                Some(text) => {
                    if let Err(err) = sink.send(Message::Text(text.into())).await {
                        break Some(format!("send failed: {err}"));
                    }
                }
                None => {
                    // The session dropped its link.
                    close_quietly(&mut sink).await;
                    break None;
                }
            },

            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if forward(&state, text.to_string()).await.is_err() {
                        break None;
                    }
                }
                Some(Ok(Message::Binary(bytes))) => {
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    if forward(&state, text).await.is_err() {
                        break None;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    break Some("runtime closed the connection".to_owned());
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => break Some(format!("socket error: {err}")),
            },

            () = state.cancel.cancelled() => {
                close_quietly(&mut sink).await;
                break None;
            }
        }
    };

    if let Some(reason) = lost {
        info!(%reason, "runtime agent disconnected");
        let _ = state
            .input_tx
            .send(SessionInput::RuntimeDisconnected { reason })
            .await;
    }
}

async fn forward(
    state: &EndpointState,
    text: String,
) -> std::result::Result<(), mpsc::error::SendError<SessionInput>> {
    state.input_tx.send(SessionInput::RuntimeText(text)).await
}

async fn close_quietly<S>(sink: &mut S)
where
    S: SinkExt<Message> + Unpin,
{
    if sink.send(Message::Close(None)).await.is_err() {
        debug!("runtime endpoint: close frame not delivered");
    }
}
