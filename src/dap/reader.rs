//! Client reader task.
//!
//! Decodes `Content-Length` frames from the client's stream, parses each body
//! into a [`ProtocolMessage`], and forwards requests to the session loop.

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::dap::codec::DapCodec;
use crate::dap::protocol::{ProtocolMessage, Request};
use crate::session::SessionInput;
use crate::Result;

/// Parse one frame body into a client request.
///
/// Returns `Ok(None)` for well-formed messages that are not requests; the
/// client has no business sending responses or events to an adapter.
///
/// # Errors
///
/// Returns `AppError::Protocol` if the body is not a valid protocol message.
pub fn parse_client_frame(body: &str) -> Result<Option<Request>> {
    match serde_json::from_str::<ProtocolMessage>(body)? {
        ProtocolMessage::Request(request) => Ok(Some(request)),
        ProtocolMessage::Response(_) | ProtocolMessage::Event(_) => {
            debug!("client reader: ignoring non-request message");
            Ok(None)
        }
    }
}

/// Client reader task: reads frames from `input` and emits
/// [`SessionInput::ClientRequest`] for each request.
///
/// Unparseable bodies are logged and skipped. On EOF or a framing error the
/// task emits [`SessionInput::ClientClosed`] and returns.
///
/// # Cancellation
///
/// When `cancel` fires the task exits without emitting anything.
pub async fn run_reader<R>(
    input: R,
    input_tx: mpsc::Sender<SessionInput>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(input, DapCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("client reader: cancellation received, stopping");
                return;
            }

            item = framed.next() => {
                match item {
                    None => {
                        debug!("client reader: EOF detected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "client reader: framing error, closing");
                        break;
                    }
                    Some(Ok(body)) => match parse_client_frame(&body) {
                        Ok(Some(request)) => {
                            if input_tx.send(SessionInput::ClientRequest(request)).await.is_err() {
                                debug!("client reader: session loop gone, stopping");
                                return;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!(error = %e, raw = %body, "client reader: parse error, skipping frame");
                        }
                    },
                }
            }
        }
    }

    if input_tx.send(SessionInput::ClientClosed).await.is_err() {
        debug!("client reader: session loop gone before ClientClosed");
    }
}
