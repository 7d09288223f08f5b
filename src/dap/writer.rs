//! Client writer task.
//!
//! Receives outbound protocol messages as JSON objects, stamps each with the
//! adapter's own sequence number, and writes it as a `Content-Length` frame.

use futures_util::SinkExt;
use serde_json::Value;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::dap::codec::DapCodec;
use crate::{AppError, Result};

/// Overwrite the `seq` field of an outbound message.
///
/// Relayed runtime messages carry the runtime's numbering; the client must
/// see one monotonically increasing sequence from the adapter.
pub fn stamp_seq(message: &mut Value, seq: i64) {
    if let Some(object) = message.as_object_mut() {
        object.insert("seq".to_owned(), Value::from(seq));
    }
}

/// Client writer task.
///
/// Exits cleanly when `cancel` fires or every sender of `msg_rx` is dropped;
/// in the latter case all queued messages are flushed first.
///
/// # Errors
///
/// Returns `AppError::Transport` if writing to `output` fails.
pub async fn run_writer<W>(
    output: W,
    mut msg_rx: mpsc::Receiver<Value>,
    cancel: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut framed = FramedWrite::new(output, DapCodec::new());
    let mut next_seq: i64 = 1;

    loop {
        tokio::select! {
            biased;

            msg = msg_rx.recv() => {
                let Some(mut value) = msg else {
                    debug!("client writer: message channel closed, stopping");
                    break;
                };

                stamp_seq(&mut value, next_seq);
                next_seq += 1;

                let text = serde_json::to_string(&value)?;
                framed.send(text).await.map_err(|e| {
                    warn!(error = %e, "client writer: write failed");
                    AppError::Transport(format!("client write failed: {e}"))
                })?;
            }

            () = cancel.cancelled() => {
                debug!("client writer: cancellation received, stopping");
                break;
            }
        }
    }

    Ok(())
}
