//! Transport bridge between the session and the runtime agent socket.
//!
//! Inbound runtime messages are classified by their `type`:
//!
//! | Message                          | Handling                                |
//! |----------------------------------|-----------------------------------------|
//! | `event` / `stackTraceUpdate`     | Applied to the [`ShadowStack`], dropped |
//! | any other `event`                | Relayed to the client verbatim          |
//! | `response`                       | Relayed to the client verbatim          |
//! | *(anything else)*                | Skipped; logged at `DEBUG`              |

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::dap::protocol::{ProtocolMessage, Request};
use crate::stack::ShadowStack;
use crate::{AppError, Result};

/// Private event name the agent uses for stack notifications.
pub const STACK_UPDATE_EVENT: &str = "stackTraceUpdate";

// ── Inbound message types ─────────────────────────────────────────────────────

/// Minimal view of a runtime message; only the fields the bridge reads.
#[derive(Debug, Deserialize)]
struct RuntimeEnvelope {
    #[serde(rename = "type")]
    kind: String,
    event: Option<String>,
    body: Option<Value>,
}

/// Body of a `stackTraceUpdate` event.
#[derive(Debug, Deserialize)]
struct StackUpdateBody {
    action: String,
    line: Option<i64>,
    name: Option<String>,
    source: Option<String>,
    pop_count: Option<usize>,
}

/// One decoded stack notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackUpdate {
    /// A function was entered.
    Push {
        /// Source file of the new frame.
        source: String,
        /// Line the frame starts at.
        line: i64,
        /// Function name.
        name: String,
    },
    /// The innermost frame moved to another line.
    UpdateLine {
        /// New line.
        line: i64,
    },
    /// One or more frames returned.
    Pop {
        /// How many frames to drop.
        count: usize,
    },
}

impl StackUpdate {
    /// Apply this notification to `stack`.
    pub fn apply(self, stack: &mut ShadowStack) {
        match self {
            Self::Push { source, line, name } => stack.apply_push(source, line, name),
            Self::UpdateLine { line } => stack.apply_update_line(line),
            Self::Pop { count } => stack.apply_pop(count),
        }
    }
}

/// Classified inbound runtime message.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeMessage {
    /// Internal stack bookkeeping; never shown to the client.
    StackUpdate(StackUpdate),
    /// Event to relay.
    Event(Value),
    /// Response to relay.
    Response(Value),
}

/// Classify one text message received from the runtime.
///
/// # Return value
///
/// - `Ok(Some(message))` for recognized messages.
/// - `Ok(None)` for blank text, unknown message types, and unknown stack
///   actions.
///
/// # Errors
///
/// - `AppError::Protocol("malformed json: …")` if the text is not JSON.
/// - `AppError::Protocol("stackTraceUpdate …")` if a stack notification lacks
///   a field its action requires.
pub fn classify_runtime_message(text: &str) -> Result<Option<RuntimeMessage>> {
    if text.trim().is_empty() {
        return Ok(None);
    }

    let raw: Value = serde_json::from_str(text)?;
    let envelope: RuntimeEnvelope = serde_json::from_value(raw.clone())?;

    match envelope.kind.as_str() {
        "event" if envelope.event.as_deref() == Some(STACK_UPDATE_EVENT) => {
            parse_stack_update(envelope.body).map(|update| update.map(RuntimeMessage::StackUpdate))
        }
        "event" => Ok(Some(RuntimeMessage::Event(raw))),
        "response" => Ok(Some(RuntimeMessage::Response(raw))),
        other => {
            debug!(kind = other, "runtime bridge: skipping unknown message type");
            Ok(None)
        }
    }
}

fn parse_stack_update(body: Option<Value>) -> Result<Option<StackUpdate>> {
    let body = body.ok_or_else(|| AppError::Protocol("stackTraceUpdate without body".into()))?;
    let body: StackUpdateBody = serde_json::from_value(body)
        .map_err(|e| AppError::Protocol(format!("stackTraceUpdate body: {e}")))?;

    let update = match body.action.as_str() {
        "push" => StackUpdate::Push {
            source: body.source.ok_or_else(|| {
                AppError::Protocol("stackTraceUpdate push without source".into())
            })?,
            line: body.line.unwrap_or(0),
            name: body.name.unwrap_or_default(),
        },
        "update_line" => StackUpdate::UpdateLine {
            line: body.line.ok_or_else(|| {
                AppError::Protocol("stackTraceUpdate update_line without line".into())
            })?,
        },
        "pop" => StackUpdate::Pop {
            count: body.pop_count.unwrap_or(0),
        },
        other => {
            debug!(action = other, "runtime bridge: unknown stack action");
            return Ok(None);
        }
    };

    Ok(Some(update))
}

// ── Outbound link ─────────────────────────────────────────────────────────────

/// Sending half of the runtime socket, handed over by the listener once the
/// agent connected. Dropping it closes the socket.
#[derive(Debug, Clone)]
pub struct RuntimeLink {
    outbound: mpsc::UnboundedSender<String>,
}

impl RuntimeLink {
    /// Wrap the queue feeding the socket writer.
    #[must_use]
    pub fn new(outbound: mpsc::UnboundedSender<String>) -> Self {
        Self { outbound }
    }

    /// Whether the socket writer is still draining the queue.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.outbound.is_closed()
    }
}

// ── Bridge ────────────────────────────────────────────────────────────────────

/// Owns the runtime link and the shadow stack it feeds.
#[derive(Debug, Default)]
pub struct RuntimeBridge {
    stack: ShadowStack,
    link: Option<RuntimeLink>,
}

impl RuntimeBridge {
    /// Bridge with no connection and an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the link of the one accepted runtime connection.
    pub fn attach(&mut self, link: RuntimeLink) {
        self.link = Some(link);
    }

    /// Drop the link, closing the runtime socket. Returns whether one was
    /// attached.
    pub fn detach(&mut self) -> bool {
        self.link.take().is_some()
    }

    /// Whether a usable link is attached.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.link.as_ref().is_some_and(RuntimeLink::is_open)
    }

    /// The shadow stack rebuilt from notifications so far.
    #[must_use]
    pub fn stack(&self) -> &ShadowStack {
        &self.stack
    }

    /// Serialize `request` and queue it for the runtime.
    ///
    /// Without a link the request is dropped; reachability is the caller's
    /// decision. Returns whether the request was queued.
    pub fn send(&self, request: &Request) -> bool {
        let Some(link) = self.link.as_ref() else {
            debug!(command = %request.command, "runtime bridge: no link, dropping request");
            return false;
        };

        let text = match serde_json::to_string(&ProtocolMessage::Request(request.clone())) {
            Ok(text) => text,
            Err(e) => {
                warn!(command = %request.command, error = %e, "runtime bridge: serialize failed");
                return false;
            }
        };

        if link.outbound.send(text).is_err() {
            debug!(command = %request.command, "runtime bridge: socket writer gone, dropping request");
            return false;
        }
        true
    }

    /// Handle one inbound text message.
    ///
    /// Stack notifications update the shadow stack and yield `None`; relayable
    /// events and responses are returned for the client.
    ///
    /// # Errors
    ///
    /// Propagates classification errors from [`classify_runtime_message`].
    pub fn handle_inbound(&mut self, text: &str) -> Result<Option<Value>> {
        match classify_runtime_message(text)? {
            Some(RuntimeMessage::StackUpdate(update)) => {
                update.apply(&mut self.stack);
                Ok(None)
            }
            Some(RuntimeMessage::Event(value) | RuntimeMessage::Response(value)) => {
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}
