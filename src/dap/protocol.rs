//! Debug Adapter Protocol message types.
//!
//! Only the envelope and the bodies the bridge fabricates itself are typed;
//! everything the bridge merely relays stays a [`serde_json::Value`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;

// ── Envelopes ────────────────────────────────────────────────────────────────

/// Any protocol message, discriminated by its `type` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProtocolMessage {
    /// Client → adapter (or adapter → runtime) request.
    Request(Request),
    /// Reply to a request.
    Response(Response),
    /// Unsolicited notification.
    Event(Event),
}

impl ProtocolMessage {
    /// Convert to a JSON object ready for the client writer.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Protocol` if serialization fails.
    pub fn into_value(self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// A protocol request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    /// Sequence number assigned by the sender.
    pub seq: i64,
    /// Command name, e.g. `stackTrace`.
    pub command: String,
    /// Command-specific arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

impl Request {
    /// Decode the arguments into a typed structure, falling back to the
    /// type's default when the request carries none.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Protocol` if the arguments have the wrong shape.
    pub fn arguments_as<T>(&self) -> Result<T>
    where
        T: for<'de> Deserialize<'de> + Default,
    {
        match &self.arguments {
            Some(args) => Ok(serde_json::from_value(args.clone())?),
            None => Ok(T::default()),
        }
    }
}

/// A protocol response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    /// Sequence number; rewritten by the client writer.
    pub seq: i64,
    /// Sequence number of the request being answered.
    pub request_seq: i64,
    /// Whether the request succeeded.
    pub success: bool,
    /// Echo of the request command.
    pub command: String,
    /// Error text when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Command-specific body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Response {
    /// Successful response to `request` carrying `body`.
    #[must_use]
    pub fn success(request: &Request, body: Option<Value>) -> Self {
        Self {
            seq: 0,
            request_seq: request.seq,
            success: true,
            command: request.command.clone(),
            message: None,
            body,
        }
    }

    /// Failed response to `request` with a human-readable reason.
    #[must_use]
    pub fn error(request: &Request, message: impl Into<String>) -> Self {
        Self {
            seq: 0,
            request_seq: request.seq,
            success: false,
            command: request.command.clone(),
            message: Some(message.into()),
            body: None,
        }
    }

    /// Wrap in the tagged envelope.
    #[must_use]
    pub fn into_message(self) -> ProtocolMessage {
        ProtocolMessage::Response(self)
    }
}

/// A protocol event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Sequence number; rewritten by the client writer.
    pub seq: i64,
    /// Event name, e.g. `stopped`.
    pub event: String,
    /// Event-specific body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Event {
    /// Build an event with an optional serializable body.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Protocol` if the body cannot be serialized.
    pub fn new<B: Serialize>(event: &str, body: Option<B>) -> Result<Self> {
        let body = body.map(serde_json::to_value).transpose()?;
        Ok(Self {
            seq: 0,
            event: event.to_owned(),
            body,
        })
    }

    /// `stopped` event for all threads.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Protocol` if the body cannot be serialized.
    pub fn stopped(reason: &str, thread_id: i64) -> Result<Self> {
        Self::new(
            "stopped",
            Some(StoppedEventBody {
                reason: reason.to_owned(),
                thread_id: Some(thread_id),
                all_threads_stopped: Some(true),
            }),
        )
    }

    /// `terminated` event.
    #[must_use]
    pub fn terminated() -> Self {
        Self {
            seq: 0,
            event: "terminated".to_owned(),
            body: None,
        }
    }

    /// `exited` event carrying the debuggee exit code.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Protocol` if the body cannot be serialized.
    pub fn exited(exit_code: i64) -> Result<Self> {
        Self::new("exited", Some(ExitedEventBody { exit_code }))
    }

    /// `output` event.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Protocol` if the body cannot be serialized.
    pub fn output(category: &str, output: String) -> Result<Self> {
        Self::new(
            "output",
            Some(OutputEventBody {
                category: Some(category.to_owned()),
                output,
            }),
        )
    }

    /// Wrap in the tagged envelope.
    #[must_use]
    pub fn into_message(self) -> ProtocolMessage {
        ProtocolMessage::Event(self)
    }
}

// ── Bodies ───────────────────────────────────────────────────────────────────

/// Body of the `stopped` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoppedEventBody {
    /// Why execution stopped, e.g. `exception` or `pause`.
    pub reason: String,
    /// Thread that stopped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<i64>,
    /// Whether every thread stopped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_threads_stopped: Option<bool>,
}

/// Body of the `exited` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExitedEventBody {
    /// Debuggee exit code.
    pub exit_code: i64,
}

/// Body of the `output` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutputEventBody {
    /// `console`, `stdout`, `stderr`, ...
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Text to show.
    pub output: String,
}

/// One thread entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    /// Thread identifier.
    pub id: i64,
    /// Display name.
    pub name: String,
}

/// Body of the `threads` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ThreadsResponseBody {
    /// All known threads.
    pub threads: Vec<Thread>,
}

/// Arguments of the `stackTrace` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceArguments {
    /// Thread to retrieve frames for.
    #[serde(default)]
    pub thread_id: i64,
    /// Index of the first frame to return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_frame: Option<i64>,
    /// Maximum number of frames to return; 0 means all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levels: Option<i64>,
}

/// A source reference by path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    /// Absolute path on disk.
    pub path: String,
}

/// One frame of a `stackTrace` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    /// Frame identifier.
    pub id: i64,
    /// Function name.
    pub name: String,
    /// Where the frame executes.
    pub source: Source,
    /// 1-based line.
    pub line: i64,
    /// 1-based column.
    pub column: i64,
}

/// Body of the `stackTrace` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceResponseBody {
    /// Frames in the requested window, innermost first.
    pub stack_frames: Vec<StackFrame>,
    /// Total number of frames available.
    pub total_frames: i64,
}

/// Body of the `scopes` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScopesResponseBody {
    /// Scope list; always empty without a live runtime.
    pub scopes: Vec<Value>,
}

/// Body of the `exceptionInfo` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionInfoResponseBody {
    /// Identifier shown to the user; carries the captured error text.
    pub exception_id: String,
    /// When the exception breaks execution.
    pub break_mode: String,
}

/// Body of the `continue` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContinueResponseBody {
    /// Whether all threads resumed.
    pub all_threads_continued: bool,
}
