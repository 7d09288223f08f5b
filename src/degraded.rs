//! Responses synthesized without a live runtime connection.
//!
//! Once the runtime crashed, hung or dropped its socket, the only state left
//! is the shadow stack and the captured error text. The responder answers the
//! queries a client needs to show the user where things went wrong.

use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::dap::protocol::{
    ContinueResponseBody, ExceptionInfoResponseBody, Request, Response, ScopesResponseBody,
    Source, StackFrame, StackTraceArguments, StackTraceResponseBody, Thread, ThreadsResponseBody,
};
use crate::stack::ShadowStack;
use crate::Result;

/// Identifier of the single synthetic thread.
pub const MAIN_THREAD_ID: i64 = 1;

/// Display name of the single synthetic thread.
pub const MAIN_THREAD_NAME: &str = "Main Thread";

/// Identifier given to every synthetic frame; no variables can be fetched
/// for any of them.
pub const PLACEHOLDER_FRAME_ID: i64 = 0;

/// Column reported for every synthetic frame.
pub const FRAME_COLUMN: i64 = 1;

/// Frame window used when the client does not bound `levels`.
pub const DEFAULT_LEVELS: usize = 1000;

/// Outcome of answering a request in degraded mode.
#[derive(Debug, Clone, PartialEq)]
pub enum DegradedReply {
    /// Send this response.
    Respond(Response),
    /// Send this response, then end the session.
    RespondAndTerminate(Response),
    /// The command cannot be served without the runtime; send this error.
    Unavailable(Response),
}

type SourceFilter = Box<dyn Fn(&Path) -> bool + Send + Sync>;

/// Answers a fixed subset of requests from locally cached state.
pub struct DegradedResponder {
    source_exists: SourceFilter,
}

impl std::fmt::Debug for DegradedResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DegradedResponder").finish_non_exhaustive()
    }
}

impl Default for DegradedResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl DegradedResponder {
    /// Responder that hides frames whose source is missing on disk.
    #[must_use]
    pub fn new() -> Self {
        Self::with_source_filter(Path::exists)
    }

    /// Responder with a custom source-existence predicate.
    #[must_use]
    pub fn with_source_filter<F>(filter: F) -> Self
    where
        F: Fn(&Path) -> bool + Send + Sync + 'static,
    {
        Self {
            source_exists: Box::new(filter),
        }
    }

    /// Answer `request` using `stack` and the captured error message.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Protocol` if the request arguments are malformed or
    /// a body fails to serialize.
    pub fn respond(
        &self,
        request: &Request,
        stack: &ShadowStack,
        error_message: Option<&str>,
    ) -> Result<DegradedReply> {
        let reply = match request.command.as_str() {
            "threads" => DegradedReply::Respond(success(
                request,
                &ThreadsResponseBody {
                    threads: vec![Thread {
                        id: MAIN_THREAD_ID,
                        name: MAIN_THREAD_NAME.to_owned(),
                    }],
                },
            )?),
            "scopes" => {
                DegradedReply::Respond(success(request, &ScopesResponseBody::default())?)
            }
            "stackTrace" => DegradedReply::Respond(self.stack_trace(request, stack)?),
            "exceptionInfo" => DegradedReply::Respond(success(
                request,
                &ExceptionInfoResponseBody {
                    exception_id: error_message.unwrap_or_default().to_owned(),
                    break_mode: "always".to_owned(),
                },
            )?),
            "continue" => DegradedReply::RespondAndTerminate(success(
                request,
                &ContinueResponseBody {
                    all_threads_continued: true,
                },
            )?),
            other => {
                debug!(command = other, "degraded: no cached answer");
                DegradedReply::Unavailable(Response::error(
                    request,
                    format!("resource unavailable: '{other}' needs a live runtime connection"),
                ))
            }
        };

        Ok(reply)
    }

    fn stack_trace(&self, request: &Request, stack: &ShadowStack) -> Result<Response> {
        let args: StackTraceArguments = request.arguments_as()?;
        let start = args
            .start_frame
            .and_then(|s| usize::try_from(s).ok())
            .unwrap_or(0);
        let levels = args
            .levels
            .and_then(|l| usize::try_from(l).ok())
            .filter(|l| *l > 0)
            .unwrap_or(DEFAULT_LEVELS);

        let snapshot = stack.snapshot(start, levels, |path| (self.source_exists)(path));

        let body = StackTraceResponseBody {
            stack_frames: snapshot
                .frames
                .into_iter()
                .map(|frame| StackFrame {
                    id: PLACEHOLDER_FRAME_ID,
                    name: frame.name,
                    source: Source { path: frame.source },
                    line: frame.line,
                    column: FRAME_COLUMN,
                })
                .collect(),
            total_frames: i64::try_from(snapshot.total).unwrap_or(i64::MAX),
        };

        success(request, &body)
    }
}

fn success<B: Serialize>(request: &Request, body: &B) -> Result<Response> {
    Ok(Response::success(request, Some(serde_json::to_value(body)?)))
}
