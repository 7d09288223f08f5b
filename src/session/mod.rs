//! Session controller: the one state machine of a debugging session.
//!
//! All mutation happens on the session loop task, one [`SessionInput`] at a
//! time, so the controller's fields need no locks:
//! - `controller`: dispatch, degraded-mode switch, start and teardown.
//! - `event_loop`: drains the input channel into the controller.
//! - `latch`: one-shot guard making teardown idempotent.

pub mod controller;
pub mod event_loop;
pub mod latch;

pub use controller::{ConnectionState, SessionController};
pub use event_loop::run_session;
pub use latch::TeardownLatch;

use crate::dap::protocol::Request;
use crate::runtime::bridge::RuntimeLink;
use crate::runtime::process::OutputStream;

/// Everything that can happen to a session, from any source.
#[derive(Debug)]
pub enum SessionInput {
    /// The client sent a request.
    ClientRequest(Request),
    /// The client stream reached EOF.
    ClientClosed,
    /// The runtime agent connected to the endpoint.
    RuntimeConnected(RuntimeLink),
    /// One text message from the runtime agent.
    RuntimeText(String),
    /// The runtime socket closed or failed.
    RuntimeDisconnected {
        /// Human-readable cause.
        reason: String,
    },
    /// One line of runtime process output.
    RuntimeOutput {
        /// Stream the line was read from.
        stream: OutputStream,
        /// Line without its terminator.
        line: String,
    },
    /// The runtime process exited on its own.
    RuntimeExited {
        /// Exit code, `None` when killed by a signal.
        code: Option<i32>,
    },
    /// The runtime did not connect within the configured window.
    ConnectTimeout,
    /// The bridge process received a termination signal.
    Shutdown,
}
