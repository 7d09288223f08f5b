//! Everything that talks to the runtime.
//!
//! - `bridge`: classifies inbound agent messages, owns the shadow stack, and
//!   queues outbound requests on the one runtime socket.
//! - `listener`: the one-shot WebSocket endpoint the agent connects to.
//! - `process`: spawning the runtime and pumping its stdout/stderr.

pub mod bridge;
pub mod listener;
pub mod process;
