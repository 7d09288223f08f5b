#![forbid(unsafe_code)]

//! Debug adapter bridging a DAP client to the Aseprite Lua runtime.
//!
//! The runtime cannot speak the debug protocol itself. The bridge installs a
//! small agent into the runtime's user-data directory, launches the runtime,
//! accepts the agent's single WebSocket connection and relays messages both
//! ways. A shadow call stack rebuilt from the agent's notifications keeps
//! stack traces available after the runtime crashed or hung.

pub mod config;
pub mod dap;
pub mod degraded;
pub mod detector;
pub mod errors;
pub mod install;
pub mod runtime;
pub mod session;
pub mod stack;

pub use config::BridgeConfig;
pub use errors::{AppError, Result};
