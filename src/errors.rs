//! Error types shared across the bridge.

use std::fmt::{Display, Formatter};

/// Shared bridge result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Bridge error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure, including a missing
    /// user-data path or package descriptor.
    Config(String),
    /// Copying or removing agent / user source files failed.
    Install(String),
    /// The runtime process could not be launched.
    Spawn(String),
    /// Runtime socket or client stream failure.
    Transport(String),
    /// Malformed protocol frame or message.
    Protocol(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Request received before the runtime connected.
    NotReady(String),
    /// Request received after teardown.
    SessionEnded(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Install(msg) => write!(f, "install: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::NotReady(msg) => write!(f, "not ready: {msg}"),
            Self::SessionEnded(msg) => write!(f, "session ended: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(format!("malformed json: {err}"))
    }
}
