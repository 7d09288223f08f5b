//! Bridge configuration parsing, validation, and the per-session snapshot.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Kind of project being debugged.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProjectKind {
    /// A single Lua script installed into `<user_data>/scripts`.
    Script,
    /// An extension folder installed into `<user_data>/extensions`.
    Extension,
}

impl std::str::FromStr for ProjectKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "script" => Ok(Self::Script),
            "extension" => Ok(Self::Extension),
            other => Err(AppError::Config(format!(
                "unknown project kind '{other}', expected script or extension"
            ))),
        }
    }
}

/// Location of the bundled debugger agent.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Directory containing `out/debugger`, `out/bin/<arch>` and
    /// `assets/getUserConfigPath.lua`.
    pub assets_dir: PathBuf,
    /// Native binary flavour copied next to the agent.
    #[serde(default = "default_arch")]
    pub arch: String,
}

fn default_arch() -> String {
    "x64".into()
}

fn default_ws_port() -> u16 {
    8181
}

fn default_ws_path() -> String {
    "aseprite-debugger".into()
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_output_prefix() -> String {
    "ASEOUT".into()
}

/// Bridge configuration parsed from a TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BridgeConfig {
    /// Workspace folder the debugged source lives in.
    pub workspace_root: PathBuf,
    /// Script or extension.
    pub project_kind: ProjectKind,
    /// Script file or extension folder, relative to `workspace_root`.
    pub source: PathBuf,
    /// Path to the runtime executable.
    pub runtime_exe: PathBuf,
    /// TCP port the runtime agent connects to.
    #[serde(default = "default_ws_port")]
    pub ws_port: u16,
    /// URL path segment of the agent endpoint.
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
    /// How long `start` waits for the agent to connect.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    /// Label prepended to every forwarded runtime output line.
    #[serde(default = "default_output_prefix")]
    pub output_prefix: String,
    /// Debugger agent location.
    pub agent: AgentConfig,
}

impl BridgeConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Re-run validation after CLI overrides were applied.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a field is out of range or the
    /// workspace root does not exist.
    pub fn revalidate(&mut self) -> Result<()> {
        self.validate()
    }

    /// Freeze the configuration into the immutable per-session snapshot.
    #[must_use]
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            project_kind: self.project_kind,
            workspace_root: self.workspace_root.clone(),
            source: self.source.clone(),
            ws_port: self.ws_port,
            ws_path: self.ws_path.trim_matches('/').to_owned(),
            runtime_exe: self.runtime_exe.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_seconds),
            output_prefix: self.output_prefix.clone(),
            agent: self.agent.clone(),
        }
    }

    fn validate(&mut self) -> Result<()> {
        if self.connect_timeout_seconds == 0 {
            return Err(AppError::Config(
                "connect_timeout_seconds must be greater than zero".into(),
            ));
        }

        // The agent is told this port before the endpoint binds.
        if self.ws_port == 0 {
            return Err(AppError::Config("ws_port must not be zero".into()));
        }

        if self.ws_path.trim_matches('/').is_empty() {
            return Err(AppError::Config("ws_path must not be empty".into()));
        }

        if self.source.as_os_str().is_empty() {
            return Err(AppError::Config("source must not be empty".into()));
        }

        let canonical_root = self
            .workspace_root
            .canonicalize()
            .map_err(|err| AppError::Config(format!("workspace_root invalid: {err}")))?;
        self.workspace_root = canonical_root;

        Ok(())
    }
}

/// Immutable configuration of one debugging session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Script or extension.
    pub project_kind: ProjectKind,
    /// Workspace folder the debugged source lives in.
    pub workspace_root: PathBuf,
    /// Script file or extension folder, relative to `workspace_root`.
    pub source: PathBuf,
    /// TCP port of the agent endpoint.
    pub ws_port: u16,
    /// URL path segment of the agent endpoint, without slashes.
    pub ws_path: String,
    /// Path to the runtime executable.
    pub runtime_exe: PathBuf,
    /// Upper bound on the wait for the agent connection.
    pub connect_timeout: Duration,
    /// Label prepended to forwarded runtime output.
    pub output_prefix: String,
    /// Debugger agent location.
    pub agent: AgentConfig,
}

impl SessionConfig {
    /// Absolute path of the debugged source inside the workspace.
    #[must_use]
    pub fn source_path(&self) -> PathBuf {
        self.workspace_root.join(&self.source)
    }

    /// WebSocket URL the agent is told to connect to.
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        format!("ws://127.0.0.1:{}/{}", self.ws_port, self.ws_path)
    }
}
