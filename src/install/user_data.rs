//! Discovery of the runtime's user-data directory.
//!
//! The runtime is started once in batch mode with a helper script that
//! prints the directory between two markers:
//! `!<USER_CONFIG_PATH>/home/me/.config/aseprite<USER_CONFIG_PATH>`.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, info};

use crate::{AppError, Result};

/// Helper script location, relative to the agent assets directory.
pub const HELPER_SCRIPT: &str = "./assets/getUserConfigPath.lua";

const OPEN_MARKER: &str = "!<USER_CONFIG_PATH>";
const CLOSE_MARKER: &str = "<USER_CONFIG_PATH>";

/// Extract the user-data path from the helper script's stdout.
///
/// Returns `None` when either marker is missing.
#[must_use]
pub fn parse_user_data_path(stdout: &str) -> Option<PathBuf> {
    let (_, rest) = stdout.split_once(OPEN_MARKER)?;
    let (path, _) = rest.split_once(CLOSE_MARKER)?;
    Some(PathBuf::from(path))
}

/// Run the helper script with `runtime_exe` from `assets_dir`.
///
/// # Errors
///
/// - `AppError::Spawn` if the runtime cannot be started.
/// - `AppError::Config` if its output lacks the path markers.
pub async fn resolve_user_data_path(runtime_exe: &Path, assets_dir: &Path) -> Result<PathBuf> {
    debug!(exe = %runtime_exe.display(), "resolving runtime user-data path");

    let output = Command::new(runtime_exe)
        .args(["-b", "--script", HELPER_SCRIPT])
        .current_dir(assets_dir)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|err| {
            AppError::Spawn(format!(
                "failed to run {} for user-data path: {err}",
                runtime_exe.display()
            ))
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let Some(path) = parse_user_data_path(&stdout) else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AppError::Config(format!(
            "could not get user config path from runtime output\nstdout: {stdout}\nstderr: {stderr}"
        )));
    };

    info!(user_data = %path.display(), "runtime user-data path resolved");
    Ok(path)
}
