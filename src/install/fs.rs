//! File-system installer.
//!
//! Layout inside the runtime's user-data directory:
//!
//! | What                | Where                                           |
//! |---------------------|-------------------------------------------------|
//! | Debugger agent      | `extensions/!AsepriteDebugger/`                 |
//! | Agent settings      | `extensions/!AsepriteDebugger/config.json`      |
//! | Script project      | `scripts/<file name>`                           |
//! | Extension project   | `extensions/<package.json name>/`               |

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{user_data, InstallFuture, InstalledSource, Installer, AGENT_DIR_NAME};
use crate::config::{ProjectKind, SessionConfig};
use crate::detector::InstallScope;
use crate::{AppError, Result};

/// Subset of an extension's `package.json` the installer reads.
#[derive(Debug, Deserialize)]
struct PackageDescriptor {
    name: String,
}

/// Settings the agent reads on startup.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentSettings {
    /// WebSocket URL of the bridge endpoint.
    pub endpoint: String,
    /// Original source in the workspace.
    pub source_dir: String,
    /// Installed copy inside the runtime.
    pub install_dir: String,
}

/// Installs into the runtime's user-data directory on the local disk.
#[derive(Debug, Clone)]
pub struct FsInstaller {
    config: SessionConfig,
}

impl FsInstaller {
    /// Installer for the session described by `config`.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    async fn install_source(&self, user_data: &Path) -> Result<InstalledSource> {
        let source = self.config.source_path();

        match self.config.project_kind {
            ProjectKind::Script => {
                let file_name = source.file_name().ok_or_else(|| {
                    AppError::Config(format!("script source has no file name: {}", source.display()))
                })?;
                let scripts_dir = user_data.join("scripts");
                tokio::fs::create_dir_all(&scripts_dir)
                    .await
                    .map_err(|err| install_error("create scripts dir", &scripts_dir, &err))?;

                let target = scripts_dir.join(file_name);
                tokio::fs::copy(&source, &target)
                    .await
                    .map_err(|err| install_error("copy script", &source, &err))?;

                let source_dir = source
                    .parent()
                    .map_or_else(|| self.config.workspace_root.clone(), Path::to_path_buf);

                info!(target = %target.display(), "script installed");
                Ok(InstalledSource {
                    target,
                    scope: InstallScope::Script {
                        scripts_dir,
                        source_dir,
                    },
                })
            }
            ProjectKind::Extension => {
                let name = read_package_name(&source).await?;
                let target = user_data.join("extensions").join(&name);
                copy_dir_all(&source, &target).await?;

                info!(target = %target.display(), %name, "extension installed");
                Ok(InstalledSource {
                    target: target.clone(),
                    scope: InstallScope::Extension {
                        extension_dir: target,
                    },
                })
            }
        }
    }

    async fn install_agent_files(
        &self,
        user_data: &Path,
        source: &InstalledSource,
    ) -> Result<PathBuf> {
        let agent_dir = user_data.join("extensions").join(AGENT_DIR_NAME);

        // A half-copied agent would load on every later runtime start.
        if let Err(err) = self.populate_agent_dir(&agent_dir, source).await {
            if let Err(cleanup) = remove_path(&agent_dir).await {
                warn!(%cleanup, "failed to remove partial agent install");
            }
            return Err(err);
        }

        info!(agent_dir = %agent_dir.display(), "debugger agent installed");
        Ok(agent_dir)
    }

    async fn populate_agent_dir(&self, agent_dir: &Path, source: &InstalledSource) -> Result<()> {
        let out_dir = self.config.agent.assets_dir.join("out");

        copy_dir_all(&out_dir.join("debugger"), agent_dir).await?;
        copy_dir_all(&out_dir.join("bin").join(&self.config.agent.arch), agent_dir).await?;

        let settings = AgentSettings {
            endpoint: self.config.endpoint_url(),
            source_dir: self.config.source_path().to_string_lossy().into_owned(),
            install_dir: source.target.to_string_lossy().into_owned(),
        };
        let settings_path = agent_dir.join("config.json");
        let bytes = serde_json::to_vec(&settings)?;
        tokio::fs::write(&settings_path, bytes)
            .await
            .map_err(|err| install_error("write agent config", &settings_path, &err))
    }
}

impl Installer for FsInstaller {
    fn resolve_user_data_path(&self) -> InstallFuture<'_, PathBuf> {
        Box::pin(user_data::resolve_user_data_path(
            &self.config.runtime_exe,
            &self.config.agent.assets_dir,
        ))
    }

    fn install_user_source<'a>(&'a self, user_data: &'a Path) -> InstallFuture<'a, InstalledSource> {
        Box::pin(self.install_source(user_data))
    }

    fn install_agent<'a>(
        &'a self,
        user_data: &'a Path,
        source: &'a InstalledSource,
    ) -> InstallFuture<'a, PathBuf> {
        Box::pin(self.install_agent_files(user_data, source))
    }

    fn uninstall_agent<'a>(&'a self, agent_dir: &'a Path) -> InstallFuture<'a, ()> {
        Box::pin(remove_path(agent_dir))
    }

    fn uninstall_user_source<'a>(&'a self, source: &'a InstalledSource) -> InstallFuture<'a, ()> {
        Box::pin(remove_path(&source.target))
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

async fn read_package_name(extension_dir: &Path) -> Result<String> {
    let descriptor_path = extension_dir.join("package.json");
    let raw = match tokio::fs::read(&descriptor_path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(AppError::Config(format!(
                "invalid extension, missing package.json in {}",
                extension_dir.display()
            )));
        }
        Err(err) => return Err(install_error("read", &descriptor_path, &err)),
    };

    let descriptor: PackageDescriptor = serde_json::from_slice(&raw)
        .map_err(|err| AppError::Config(format!("invalid package.json: {err}")))?;

    if descriptor.name.trim().is_empty() {
        return Err(AppError::Config("package.json name must not be empty".into()));
    }
    Ok(descriptor.name)
}

/// Recursively copy `src` into `dst`, merging with existing content.
async fn copy_dir_all(src: &Path, dst: &Path) -> Result<()> {
    let mut pending = vec![(src.to_path_buf(), dst.to_path_buf())];

    while let Some((from, to)) = pending.pop() {
        tokio::fs::create_dir_all(&to)
            .await
            .map_err(|err| install_error("create", &to, &err))?;

        let mut entries = tokio::fs::read_dir(&from)
            .await
            .map_err(|err| install_error("read", &from, &err))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| install_error("read", &from, &err))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|err| install_error("stat", &entry.path(), &err))?;
            let target = to.join(entry.file_name());

            if file_type.is_dir() {
                pending.push((entry.path(), target));
            } else {
                tokio::fs::copy(entry.path(), &target)
                    .await
                    .map_err(|err| install_error("copy", &entry.path(), &err))?;
            }
        }
    }

    Ok(())
}

async fn remove_path(path: &Path) -> Result<()> {
    let metadata = match tokio::fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "nothing to uninstall");
            return Ok(());
        }
        Err(err) => return Err(install_error("stat", path, &err)),
    };

    let result = if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };

    match result {
        Ok(()) => {
            info!(path = %path.display(), "uninstalled");
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(install_error("remove", path, &err)),
    }
}

fn install_error(action: &str, path: &Path, err: &std::io::Error) -> AppError {
    AppError::Install(format!("failed to {action} {}: {err}", path.display()))
}
