//! Installation of the debugger agent and the user's source into the
//! runtime's user-data directory.
//!
//! The session controller only sees the [`Installer`] trait; [`FsInstaller`]
//! is the file-system implementation used by the binary.

pub mod fs;
pub mod user_data;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

pub use fs::FsInstaller;

use crate::detector::InstallScope;
use crate::Result;

/// Directory name of the installed agent. The leading `!` makes the runtime
/// load it before any other extension.
pub const AGENT_DIR_NAME: &str = "!AsepriteDebugger";

/// Boxed future returned by [`Installer`] methods.
pub type InstallFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Where the user's source ended up after installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledSource {
    /// Copied script file or extension directory.
    pub target: PathBuf,
    /// Scope the error detector attributes errors to.
    pub scope: InstallScope,
}

/// Installation collaborators of a session.
///
/// Every operation is safe to retry once per session.
pub trait Installer: Send + Sync {
    /// Ask the runtime where its user data lives.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the path cannot be determined.
    fn resolve_user_data_path(&self) -> InstallFuture<'_, PathBuf>;

    /// Copy the user's script or extension into `user_data`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for a missing package descriptor and
    /// `AppError::Install` for copy failures.
    fn install_user_source<'a>(&'a self, user_data: &'a Path) -> InstallFuture<'a, InstalledSource>;

    /// Copy the agent into `user_data` and point it at the bridge.
    /// Returns the agent directory.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Install` on copy or write failures.
    fn install_agent<'a>(
        &'a self,
        user_data: &'a Path,
        source: &'a InstalledSource,
    ) -> InstallFuture<'a, PathBuf>;

    /// Remove the agent directory.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Install` if removal fails for a reason other than
    /// the directory being absent.
    fn uninstall_agent<'a>(&'a self, agent_dir: &'a Path) -> InstallFuture<'a, ()>;

    /// Remove the installed user source.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Install` if removal fails for a reason other than
    /// the target being absent.
    fn uninstall_user_source<'a>(&'a self, source: &'a InstalledSource) -> InstallFuture<'a, ()>;
}
