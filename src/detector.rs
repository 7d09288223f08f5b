//! Fatal script error detection on runtime standard output.
//!
//! The runtime reports uncaught Lua errors as `<path>:<line>: <message>`.
//! Only errors raised from the debugged source tree count; errors from
//! built-in or third-party scripts are plain diagnostic output.

use std::path::{Component, Path, PathBuf};

use regex::Regex;

use crate::{AppError, Result};

/// Lua error line shape. The path is matched lazily so that Windows drive
/// letters and colons inside the message do not confuse the split.
const ERROR_LINE_PATTERN: &str = r"^(?P<path>.+?):(?P<line>\d+):(?P<message>.*)$";

/// Where the debugged source was installed into the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallScope {
    /// A script copied into the runtime's scripts directory.
    Script {
        /// `<user_data>/scripts`.
        scripts_dir: PathBuf,
        /// Workspace folder containing the original script.
        source_dir: PathBuf,
    },
    /// An extension copied into its own directory.
    Extension {
        /// `<user_data>/extensions/<name>`.
        extension_dir: PathBuf,
    },
}

/// A fatal error attributed to the debugged source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    /// Path as printed by the runtime.
    pub path: PathBuf,
    /// Line the error was raised on.
    pub line: u32,
    /// Error text after the line number.
    pub message: String,
}

/// Matches runtime output lines against the installed source tree.
#[derive(Debug, Clone)]
pub struct ErrorDetector {
    scope: InstallScope,
    pattern: Regex,
}

impl ErrorDetector {
    /// Build a detector for `scope`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the error pattern fails to compile.
    pub fn new(scope: InstallScope) -> Result<Self> {
        let pattern = Regex::new(ERROR_LINE_PATTERN)
            .map_err(|e| AppError::Config(format!("invalid error pattern: {e}")))?;
        Ok(Self { scope, pattern })
    }

    /// Inspect one stdout line.
    ///
    /// Returns `None` when the line is not an error line or the error did not
    /// originate from the debugged source.
    #[must_use]
    pub fn inspect(&self, line: &str) -> Option<ErrorReport> {
        let captures = self.pattern.captures(line.trim_end_matches(['\r', '\n']))?;
        let path = PathBuf::from(captures.name("path")?.as_str().trim());
        let line_no: u32 = captures.name("line")?.as_str().parse().ok()?;
        let message = captures.name("message")?.as_str().trim().to_owned();

        if !self.belongs_to_source(&path) {
            return None;
        }

        Some(ErrorReport {
            path,
            line: line_no,
            message,
        })
    }

    fn belongs_to_source(&self, path: &Path) -> bool {
        let path = normalize(path);

        match &self.scope {
            InstallScope::Script {
                scripts_dir,
                source_dir,
            } => {
                let Some(relative) = relative_inside(&path, &normalize(scripts_dir)) else {
                    return false;
                };
                source_dir.join(relative).exists()
            }
            InstallScope::Extension { extension_dir } => {
                relative_inside(&path, &normalize(extension_dir)).is_some()
            }
        }
    }
}

/// Non-empty remainder of `path` below `dir`.
fn relative_inside<'a>(path: &'a Path, dir: &Path) -> Option<&'a Path> {
    path.strip_prefix(dir)
        .ok()
        .filter(|rest| !rest.as_os_str().is_empty())
}

/// Lexically resolve `.` and `..` without touching the file system.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
