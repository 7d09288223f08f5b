//! Unit tests for the file-system installer.
//!
//! Validates:
//! - script and extension sources land in the runtime's user-data tree
//! - a missing `package.json` is a configuration error
//! - the agent is copied together with its `config.json`, and a failed copy
//!   leaves nothing behind
//! - uninstall removes what was installed and tolerates absent targets

use std::path::{Path, PathBuf};
use std::time::Duration;

use aseprite_dap::config::{AgentConfig, ProjectKind, SessionConfig};
use aseprite_dap::detector::InstallScope;
use aseprite_dap::install::fs::AgentSettings;
use aseprite_dap::install::{FsInstaller, Installer, AGENT_DIR_NAME};
use aseprite_dap::AppError;

struct Fixture {
    _dir: tempfile::TempDir,
    workspace: PathBuf,
    user_data: PathBuf,
    assets: PathBuf,
}

fn write(path: &Path, contents: &str) {
    std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    std::fs::write(path, contents).expect("write");
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let workspace = dir.path().join("workspace");
    let user_data = dir.path().join("user");
    let assets = dir.path().join("assets");

    write(&workspace.join("scripts").join("main.lua"), "print('hi')");
    write(&workspace.join("my-ext").join("package.json"), r#"{"name":"cool-ext"}"#);
    write(&workspace.join("my-ext").join("lib").join("util.lua"), "return {}");
    write(&assets.join("out").join("debugger").join("debugger.lua"), "-- agent");
    write(&assets.join("out").join("debugger").join("package.json"), "{}");
    write(&assets.join("out").join("bin").join("x64").join("lua-socket.so"), "bin");
    std::fs::create_dir_all(&user_data).expect("user data");

    Fixture {
        _dir: dir,
        workspace,
        user_data,
        assets,
    }
}

fn config(fx: &Fixture, kind: ProjectKind, source: &str) -> SessionConfig {
    SessionConfig {
        project_kind: kind,
        workspace_root: fx.workspace.clone(),
        source: PathBuf::from(source),
        ws_port: 8181,
        ws_path: "aseprite-debugger".into(),
        runtime_exe: PathBuf::from("aseprite"),
        connect_timeout: Duration::from_secs(30),
        output_prefix: "ASEOUT".into(),
        agent: AgentConfig {
            assets_dir: fx.assets.clone(),
            arch: "x64".into(),
        },
    }
}

// ── User source ───────────────────────────────────────────────────────────────

/// A script is copied into `scripts/` and scoped to its workspace folder.
#[tokio::test]
async fn script_is_installed_into_scripts_dir() {
    let fx = fixture();
    let installer = FsInstaller::new(config(&fx, ProjectKind::Script, "scripts/main.lua"));

    let installed = installer
        .install_user_source(&fx.user_data)
        .await
        .expect("install");

    let scripts_dir = fx.user_data.join("scripts");
    assert_eq!(installed.target, scripts_dir.join("main.lua"));
    assert_eq!(
        std::fs::read_to_string(&installed.target).expect("read"),
        "print('hi')"
    );
    assert_eq!(
        installed.scope,
        InstallScope::Script {
            scripts_dir,
            source_dir: fx.workspace.join("scripts"),
        }
    );
}

/// An extension is copied recursively under its package name.
#[tokio::test]
async fn extension_is_installed_under_package_name() {
    let fx = fixture();
    let installer = FsInstaller::new(config(&fx, ProjectKind::Extension, "my-ext"));

    let installed = installer
        .install_user_source(&fx.user_data)
        .await
        .expect("install");

    let target = fx.user_data.join("extensions").join("cool-ext");
    assert_eq!(installed.target, target);
    assert!(target.join("package.json").is_file());
    assert!(target.join("lib").join("util.lua").is_file());
    assert_eq!(
        installed.scope,
        InstallScope::Extension {
            extension_dir: target
        }
    );
}

/// An extension folder without `package.json` cannot be installed.
#[tokio::test]
async fn extension_without_package_json_is_rejected() {
    let fx = fixture();
    let installer = FsInstaller::new(config(&fx, ProjectKind::Extension, "scripts"));

    let err = installer
        .install_user_source(&fx.user_data)
        .await
        .expect_err("must fail");
    assert!(matches!(err, AppError::Config(_)));
    assert!(err.to_string().contains("missing package.json"));
}

/// Uninstalling the user source removes it; a second uninstall is harmless.
#[tokio::test]
async fn user_source_uninstall_is_repeatable() {
    let fx = fixture();
    let installer = FsInstaller::new(config(&fx, ProjectKind::Extension, "my-ext"));
    let installed = installer
        .install_user_source(&fx.user_data)
        .await
        .expect("install");

    installer
        .uninstall_user_source(&installed)
        .await
        .expect("uninstall");
    assert!(!installed.target.exists());

    installer
        .uninstall_user_source(&installed)
        .await
        .expect("second uninstall");
}

// ── Agent ─────────────────────────────────────────────────────────────────────

/// The agent and its native binaries land in the agent directory together
/// with settings pointing back at the bridge.
#[tokio::test]
async fn agent_is_installed_with_settings() {
    let fx = fixture();
    let installer = FsInstaller::new(config(&fx, ProjectKind::Script, "scripts/main.lua"));
    let installed = installer
        .install_user_source(&fx.user_data)
        .await
        .expect("install source");

    let agent_dir = installer
        .install_agent(&fx.user_data, &installed)
        .await
        .expect("install agent");

    assert_eq!(agent_dir, fx.user_data.join("extensions").join(AGENT_DIR_NAME));
    assert!(agent_dir.join("debugger.lua").is_file());
    assert!(agent_dir.join("lua-socket.so").is_file());

    let raw = std::fs::read(agent_dir.join("config.json")).expect("settings");
    let settings: AgentSettings = serde_json::from_slice(&raw).expect("json");
    assert_eq!(settings.endpoint, "ws://127.0.0.1:8181/aseprite-debugger");
    assert_eq!(
        PathBuf::from(&settings.install_dir),
        fx.user_data.join("scripts").join("main.lua")
    );
    assert_eq!(
        PathBuf::from(&settings.source_dir),
        fx.workspace.join("scripts").join("main.lua")
    );

    installer.uninstall_agent(&agent_dir).await.expect("uninstall");
    assert!(!agent_dir.exists());
}

/// A missing agent bundle is an install error.
#[tokio::test]
async fn missing_agent_bundle_is_rejected() {
    let fx = fixture();
    std::fs::remove_dir_all(fx.assets.join("out")).expect("remove bundle");
    let installer = FsInstaller::new(config(&fx, ProjectKind::Script, "scripts/main.lua"));
    let installed = installer
        .install_user_source(&fx.user_data)
        .await
        .expect("install source");

    let err = installer
        .install_agent(&fx.user_data, &installed)
        .await
        .expect_err("must fail");
    assert!(matches!(err, AppError::Install(_)));
}

/// A failure after the agent directory was started removes it again.
#[tokio::test]
async fn failed_agent_install_leaves_no_partial_copy() {
    let fx = fixture();
    std::fs::remove_dir_all(fx.assets.join("out").join("bin")).expect("remove binaries");
    let installer = FsInstaller::new(config(&fx, ProjectKind::Script, "scripts/main.lua"));
    let installed = installer
        .install_user_source(&fx.user_data)
        .await
        .expect("install source");

    let err = installer
        .install_agent(&fx.user_data, &installed)
        .await
        .expect_err("must fail");

    assert!(matches!(err, AppError::Install(_)), "{err}");
    assert!(!fx.user_data.join("extensions").join(AGENT_DIR_NAME).exists());
}
