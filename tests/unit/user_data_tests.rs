//! Unit tests for user-data path discovery.

use std::path::PathBuf;

use aseprite_dap::install::user_data::parse_user_data_path;

/// The path between the markers is extracted, surrounding noise ignored.
#[test]
fn path_between_markers_is_extracted() {
    let stdout = "Aseprite 1.3\n!<USER_CONFIG_PATH>/home/me/.config/aseprite<USER_CONFIG_PATH>\n";
    assert_eq!(
        parse_user_data_path(stdout),
        Some(PathBuf::from("/home/me/.config/aseprite"))
    );
}

/// Windows paths with spaces survive untouched.
#[test]
fn windows_path_is_preserved() {
    let stdout = r"!<USER_CONFIG_PATH>C:\Users\Me Too\AppData\Roaming\Aseprite<USER_CONFIG_PATH>";
    assert_eq!(
        parse_user_data_path(stdout),
        Some(PathBuf::from(r"C:\Users\Me Too\AppData\Roaming\Aseprite"))
    );
}

/// Missing markers yield nothing.
#[test]
fn missing_markers_yield_none() {
    assert_eq!(parse_user_data_path(""), None);
    assert_eq!(parse_user_data_path("!<USER_CONFIG_PATH>/no/close"), None);
    assert_eq!(parse_user_data_path("/no/open<USER_CONFIG_PATH>"), None);
}
