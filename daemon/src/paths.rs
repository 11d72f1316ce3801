/// Canonical file paths for Dropclip data files.
///
/// Both files live under the platform config directory (e.g.
/// %APPDATA%\Dropclip\ on Windows, ~/.config/Dropclip/ elsewhere):
///   - config.toml  Written by the settings UI, read by the daemon.
///   - status.toml  Written by the daemon, read by the settings UI.
use std::path::PathBuf;

const APP_DIR_NAME: &str = "Dropclip";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const STATUS_FILE_NAME: &str = "status.toml";

/// Returns the Dropclip application data directory.
pub fn app_data_dir() -> PathBuf {
    // config_dir is None only on unsupported platforms; fall back to the
    // working directory rather than refusing to start.
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Returns the full path to the config file.
pub fn config_file_path() -> PathBuf {
    app_data_dir().join(CONFIG_FILE_NAME)
}

/// Returns the full path to the status file.
pub fn status_file_path() -> PathBuf {
    app_data_dir().join(STATUS_FILE_NAME)
}
