use std::path::PathBuf;

use crate::config::Config;
use crate::hotkey::ChordId;

pub enum DaemonEvent {
    /// A registered chord fired somewhere in the OS.
    ChordPressed(ChordId),
    /// The change feed confirmed a new regular file in the watched folder.
    FileAdded(PathBuf),
    /// The config file changed on disk and was successfully re-parsed.
    ConfigReloaded(Config),
    /// Ctrl+C received; the daemon should publish any collected paths and exit.
    Shutdown,
}
