use anyhow::{Context, Result};
use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use crate::event::DaemonEvent;
use crate::hotkey::{parse_vk, Chord, Modifiers};

/// Placeholder token substituted with the comma-joined path list.
pub const PATH_PLACEHOLDER: &str = "{path}";
pub const DEFAULT_SINGLE_TEMPLATE: &str = "Analyze this image: {path}";
pub const DEFAULT_MULTIPLE_TEMPLATE: &str = "Analyze these images: {path}";

/// Root configuration structure. Deserialized from config.toml in the
/// Dropclip data directory (see [`crate::paths`]).
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub templates: TemplateConfig,
    #[serde(default)]
    pub shortcuts: ShortcutConfig,
    #[serde(default)]
    pub smart_paste: SmartPasteConfig,
}

/// The folder the daemon watches for new files.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct WatchConfig {
    /// Absolute path of the watched folder. Empty means not configured yet.
    #[serde(default)]
    pub folder: String,
}

/// Clipboard templates. Each contains the `{path}` placeholder, which is
/// replaced with the comma-joined list of collected paths.
#[derive(Debug, Deserialize, Clone)]
pub struct TemplateConfig {
    /// Used when exactly one path was collected.
    #[serde(default = "default_single_template")]
    pub single: String,
    /// Used when two or more paths were collected.
    #[serde(default = "default_multiple_template")]
    pub multiple: String,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            single: DEFAULT_SINGLE_TEMPLATE.to_string(),
            multiple: DEFAULT_MULTIPLE_TEMPLATE.to_string(),
        }
    }
}

impl TemplateConfig {
    /// Substitutes the comma-joined `paths` into the matching template:
    /// one path selects the single-file template, two or more the multi-file
    /// one. An empty slice formats to an empty string.
    pub fn format(&self, paths: &[String]) -> String {
        if paths.is_empty() {
            return String::new();
        }
        let joined = paths.join(", ");
        let template = if paths.len() == 1 { &self.single } else { &self.multiple };
        template.replace(PATH_PLACEHOLDER, &joined)
    }
}

/// A key name plus modifier names, as written in the config file.
#[derive(Debug, Deserialize, Clone)]
pub struct Binding {
    /// Key name accepted by [`parse_vk`] (e.g. `"W"`, `"F8"`).
    pub key: String,
    /// Modifier names accepted by [`Modifiers::from_name`].
    #[serde(default)]
    pub modifiers: Vec<String>,
}

impl Binding {
    /// Resolves the binding to a concrete chord.
    /// Returns `None` if the key name or any modifier name is unrecognised.
    pub fn chord(&self) -> Option<Chord> {
        let vk = parse_vk(&self.key)?;
        let mut modifiers = Modifiers::empty();
        for name in &self.modifiers {
            modifiers = modifiers.union(Modifiers::from_name(name)?);
        }
        Some(Chord { vk, modifiers })
    }
}

/// Chords for starting and stopping a watch session.
#[derive(Debug, Deserialize, Clone)]
pub struct ShortcutConfig {
    #[serde(default = "default_watch_binding")]
    pub start: Binding,
    #[serde(default = "default_watch_binding")]
    pub stop: Binding,
}

impl Default for ShortcutConfig {
    fn default() -> Self {
        Self {
            start: default_watch_binding(),
            stop: default_watch_binding(),
        }
    }
}

impl ShortcutConfig {
    /// When start and stop resolve to the same chord, a single registration
    /// is used and the chord toggles the session.
    pub fn are_same(&self) -> bool {
        self.start.chord() == self.stop.chord()
    }
}

/// Smart-paste settings: the trigger chord and the set of applications
/// trusted to receive the collected paths.
#[derive(Debug, Deserialize, Clone)]
pub struct SmartPasteConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Chord that ends the session and replays a paste into the frontmost
    /// application. Defaults to the platform paste shortcut.
    #[serde(default = "default_paste_trigger")]
    pub trigger: Binding,
    /// Case-insensitive executable names allowed to receive collected paths.
    #[serde(default)]
    pub allowed_apps: Vec<String>,
}

impl Default for SmartPasteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            trigger: default_paste_trigger(),
            allowed_apps: Vec::new(),
        }
    }
}

impl SmartPasteConfig {
    /// True when `app_id` (an executable name) is in the allow-list.
    pub fn is_allowed(&self, app_id: &str) -> bool {
        self.allowed_apps.iter().any(|a| a.eq_ignore_ascii_case(app_id))
    }
}

/// Loads the config file at `path`, returning `Config::default()` if the file
/// does not exist. Returns an error if the file exists but cannot be read or
/// parsed.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Spawns a file watcher on the parent directory of `path`.  Whenever the
/// config file is created or modified, reloads it and sends a
/// `ConfigReloaded` event.
pub async fn watch_config(path: PathBuf, tx: mpsc::Sender<DaemonEvent>) {
    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Event>(16);

    let mut watcher = match RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = watch_tx.blocking_send(event);
            }
        },
        NotifyConfig::default(),
    ) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("[config] Failed to create file watcher: {e}");
            return;
        }
    };

    // Watch the parent directory rather than the file directly so we catch
    // editor-style atomic saves (write-new + rename).
    let watch_dir = match path.parent() {
        Some(d) => d.to_path_buf(),
        None => {
            eprintln!("[config] Config path has no parent directory");
            return;
        }
    };

    if let Err(e) = watcher.watch(&watch_dir, RecursiveMode::NonRecursive) {
        eprintln!("[config] Failed to watch config directory: {e}");
        return;
    }

    while let Some(event) = watch_rx.recv().await {
        let affects_config = event.paths.iter().any(|p| p == path.as_path());
        let is_write = matches!(
            event.kind,
            notify::EventKind::Create(_) | notify::EventKind::Modify(_)
        );

        if affects_config && is_write {
            match load_or_default(&path) {
                Ok(config) => {
                    if tx.send(DaemonEvent::ConfigReloaded(config)).await.is_err() {
                        break;
                    }
                }
                Err(e) => eprintln!("[config] Failed to reload config: {e}"),
            }
        }
    }
}

fn default_single_template() -> String {
    DEFAULT_SINGLE_TEMPLATE.to_string()
}

fn default_multiple_template() -> String {
    DEFAULT_MULTIPLE_TEMPLATE.to_string()
}

/// Control+Shift+W, the default start/stop chord.
fn default_watch_binding() -> Binding {
    Binding {
        key: "W".to_string(),
        modifiers: vec!["control".to_string(), "shift".to_string()],
    }
}

/// Control+V: intercepting the plain paste shortcut is what makes the
/// smart-paste flow feel like a normal paste to the user.
fn default_paste_trigger() -> Binding {
    Binding {
        key: "V".to_string(),
        modifiers: vec!["control".to_string()],
    }
}
