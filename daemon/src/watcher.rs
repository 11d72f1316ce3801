use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use notify::event::ModifyKind;
use notify::{Config as NotifyConfig, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use walkdir::WalkDir;

use crate::event::DaemonEvent;

/// Source of "new file" events for a watched folder.
///
/// A subscription reports each regular file created in (or renamed into) the
/// folder after the subscription opened, at most once per distinct path, as
/// [`DaemonEvent::FileAdded`] on the daemon event channel.
pub trait ChangeFeed: Send + Sync {
    fn open(&self, dir: &Path, tx: mpsc::Sender<DaemonEvent>) -> Result<Box<dyn FeedSubscription>>;
}

/// An open feed.  Dropping it stops event emission and releases the OS watch.
pub trait FeedSubscription: Send {
    /// Folder this subscription is watching.
    fn dir(&self) -> &Path;
}

/// [`ChangeFeed`] backed by the platform file-system notifier.
///
/// Files already present when the subscription opens form a baseline snapshot
/// and are never reported; a path is reported only once it is confirmed to
/// exist on disk as a regular file.  Rename pairs therefore produce a single
/// event for the surviving name.
pub struct FsChangeFeed;

impl ChangeFeed for FsChangeFeed {
    fn open(&self, dir: &Path, tx: mpsc::Sender<DaemonEvent>) -> Result<Box<dyn FeedSubscription>> {
        let meta = std::fs::metadata(dir)
            .with_context(|| format!("Cannot access watch folder {}", dir.display()))?;
        if !meta.is_dir() {
            bail!("Watch path {} is not a directory", dir.display());
        }

        // Snapshot the folder before the watch starts so pre-existing files
        // are never reported as new.
        let baseline = snapshot_files(dir);

        let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Event>(64);
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| {
                if let Ok(event) = res {
                    let _ = watch_tx.blocking_send(event);
                }
            },
            NotifyConfig::default(),
        )
        .context("Failed to create file watcher")?;

        watcher
            .watch(dir, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", dir.display()))?;

        println!("[watcher] Watching {} ({} existing files)", dir.display(), baseline.len());

        let forward = tokio::spawn(async move {
            let mut seen = baseline;
            while let Some(event) = watch_rx.recv().await {
                if !is_arrival(&event.kind) {
                    continue;
                }
                for path in event.paths {
                    // Rename events fire for both the old and new name;
                    // only paths still present on disk count.
                    let is_file = std::fs::metadata(&path)
                        .map(|m| m.is_file())
                        .unwrap_or(false);
                    if is_file && seen.insert(path.clone()) {
                        if tx.send(DaemonEvent::FileAdded(path)).await.is_err() {
                            return;
                        }
                    }
                }
            }
        });

        Ok(Box::new(NotifySubscription {
            dir: dir.to_path_buf(),
            _watcher: watcher,
            forward,
        }))
    }
}

struct NotifySubscription {
    dir: PathBuf,
    /// Keeps the OS watch alive; dropping it stops event emission.
    _watcher: RecommendedWatcher,
    forward: tokio::task::JoinHandle<()>,
}

impl FeedSubscription for NotifySubscription {
    fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Drop for NotifySubscription {
    fn drop(&mut self) {
        self.forward.abort();
        println!("[watcher] Stopped watching {}", self.dir.display());
    }
}

/// True for event kinds that can introduce a new file: creation, or a rename
/// (files moved into the watched folder arrive as rename events).
fn is_arrival(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(_)))
}

/// All regular files currently under `dir`, recursively.
fn snapshot_files(dir: &Path) -> HashSet<PathBuf> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect()
}
