mod clipboard;
mod config;
mod event;
mod focus;
mod hotkey;
mod paste;
mod paths;
mod session;
mod smart_paste;
mod startup;
mod status;
mod watcher;

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::clipboard::SystemClipboard;
use crate::config::Config;
use crate::event::DaemonEvent;
use crate::focus::SystemFocus;
use crate::hotkey::{ChordId, GlobalHotkeys, HotkeyBus};
use crate::paste::FallbackPaste;
use crate::session::{StopPolicy, WatchSession};
use crate::smart_paste::SmartPasteCoordinator;
use crate::status::{DaemonState, DaemonStatus};
use crate::watcher::FsChangeFeed;

#[tokio::main]
async fn main() {
    if std::env::args().any(|arg| arg == "--unregister-startup") {
        if let Err(e) = startup::unregister_startup() {
            eprintln!("[startup] {e:#}");
            std::process::exit(1);
        }
        return;
    }

    // ── App data directory ────────────────────────────────────────────────────
    let app_dir = paths::app_data_dir();
    if let Err(e) = std::fs::create_dir_all(&app_dir) {
        eprintln!("Failed to create app data directory {}: {e}", app_dir.display());
        std::process::exit(1);
    }

    // ── Configuration ─────────────────────────────────────────────────────────
    let config_path = paths::config_file_path();
    let mut cfg = config::load_or_default(&config_path).unwrap_or_else(|e| {
        eprintln!("[config] Error (using defaults): {e}");
        Config::default()
    });

    // ── Initial status ────────────────────────────────────────────────────────
    let status_path = paths::status_file_path();
    status::write_status(&status_path, &DaemonStatus::new());

    let (event_tx, mut event_rx) = mpsc::channel::<DaemonEvent>(64);

    // ── Background tasks ──────────────────────────────────────────────────────
    tokio::spawn(config::watch_config(config_path, event_tx.clone()));

    let (hotkeys, hotkey_handle) = GlobalHotkeys::start(event_tx.clone());
    register_watch_chords(hotkeys.as_ref(), &cfg);

    if let Err(e) = startup::register_startup() {
        eprintln!("[startup] {e:#}");
    }

    // Graceful shutdown on Ctrl+C.
    {
        let tx = event_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(DaemonEvent::Shutdown).await;
            }
        });
    }

    // ── Services ──────────────────────────────────────────────────────────────
    let mut session = WatchSession::new(
        &cfg,
        event_tx.clone(),
        Arc::new(FsChangeFeed),
        Arc::clone(&hotkeys) as Arc<dyn HotkeyBus>,
        Arc::new(SystemClipboard),
    );
    let coordinator = SmartPasteCoordinator::new(
        Arc::clone(&hotkeys) as Arc<dyn HotkeyBus>,
        Arc::new(SystemFocus),
        Arc::new(FallbackPaste::with_default_strategies()),
    );

    status::write_status(&status_path, &snapshot_status(&session));
    println!("dropclip-daemon v{} started", env!("CARGO_PKG_VERSION"));

    // ── Event loop ────────────────────────────────────────────────────────────
    // The single place where session state is touched; every collaborator
    // funnels through the channel.
    while let Some(evt) = event_rx.recv().await {
        match evt {
            DaemonEvent::ChordPressed(ChordId::StartWatch) => {
                if cfg.shortcuts.are_same() {
                    session.toggle();
                } else if !session.is_watching() {
                    session.start();
                }
            }

            DaemonEvent::ChordPressed(ChordId::StopWatch) => {
                if session.is_watching() {
                    session.stop(StopPolicy::Commit);
                }
            }

            DaemonEvent::ChordPressed(ChordId::PasteTrigger) => {
                // Fire-and-forget: delivery runs on the blocking pool.
                let _ = coordinator.on_paste_trigger(&mut session);
            }

            DaemonEvent::FileAdded(path) => {
                session.on_file_added(path);
            }

            DaemonEvent::ConfigReloaded(new_config) => {
                println!("Config reloaded");
                register_watch_chords(hotkeys.as_ref(), &new_config);
                session.apply_config(&new_config);
                cfg = new_config;
            }

            DaemonEvent::Shutdown => {
                println!("Shutting down");
                if session.is_watching() {
                    // Publish whatever was collected rather than losing it.
                    session.stop(StopPolicy::Commit);
                }
                hotkeys.unregister_all();
                status::write_status(&status_path, &snapshot_status(&session));
                break;
            }
        }

        status::write_status(&status_path, &snapshot_status(&session));
    }

    hotkey_handle.stop();
}

/// (Re-)registers the start/stop chords from `config`.  Identical bindings
/// collapse into a single toggling registration, matching what the settings
/// UI presents as "same shortcut starts and stops".
fn register_watch_chords(bus: &dyn HotkeyBus, config: &Config) {
    match config.shortcuts.start.chord() {
        Some(chord) => {
            if let Err(e) = bus.register(ChordId::StartWatch, chord) {
                eprintln!("[hotkey] Could not register start chord: {e:#}");
            }
        }
        None => eprintln!("[hotkey] Unrecognised start binding; chord disabled"),
    }

    if config.shortcuts.are_same() {
        // One chord toggles; drop any previously distinct stop chord.
        bus.unregister(ChordId::StopWatch);
        return;
    }

    match config.shortcuts.stop.chord() {
        Some(chord) => {
            if let Err(e) = bus.register(ChordId::StopWatch, chord) {
                eprintln!("[hotkey] Could not register stop chord: {e:#}");
            }
        }
        None => eprintln!("[hotkey] Unrecognised stop binding; chord disabled"),
    }
}

/// Builds the status-file view of the current session.
fn snapshot_status(session: &WatchSession) -> DaemonStatus {
    DaemonStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        state: if session.is_watching() {
            DaemonState::Watching
        } else {
            DaemonState::Idle
        },
        watch_folder: if session.watch_folder().is_empty() {
            None
        } else {
            Some(session.watch_folder().to_string())
        },
        collected_count: session.collected().len(),
        status_message: session.status().to_string(),
        last_copy_timestamp: session.last_copy_timestamp().map(str::to_string),
        error: None,
    }
}
