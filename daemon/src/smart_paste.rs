/// Focus-aware stop policy.
///
/// While a session is watching with smart paste enabled, the paste-trigger
/// chord is registered.  When it fires, the coordinator decides how to end
/// the session based on which application owns the foreground at that
/// instant: an allow-listed application gets the collected paths committed
/// and pasted; anything else gets the session discarded and the paste
/// replayed so the user's original clipboard content lands instead.
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::focus::FocusInspector;
use crate::hotkey::{ChordId, HotkeyBus};
use crate::paste::PasteDeliverer;
use crate::session::{StopPolicy, WatchSession};

pub struct SmartPasteCoordinator {
    hotkeys: Arc<dyn HotkeyBus>,
    focus: Arc<dyn FocusInspector>,
    deliverer: Arc<dyn PasteDeliverer>,
}

impl SmartPasteCoordinator {
    pub fn new(
        hotkeys: Arc<dyn HotkeyBus>,
        focus: Arc<dyn FocusInspector>,
        deliverer: Arc<dyn PasteDeliverer>,
    ) -> Self {
        Self { hotkeys, focus, deliverer }
    }

    /// Handles one firing of the paste-trigger chord.
    ///
    /// The trigger is single-shot: its registration is dropped before any
    /// stop logic runs, so a key repeat cannot start a second stop sequence
    /// (a repeat that already made it onto the event queue finds the session
    /// Idle and is a no-op).
    ///
    /// Delivery is fire-and-forget for the session; the returned handle is
    /// only there so callers that care (tests) can await completion.
    pub fn on_paste_trigger(&self, session: &mut WatchSession) -> Option<JoinHandle<()>> {
        self.hotkeys.unregister(ChordId::PasteTrigger);

        if !session.is_watching() {
            return None;
        }

        let smart_paste = session.smart_paste().clone();
        if !smart_paste.enabled {
            // Disabled since the chord was registered; plain stop-and-copy is
            // the safe default.
            session.stop(StopPolicy::Commit);
            return None;
        }

        let Some(target) = self.focus.frontmost() else {
            eprintln!("[smart-paste] No frontmost application; copying without paste");
            session.stop(StopPolicy::Commit);
            return None;
        };

        // Focus may have drifted between the key press and now; bring the
        // captured target back to the foreground so the paste lands in it.
        if !self.focus.activate(&target) {
            eprintln!("[smart-paste] Could not activate {}; pasting anyway", target.app_id);
        }

        let policy = if smart_paste.is_allowed(&target.app_id) {
            StopPolicy::Commit
        } else {
            // Untrusted target: drop the collected paths so the replayed
            // paste carries the user's original clipboard content.
            StopPolicy::Discard
        };
        println!("[smart-paste] Trigger in {} -> {policy:?}", target.app_id);
        session.stop(policy);

        let Some(origin) = smart_paste.trigger.chord() else {
            // The trigger could never have been registered with an
            // unparseable binding; nothing fired, nothing to deliver.
            return None;
        };

        let deliverer = Arc::clone(&self.deliverer);
        Some(tokio::task::spawn_blocking(move || {
            if let Err(e) = deliverer.deliver(&target, origin) {
                eprintln!("[smart-paste] {e:#}");
            }
        }))
    }
}
