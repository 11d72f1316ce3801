/// The watch session state machine.
///
/// A session is Idle until started, then Watching until stopped.  While
/// Watching it accumulates the paths of new files reported by the change
/// feed, in discovery order and duplicate-free.  Stopping decides what the
/// collected paths are worth: Commit formats them through the configured
/// templates and publishes the result to the clipboard, Discard drops them
/// silently.
///
/// All methods must be called from the daemon event loop; collaborators never
/// mutate the session directly, they send events that the loop replays into
/// these methods.
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::clipboard::ClipboardSink;
use crate::config::{Config, SmartPasteConfig, TemplateConfig};
use crate::event::DaemonEvent;
use crate::hotkey::{ChordId, HotkeyBus};
use crate::watcher::{ChangeFeed, FeedSubscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Watching,
}

/// What to do with the collected paths when a session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopPolicy {
    /// Format the collected paths and publish them to the clipboard.
    Commit,
    /// Drop the collected paths silently, leaving the clipboard untouched.
    Discard,
}

pub struct WatchSession {
    state: SessionState,
    /// Folder to watch.  Frozen for the duration of an active session;
    /// config reloads only take effect while Idle.
    watch_folder: String,
    templates: TemplateConfig,
    smart_paste: SmartPasteConfig,
    /// Collected absolute paths, insertion order = discovery order.
    collected: Vec<String>,
    status: String,
    last_copy_timestamp: Option<String>,
    events: mpsc::Sender<DaemonEvent>,
    feed: Arc<dyn ChangeFeed>,
    hotkeys: Arc<dyn HotkeyBus>,
    clipboard: Arc<dyn ClipboardSink>,
    subscription: Option<Box<dyn FeedSubscription>>,
}

impl WatchSession {
    pub fn new(
        config: &Config,
        events: mpsc::Sender<DaemonEvent>,
        feed: Arc<dyn ChangeFeed>,
        hotkeys: Arc<dyn HotkeyBus>,
        clipboard: Arc<dyn ClipboardSink>,
    ) -> Self {
        Self {
            state: SessionState::Idle,
            watch_folder: config.watch.folder.clone(),
            templates: config.templates.clone(),
            smart_paste: config.smart_paste.clone(),
            collected: Vec::new(),
            status: "Ready".to_string(),
            last_copy_timestamp: None,
            events,
            feed,
            hotkeys,
            clipboard,
            subscription: None,
        }
    }

    pub fn is_watching(&self) -> bool {
        self.state == SessionState::Watching
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn collected(&self) -> &[String] {
        &self.collected
    }

    pub fn watch_folder(&self) -> &str {
        &self.watch_folder
    }

    pub fn smart_paste(&self) -> &SmartPasteConfig {
        &self.smart_paste
    }

    /// RFC 3339 time of the most recent clipboard publish.
    pub fn last_copy_timestamp(&self) -> Option<&str> {
        self.last_copy_timestamp.as_deref()
    }

    /// Begins a watch session: clears the previous collection, opens the
    /// change feed and, when smart paste is enabled, arms the paste trigger.
    ///
    /// Never fails outward — a missing folder or a dead feed is reported
    /// through the status message and the session stays Idle.
    pub fn start(&mut self) {
        if self.state == SessionState::Watching {
            return;
        }
        if self.watch_folder.is_empty() {
            self.status = "Please select a folder first".to_string();
            eprintln!("[session] Start refused: no watch folder configured");
            return;
        }

        self.collected.clear();
        let dir = PathBuf::from(&self.watch_folder);
        match self.feed.open(&dir, self.events.clone()) {
            Ok(subscription) => self.subscription = Some(subscription),
            Err(e) => {
                eprintln!("[session] {e:#}");
                self.status = format!("Cannot watch {}", self.watch_folder);
                return;
            }
        }
        self.state = SessionState::Watching;
        self.status = "Watching for new files...".to_string();

        if self.smart_paste.enabled {
            match self.smart_paste.trigger.chord() {
                Some(chord) => {
                    // Registration failure degrades to watching without smart
                    // paste; the session itself is unaffected.
                    if let Err(e) = self.hotkeys.register(ChordId::PasteTrigger, chord) {
                        eprintln!("[session] Smart paste unavailable: {e:#}");
                    }
                }
                None => {
                    eprintln!("[session] Smart paste unavailable: unrecognised trigger binding");
                }
            }
        }
    }

    /// Records a new file reported by the change feed.  Safe to call with
    /// duplicate paths (create followed by a rename-confirm) and after the
    /// session has stopped (late deliveries are dropped).
    pub fn on_file_added(&mut self, path: PathBuf) {
        if self.state != SessionState::Watching {
            return;
        }
        let path = path.to_string_lossy().into_owned();
        if self.collected.contains(&path) {
            return;
        }
        self.collected.push(path);
        self.status = format!("{} file(s) collected", self.collected.len());
    }

    /// Ends the session.  Teardown is unconditional and ordered: paste
    /// trigger released first (so a key repeat cannot start a second stop),
    /// then the feed closed, then the policy applied.  Calling `stop` while
    /// already Idle is a no-op.
    pub fn stop(&mut self, policy: StopPolicy) {
        self.hotkeys.unregister(ChordId::PasteTrigger);

        if self.state == SessionState::Idle {
            return;
        }
        if let Some(subscription) = self.subscription.take() {
            println!("[session] Closing feed for {}", subscription.dir().display());
        }
        self.state = SessionState::Idle;

        match policy {
            StopPolicy::Discard => {
                self.collected.clear();
                self.status = "Watch cancelled (paste in unsupported app)".to_string();
            }
            StopPolicy::Commit => {
                if self.collected.is_empty() {
                    self.status = "No files were added".to_string();
                    return;
                }
                let text = self.templates.format(&self.collected);
                match self.clipboard.publish(&text) {
                    Ok(()) => {
                        self.last_copy_timestamp = Some(chrono::Local::now().to_rfc3339());
                        self.status =
                            format!("{} path(s) copied to clipboard!", self.collected.len());
                    }
                    Err(e) => {
                        eprintln!("[session] {e:#}");
                        self.status = "Could not write to clipboard".to_string();
                    }
                }
            }
        }
    }

    /// The manual user-facing action: Idle starts a session, Watching commits
    /// the current one.
    pub fn toggle(&mut self) {
        match self.state {
            SessionState::Idle => self.start(),
            SessionState::Watching => self.stop(StopPolicy::Commit),
        }
    }

    /// Drops the collected paths without ending the session.
    pub fn clear_paths(&mut self) {
        self.collected.clear();
        self.status = "Cleared".to_string();
    }

    /// Removes one collected path by position.  Out-of-range is a no-op.
    pub fn remove_path(&mut self, index: usize) {
        if index < self.collected.len() {
            self.collected.remove(index);
        }
    }

    /// Adopts a reloaded config.  Templates and smart-paste settings apply
    /// immediately; an active session keeps the folder it started with.
    pub fn apply_config(&mut self, config: &Config) {
        self.templates = config.templates.clone();
        self.smart_paste = config.smart_paste.clone();
        if self.state == SessionState::Idle {
            self.watch_folder = config.watch.folder.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use crate::config::Binding;
    use crate::hotkey::Chord;

    // ── Test doubles ──────────────────────────────────────────────────────────

    /// One entry per observable collaborator call, in call order.
    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        FeedOpened(PathBuf),
        FeedClosed,
        Registered(ChordId),
        Unregistered(ChordId),
        Published(String),
    }

    type CallLog = Arc<Mutex<Vec<Call>>>;

    struct MockFeed {
        log: CallLog,
        fail: bool,
    }

    struct MockSubscription {
        dir: PathBuf,
        log: CallLog,
    }

    impl FeedSubscription for MockSubscription {
        fn dir(&self) -> &Path {
            &self.dir
        }
    }

    impl Drop for MockSubscription {
        fn drop(&mut self) {
            self.log.lock().unwrap().push(Call::FeedClosed);
        }
    }

    impl ChangeFeed for MockFeed {
        fn open(
            &self,
            dir: &Path,
            _tx: mpsc::Sender<DaemonEvent>,
        ) -> anyhow::Result<Box<dyn FeedSubscription>> {
            if self.fail {
                bail!("No such directory");
            }
            self.log.lock().unwrap().push(Call::FeedOpened(dir.to_path_buf()));
            Ok(Box::new(MockSubscription {
                dir: dir.to_path_buf(),
                log: Arc::clone(&self.log),
            }))
        }
    }

    struct MockBus {
        log: CallLog,
        fail: bool,
    }

    impl HotkeyBus for MockBus {
        fn register(&self, id: ChordId, _chord: Chord) -> anyhow::Result<()> {
            if self.fail {
                bail!("Hook unavailable");
            }
            self.log.lock().unwrap().push(Call::Registered(id));
            Ok(())
        }

        fn unregister(&self, id: ChordId) {
            self.log.lock().unwrap().push(Call::Unregistered(id));
        }

        fn unregister_all(&self) {}
    }

    struct MockClipboard {
        log: CallLog,
        fail: bool,
    }

    impl ClipboardSink for MockClipboard {
        fn publish(&self, text: &str) -> anyhow::Result<()> {
            if self.fail {
                bail!("Clipboard unavailable");
            }
            self.log.lock().unwrap().push(Call::Published(text.to_string()));
            Ok(())
        }
    }

    struct Harness {
        log: CallLog,
        session: WatchSession,
    }

    fn published(log: &CallLog) -> Vec<String> {
        log.lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                Call::Published(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn harness(config: Config) -> Harness {
        harness_with(config, false, false, false)
    }

    fn harness_with(config: Config, feed_fails: bool, bus_fails: bool, clip_fails: bool) -> Harness {
        let log: CallLog = Arc::new(Mutex::new(Vec::new()));
        let (tx, _rx) = mpsc::channel(16);
        let session = WatchSession::new(
            &config,
            tx,
            Arc::new(MockFeed { log: Arc::clone(&log), fail: feed_fails }),
            Arc::new(MockBus { log: Arc::clone(&log), fail: bus_fails }),
            Arc::new(MockClipboard { log: Arc::clone(&log), fail: clip_fails }),
        );
        Harness { log, session }
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.watch.folder = "/tmp/in".to_string();
        config.templates.single = "img: {path}".to_string();
        config.templates.multiple = "imgs: {path}".to_string();
        config
    }

    fn smart_paste_config() -> Config {
        let mut config = test_config();
        config.smart_paste.enabled = true;
        config.smart_paste.trigger = Binding {
            key: "V".to_string(),
            modifiers: vec!["control".to_string()],
        };
        config
    }

    // ── start ─────────────────────────────────────────────────────────────────

    #[test]
    fn start_with_empty_folder_is_refused() {
        let mut h = harness(Config::default());
        h.session.start();
        assert!(!h.session.is_watching());
        assert_eq!(h.session.status(), "Please select a folder first");
        assert!(h.log.lock().unwrap().is_empty());
    }

    #[test]
    fn start_opens_feed_and_updates_status() {
        let mut h = harness(test_config());
        h.session.start();
        assert!(h.session.is_watching());
        assert_eq!(h.session.status(), "Watching for new files...");
        assert_eq!(
            *h.log.lock().unwrap(),
            vec![Call::FeedOpened(PathBuf::from("/tmp/in"))]
        );
    }

    #[test]
    fn start_clears_paths_left_over_from_previous_session() {
        let mut h = harness(test_config());
        h.session.start();
        h.session.on_file_added(PathBuf::from("/tmp/in/a.png"));
        h.session.stop(StopPolicy::Commit);
        assert_eq!(h.session.collected().len(), 1);

        h.session.start();
        assert!(h.session.collected().is_empty());
    }

    #[test]
    fn start_while_watching_is_a_noop() {
        let mut h = harness(test_config());
        h.session.start();
        h.session.on_file_added(PathBuf::from("/tmp/in/a.png"));
        h.session.start();
        // The second start must not reset the session or reopen the feed.
        assert_eq!(h.session.collected().len(), 1);
        assert_eq!(
            *h.log.lock().unwrap(),
            vec![Call::FeedOpened(PathBuf::from("/tmp/in"))]
        );
    }

    #[test]
    fn start_with_dead_feed_reports_and_stays_idle() {
        let mut h = harness_with(test_config(), true, false, false);
        h.session.start();
        assert!(!h.session.is_watching());
        assert_eq!(h.session.status(), "Cannot watch /tmp/in");
    }

    #[test]
    fn start_arms_paste_trigger_when_smart_paste_enabled() {
        let mut h = harness(smart_paste_config());
        h.session.start();
        assert!(h
            .log
            .lock()
            .unwrap()
            .contains(&Call::Registered(ChordId::PasteTrigger)));
    }

    #[test]
    fn start_does_not_arm_paste_trigger_when_disabled() {
        let mut h = harness(test_config());
        h.session.start();
        assert!(!h
            .log
            .lock()
            .unwrap()
            .contains(&Call::Registered(ChordId::PasteTrigger)));
    }

    #[test]
    fn failed_trigger_registration_degrades_but_keeps_watching() {
        let mut h = harness_with(smart_paste_config(), false, true, false);
        h.session.start();
        assert!(h.session.is_watching());
        assert_eq!(h.session.status(), "Watching for new files...");
    }

    // ── on_file_added ─────────────────────────────────────────────────────────

    #[test]
    fn collects_distinct_paths_in_first_seen_order() {
        let mut h = harness(test_config());
        h.session.start();
        h.session.on_file_added(PathBuf::from("/tmp/in/a.png"));
        h.session.on_file_added(PathBuf::from("/tmp/in/b.png"));
        h.session.on_file_added(PathBuf::from("/tmp/in/a.png"));
        h.session.on_file_added(PathBuf::from("/tmp/in/c.png"));
        h.session.on_file_added(PathBuf::from("/tmp/in/b.png"));
        assert_eq!(
            h.session.collected(),
            ["/tmp/in/a.png", "/tmp/in/b.png", "/tmp/in/c.png"]
        );
        assert_eq!(h.session.status(), "3 file(s) collected");
    }

    #[test]
    fn duplicate_path_does_not_bump_the_count() {
        let mut h = harness(test_config());
        h.session.start();
        h.session.on_file_added(PathBuf::from("/tmp/in/a.png"));
        h.session.on_file_added(PathBuf::from("/tmp/in/a.png"));
        assert_eq!(h.session.status(), "1 file(s) collected");
    }

    #[test]
    fn late_file_event_after_stop_is_dropped() {
        let mut h = harness(test_config());
        h.session.start();
        h.session.stop(StopPolicy::Commit);
        h.session.on_file_added(PathBuf::from("/tmp/in/late.png"));
        assert!(h.session.collected().is_empty());
    }

    #[test]
    fn file_event_while_idle_is_dropped() {
        let mut h = harness(test_config());
        h.session.on_file_added(PathBuf::from("/tmp/in/a.png"));
        assert!(h.session.collected().is_empty());
    }

    // ── stop ──────────────────────────────────────────────────────────────────

    /// Scenario: two files plus a duplicate notification, then commit.
    #[test]
    fn commit_publishes_multi_template_with_comma_joined_paths() {
        let mut h = harness(test_config());
        h.session.start();
        h.session.on_file_added(PathBuf::from("/tmp/in/a.png"));
        h.session.on_file_added(PathBuf::from("/tmp/in/b.png"));
        h.session.on_file_added(PathBuf::from("/tmp/in/a.png"));
        h.session.stop(StopPolicy::Commit);

        assert!(!h.session.is_watching());
        assert_eq!(published(&h.log), ["imgs: /tmp/in/a.png, /tmp/in/b.png"]);
        assert_eq!(h.session.status(), "2 path(s) copied to clipboard!");
        assert!(h.session.last_copy_timestamp().is_some());
    }

    #[test]
    fn commit_with_one_path_uses_single_template() {
        let mut h = harness(test_config());
        h.session.start();
        h.session.on_file_added(PathBuf::from("/tmp/in/a.png"));
        h.session.stop(StopPolicy::Commit);
        assert_eq!(published(&h.log), ["img: /tmp/in/a.png"]);
    }

    #[test]
    fn commit_with_no_paths_publishes_nothing() {
        let mut h = harness(test_config());
        h.session.start();
        h.session.stop(StopPolicy::Commit);
        assert!(published(&h.log).is_empty());
        assert_eq!(h.session.status(), "No files were added");
        assert!(h.session.last_copy_timestamp().is_none());
    }

    #[test]
    fn discard_never_publishes_regardless_of_count() {
        let mut h = harness(test_config());
        h.session.start();
        h.session.on_file_added(PathBuf::from("/tmp/in/a.png"));
        h.session.on_file_added(PathBuf::from("/tmp/in/b.png"));
        h.session.stop(StopPolicy::Discard);

        assert!(published(&h.log).is_empty());
        assert!(h.session.collected().is_empty());
        assert_eq!(
            h.session.status(),
            "Watch cancelled (paste in unsupported app)"
        );
    }

    #[test]
    fn stop_releases_trigger_before_closing_the_feed() {
        let mut h = harness(smart_paste_config());
        h.session.start();
        h.session.stop(StopPolicy::Commit);

        let log = h.log.lock().unwrap();
        let unregister_at = log
            .iter()
            .position(|c| *c == Call::Unregistered(ChordId::PasteTrigger))
            .expect("trigger never unregistered");
        let feed_closed_at = log
            .iter()
            .position(|c| *c == Call::FeedClosed)
            .expect("feed never closed");
        assert!(unregister_at < feed_closed_at);
    }

    #[test]
    fn second_stop_is_a_noop() {
        let mut h = harness(test_config());
        h.session.start();
        h.session.on_file_added(PathBuf::from("/tmp/in/a.png"));
        h.session.stop(StopPolicy::Commit);
        let status_after_first = h.session.status().to_string();

        h.session.stop(StopPolicy::Commit);
        assert_eq!(published(&h.log).len(), 1);
        assert_eq!(h.session.status(), status_after_first);
        // Collected paths survive a commit so the UI can keep showing them.
        assert_eq!(h.session.collected().len(), 1);
    }

    #[test]
    fn clipboard_failure_is_reported_not_fatal() {
        let mut h = harness_with(test_config(), false, false, true);
        h.session.start();
        h.session.on_file_added(PathBuf::from("/tmp/in/a.png"));
        h.session.stop(StopPolicy::Commit);
        assert!(!h.session.is_watching());
        assert_eq!(h.session.status(), "Could not write to clipboard");
        assert!(h.session.last_copy_timestamp().is_none());
    }

    // ── toggle ────────────────────────────────────────────────────────────────

    #[test]
    fn toggle_starts_then_commits() {
        let mut h = harness(test_config());
        h.session.toggle();
        assert!(h.session.is_watching());
        h.session.on_file_added(PathBuf::from("/tmp/in/a.png"));
        h.session.toggle();
        assert!(!h.session.is_watching());
        assert_eq!(published(&h.log), ["img: /tmp/in/a.png"]);
    }

    // ── manual list edits ─────────────────────────────────────────────────────

    #[test]
    fn clear_paths_empties_the_list() {
        let mut h = harness(test_config());
        h.session.start();
        h.session.on_file_added(PathBuf::from("/tmp/in/a.png"));
        h.session.clear_paths();
        assert!(h.session.collected().is_empty());
        assert_eq!(h.session.status(), "Cleared");
    }

    #[test]
    fn remove_path_drops_one_entry() {
        let mut h = harness(test_config());
        h.session.start();
        h.session.on_file_added(PathBuf::from("/tmp/in/a.png"));
        h.session.on_file_added(PathBuf::from("/tmp/in/b.png"));
        h.session.remove_path(0);
        assert_eq!(h.session.collected(), ["/tmp/in/b.png"]);
    }

    #[test]
    fn remove_path_out_of_range_is_a_noop() {
        let mut h = harness(test_config());
        h.session.start();
        h.session.on_file_added(PathBuf::from("/tmp/in/a.png"));
        h.session.remove_path(5);
        assert_eq!(h.session.collected().len(), 1);
    }

    // ── apply_config ──────────────────────────────────────────────────────────

    #[test]
    fn reload_updates_folder_while_idle() {
        let mut h = harness(test_config());
        let mut new_config = test_config();
        new_config.watch.folder = "/tmp/other".to_string();
        h.session.apply_config(&new_config);
        assert_eq!(h.session.watch_folder(), "/tmp/other");
    }

    #[test]
    fn reload_keeps_folder_of_active_session() {
        let mut h = harness(test_config());
        h.session.start();
        let mut new_config = test_config();
        new_config.watch.folder = "/tmp/other".to_string();
        h.session.apply_config(&new_config);
        assert_eq!(h.session.watch_folder(), "/tmp/in");

        // After the session ends the new folder takes over.
        h.session.stop(StopPolicy::Commit);
        h.session.apply_config(&new_config);
        assert_eq!(h.session.watch_folder(), "/tmp/other");
    }

    #[test]
    fn reload_applies_templates_immediately() {
        let mut h = harness(test_config());
        h.session.start();
        h.session.on_file_added(PathBuf::from("/tmp/in/a.png"));

        let mut new_config = test_config();
        new_config.templates.single = "file -> {path}".to_string();
        h.session.apply_config(&new_config);

        h.session.stop(StopPolicy::Commit);
        assert_eq!(published(&h.log), ["file -> /tmp/in/a.png"]);
    }
}
