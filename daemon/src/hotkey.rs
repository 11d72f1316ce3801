/// Global chord listener using a low-level Windows keyboard hook (`WH_KEYBOARD_LL`).
///
/// The hook runs on a dedicated OS thread with its own Windows message pump, so
/// registered chords fire no matter which application has focus.  The hook
/// thread exits cleanly when [`HotkeyHandle::stop`] is called.
///
/// On non-Windows platforms the public API compiles but is a no-op at runtime.
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use anyhow::Result;
use tokio::sync::mpsc;

use crate::event::DaemonEvent;

/// Identifies one registered chord.  Re-registering an identifier replaces the
/// prior binding (the old one is removed before the new one is stored).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChordId {
    StartWatch,
    StopWatch,
    PasteTrigger,
}

// ── Modifiers ─────────────────────────────────────────────────────────────────

/// Modifier-key bitset: control, alt, shift, super (Windows key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Modifiers(u8);

impl Modifiers {
    pub const CONTROL: Modifiers = Modifiers(1);
    pub const ALT: Modifiers = Modifiers(1 << 1);
    pub const SHIFT: Modifiers = Modifiers(1 << 2);
    pub const SUPER: Modifiers = Modifiers(1 << 3);

    pub const fn empty() -> Self {
        Modifiers(0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn union(self, other: Modifiers) -> Modifiers {
        Modifiers(self.0 | other.0)
    }

    pub const fn contains(self, other: Modifiers) -> bool {
        self.0 & other.0 == other.0
    }

    /// Parses a modifier name as written in the config file.
    /// Accepts the common aliases; returns `None` for anything else.
    pub fn from_name(name: &str) -> Option<Modifiers> {
        match name.to_lowercase().as_str() {
            "control" | "ctrl" => Some(Self::CONTROL),
            "alt" | "option" => Some(Self::ALT),
            "shift" => Some(Self::SHIFT),
            "super" | "win" | "cmd" => Some(Self::SUPER),
            _ => None,
        }
    }

    /// Virtual-key codes for the physical keys backing this modifier set.
    /// Super maps to both left and right Windows keys.
    pub fn virtual_keys(self) -> Vec<u32> {
        let mut keys = Vec::new();
        if self.contains(Self::CONTROL) {
            keys.push(0x11); // VK_CONTROL
        }
        if self.contains(Self::ALT) {
            keys.push(0x12); // VK_MENU
        }
        if self.contains(Self::SHIFT) {
            keys.push(0x10); // VK_SHIFT
        }
        if self.contains(Self::SUPER) {
            keys.push(0x5B); // VK_LWIN
            keys.push(0x5C); // VK_RWIN
        }
        keys
    }
}

/// A key code plus a modifier set, recognized system-wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chord {
    pub vk: u32,
    pub modifiers: Modifiers,
}

impl Chord {
    /// All physical keys involved in the chord: the main key plus the
    /// virtual keys of every modifier.  Used by the paste deliverer to wait
    /// for the originating key combination to be released.
    pub fn physical_keys(self) -> Vec<u32> {
        let mut keys = vec![self.vk];
        keys.extend(self.modifiers.virtual_keys());
        keys
    }
}

/// Converts a key name string (e.g. `"F8"`, `"A"`) to a Windows virtual-key code.
///
/// Supported keys:
/// - Function keys `F1`–`F12` (case-insensitive).
/// - ASCII letters `A`–`Z` (normalised to their uppercase VK values, `0x41`–`0x5A`).
/// - ASCII digits `0`–`9` (VK values `0x30`–`0x39`).
/// - `SPACE` (VK value `0x20`).
///
/// Returns `None` for any unrecognised name.
pub fn parse_vk(name: &str) -> Option<u32> {
    match name.to_uppercase().as_str() {
        "F1"  => Some(0x70),
        "F2"  => Some(0x71),
        "F3"  => Some(0x72),
        "F4"  => Some(0x73),
        "F5"  => Some(0x74),
        "F6"  => Some(0x75),
        "F7"  => Some(0x76),
        "F8"  => Some(0x77),
        "F9"  => Some(0x78),
        "F10" => Some(0x79),
        "F11" => Some(0x7A),
        "F12" => Some(0x7B),
        "SPACE" => Some(0x20),
        s if s.len() == 1 => {
            let c = s.chars().next().unwrap();
            if c.is_ascii_alphanumeric() {
                // 'A'=0x41…'Z'=0x5A; '0'=0x30…'9'=0x39 — exact match to Windows VK codes.
                Some(c.to_ascii_uppercase() as u32)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// True when the physical key for `vk` is currently held down.
/// Always false on non-Windows platforms.
pub fn is_key_down(vk: u32) -> bool {
    #[cfg(windows)]
    {
        imp::is_key_down(vk)
    }
    #[cfg(not(windows))]
    {
        let _ = vk;
        false
    }
}

// ── Bus contract ──────────────────────────────────────────────────────────────

/// System-wide chord registrar.  Chord fires are delivered as
/// [`DaemonEvent::ChordPressed`] on the daemon event channel, never on the
/// caller's thread.
pub trait HotkeyBus: Send + Sync {
    /// Registers `chord` under `id`, atomically replacing any existing binding
    /// for that identifier.
    fn register(&self, id: ChordId, chord: Chord) -> Result<()>;
    /// Removes the binding for `id`.  No-op if none is registered.
    fn unregister(&self, id: ChordId);
    /// Removes every binding.
    fn unregister_all(&self);
}

// ── Hook-backed implementation ────────────────────────────────────────────────

struct HookShared {
    bindings: Mutex<HashMap<ChordId, Chord>>,
    /// Read by the hook callback, which only exists on Windows.
    #[cfg_attr(not(windows), allow(dead_code))]
    tx: mpsc::Sender<DaemonEvent>,
}

/// The hook callback receives no user-data pointer, so it reads the binding
/// table and event channel through this process-wide slot.  Set once by
/// [`GlobalHotkeys::start`].
static HOOK_SHARED: OnceLock<Arc<HookShared>> = OnceLock::new();

/// [`HotkeyBus`] backed by the keyboard hook.
pub struct GlobalHotkeys {
    shared: Arc<HookShared>,
}

/// A handle to the running keyboard hook, used to stop the hook thread when
/// the daemon exits.
pub struct HotkeyHandle {
    #[cfg(windows)]
    _thread: std::thread::JoinHandle<()>,
    /// Thread ID of the message-pump thread, used to post `WM_QUIT`.
    #[cfg(windows)]
    thread_id: u32,
}

impl HotkeyHandle {
    /// Signals the hook thread to stop and blocks until it exits.
    pub fn stop(self) {
        #[cfg(windows)]
        {
            imp::post_quit(self.thread_id);
            let _ = self._thread.join();
        }
    }
}

impl GlobalHotkeys {
    /// Installs a `WH_KEYBOARD_LL` keyboard hook on a dedicated OS thread and
    /// returns the bus plus a [`HotkeyHandle`] for shutting it down.
    ///
    /// When a registered chord is pressed, [`DaemonEvent::ChordPressed`] is
    /// sent to `tx` via a non-blocking [`try_send`](mpsc::Sender::try_send).
    /// If the channel is full the press is silently dropped for that cycle.
    ///
    /// # Windows
    /// Panics if `SetWindowsHookExW` fails.
    ///
    /// # Non-Windows
    /// Returns a stub handle; registration succeeds but no chords ever fire.
    pub fn start(tx: mpsc::Sender<DaemonEvent>) -> (Arc<GlobalHotkeys>, HotkeyHandle) {
        let shared = Arc::new(HookShared {
            bindings: Mutex::new(HashMap::new()),
            tx,
        });
        // Silently ignore if called more than once (e.g. in test binaries).
        let _ = HOOK_SHARED.set(Arc::clone(&shared));
        let bus = Arc::new(GlobalHotkeys { shared });

        #[cfg(windows)]
        {
            let (id_tx, id_rx) = std::sync::mpsc::sync_channel::<u32>(1);
            let thread = std::thread::Builder::new()
                .name("hotkey-pump".into())
                .spawn(move || imp::run_message_pump(id_tx))
                .expect("Failed to spawn hotkey thread");
            let thread_id = id_rx.recv().expect("hotkey thread did not send its ID");
            (bus, HotkeyHandle { _thread: thread, thread_id })
        }

        #[cfg(not(windows))]
        (bus, HotkeyHandle {})
    }

    #[cfg(test)]
    fn binding(&self, id: ChordId) -> Option<Chord> {
        self.shared.bindings.lock().unwrap().get(&id).copied()
    }
}

impl HotkeyBus for GlobalHotkeys {
    fn register(&self, id: ChordId, chord: Chord) -> Result<()> {
        let mut bindings = self.shared.bindings.lock().unwrap();
        // Remove-then-insert under one lock so the replacement is atomic with
        // respect to the hook callback.
        bindings.remove(&id);
        bindings.insert(id, chord);
        println!("[hotkey] Registered {id:?} (vk 0x{:02X})", chord.vk);
        Ok(())
    }

    fn unregister(&self, id: ChordId) {
        if self.shared.bindings.lock().unwrap().remove(&id).is_some() {
            println!("[hotkey] Unregistered {id:?}");
        }
    }

    fn unregister_all(&self) {
        self.shared.bindings.lock().unwrap().clear();
    }
}

// ── Windows implementation ────────────────────────────────────────────────────

#[cfg(windows)]
mod imp {
    use std::sync::mpsc as std_mpsc;

    use windows::Win32::Foundation::{HINSTANCE, LPARAM, LRESULT, WPARAM};
    use windows::Win32::System::Threading::GetCurrentThreadId;
    use windows::Win32::UI::Input::KeyboardAndMouse::GetAsyncKeyState;
    use windows::Win32::UI::WindowsAndMessaging::{
        CallNextHookEx, DispatchMessageW, GetMessageW, PostThreadMessageW,
        SetWindowsHookExW, UnhookWindowsHookEx,
        KBDLLHOOKSTRUCT, MSG, WH_KEYBOARD_LL, WM_KEYDOWN, WM_QUIT, WM_SYSKEYDOWN,
    };

    use super::{Modifiers, HOOK_SHARED};
    use crate::event::DaemonEvent;

    pub fn is_key_down(vk: u32) -> bool {
        // High bit set = key currently down.
        unsafe { (GetAsyncKeyState(vk as i32) as u16 & 0x8000) != 0 }
    }

    /// Low-level keyboard hook procedure.
    ///
    /// Called by Windows on every keyboard event system-wide.  Alt chords
    /// arrive as `WM_SYSKEYDOWN`, everything else as `WM_KEYDOWN`.
    unsafe extern "system" fn keyboard_proc(
        n_code: i32,
        w_param: WPARAM,
        l_param: LPARAM,
    ) -> LRESULT {
        let msg = w_param.0 as u32;
        if n_code >= 0 && (msg == WM_KEYDOWN || msg == WM_SYSKEYDOWN) {
            let kb = &*(l_param.0 as *const KBDLLHOOKSTRUCT);
            if let Some(shared) = HOOK_SHARED.get() {
                let bindings = shared.bindings.lock().unwrap();
                for (id, chord) in bindings.iter() {
                    if kb.vkCode == chord.vk && chord_modifiers_down(chord.modifiers) {
                        // try_send is non-blocking; a full channel silently
                        // drops this press.
                        let _ = shared.tx.try_send(DaemonEvent::ChordPressed(*id));
                    }
                }
            }
        }
        CallNextHookEx(None, n_code, w_param, l_param)
    }

    /// True when every modifier in `required` is currently held.  Super is
    /// satisfied by either Windows key; extra held modifiers are ignored.
    fn chord_modifiers_down(required: Modifiers) -> bool {
        if required.contains(Modifiers::CONTROL) && !is_key_down(0x11) {
            return false;
        }
        if required.contains(Modifiers::ALT) && !is_key_down(0x12) {
            return false;
        }
        if required.contains(Modifiers::SHIFT) && !is_key_down(0x10) {
            return false;
        }
        if required.contains(Modifiers::SUPER) && !is_key_down(0x5B) && !is_key_down(0x5C) {
            return false;
        }
        true
    }

    /// Installs `WH_KEYBOARD_LL`, runs a Windows message pump until `WM_QUIT`,
    /// then uninstalls the hook.
    ///
    /// Sends the current thread ID to `id_tx` before entering the pump so that
    /// [`super::GlobalHotkeys::start`] can later use it to post `WM_QUIT`.
    pub fn run_message_pump(id_tx: std_mpsc::SyncSender<u32>) {
        unsafe {
            let _ = id_tx.send(GetCurrentThreadId());
            drop(id_tx);

            let hook = SetWindowsHookExW(
                WH_KEYBOARD_LL,
                Some(keyboard_proc),
                HINSTANCE::default(),
                0,
            )
            .expect("SetWindowsHookExW failed");

            let mut msg = MSG::default();
            // GetMessageW: >0 = message, 0 = WM_QUIT, <0 = error.
            while GetMessageW(&mut msg, None, 0, 0).0 > 0 {
                DispatchMessageW(&msg);
            }

            let _ = UnhookWindowsHookEx(hook);
            eprintln!("[hotkey] Hook thread exited");
        }
    }

    /// Posts `WM_QUIT` to `thread_id`, causing its `GetMessageW` loop to exit.
    pub fn post_quit(thread_id: u32) {
        unsafe {
            let _ = PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0));
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
