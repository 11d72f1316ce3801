/// Paste delivery with a tiered fallback chain.
///
/// Tiers, tried in order, first success short-circuits:
///   1. A `WM_PASTE` window message to the target's foreground window.
///   2. The Windows Script Host (`WScript.Shell.SendKeys`) via PowerShell,
///      which routes through the normal input queue of the focused window.
///   3. Raw synthesized key events (Ctrl+V / Cmd+V) posted with enigo.
///
/// All tiers run only after the originating chord's physical keys have been
/// confirmed released (bounded poll plus a settle delay) — synthesizing a
/// paste while the trigger modifiers are still held would combine them with
/// the synthetic keystroke or re-trigger the chord.
use std::time::{Duration, Instant};

use anyhow::{bail, Result};

use crate::focus::ProcessTarget;
use crate::hotkey::{self, Chord};

const RELEASE_POLL_TIMEOUT: Duration = Duration::from_secs(1);
const RELEASE_POLL_STEP: Duration = Duration::from_millis(50);
/// Grace period between key release and the first delivery attempt.
const SETTLE_DELAY: Duration = Duration::from_millis(120);

/// Delivers a "paste" command to a target application.
///
/// Blocks for up to the release timeout; call from a blocking-capable
/// context, never from the session event loop.
pub trait PasteDeliverer: Send + Sync {
    /// `origin` is the chord whose press initiated the delivery.
    fn deliver(&self, target: &ProcessTarget, origin: Chord) -> Result<()>;
}

/// One way of making the target application perform a paste.
pub trait PasteStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn attempt(&self, target: &ProcessTarget) -> Result<()>;
}

/// [`PasteDeliverer`] that walks an ordered strategy list.
pub struct FallbackPaste {
    strategies: Vec<Box<dyn PasteStrategy>>,
}

impl FallbackPaste {
    pub fn new(strategies: Vec<Box<dyn PasteStrategy>>) -> Self {
        Self { strategies }
    }

    /// The production chain, most precise tier first.
    pub fn with_default_strategies() -> Self {
        Self::new(vec![
            Box::new(WindowMessagePaste),
            Box::new(ScriptHostPaste),
            Box::new(SyntheticKeyPaste),
        ])
    }
}

impl PasteDeliverer for FallbackPaste {
    fn deliver(&self, target: &ProcessTarget, origin: Chord) -> Result<()> {
        wait_for_release(origin);
        for strategy in &self.strategies {
            match strategy.attempt(target) {
                Ok(()) => {
                    println!("[paste] Delivered to {} via {}", target.app_id, strategy.name());
                    return Ok(());
                }
                Err(e) => eprintln!("[paste] Tier '{}' failed: {e}", strategy.name()),
            }
        }
        bail!("All paste strategies failed for {}", target.app_id)
    }
}

/// Polls until every physical key of `origin` is released, bounded by
/// [`RELEASE_POLL_TIMEOUT`], then sleeps the settle delay.
fn wait_for_release(origin: Chord) {
    let keys = origin.physical_keys();
    let deadline = Instant::now() + RELEASE_POLL_TIMEOUT;
    while keys.iter().any(|&vk| hotkey::is_key_down(vk)) {
        if Instant::now() >= deadline {
            eprintln!(
                "[paste] Trigger keys still down after {RELEASE_POLL_TIMEOUT:?}; continuing anyway"
            );
            break;
        }
        std::thread::sleep(RELEASE_POLL_STEP);
    }
    std::thread::sleep(SETTLE_DELAY);
}

// ── Tier 1: window message ────────────────────────────────────────────────────

/// Posts `WM_PASTE` to the window captured when the chord fired.
pub struct WindowMessagePaste;

impl PasteStrategy for WindowMessagePaste {
    fn name(&self) -> &'static str {
        "window-message"
    }

    #[cfg(windows)]
    fn attempt(&self, target: &ProcessTarget) -> Result<()> {
        use anyhow::Context;
        use windows::Win32::Foundation::{HWND, LPARAM, WPARAM};
        use windows::Win32::UI::WindowsAndMessaging::{PostMessageW, WM_PASTE};

        if target.window == 0 {
            bail!("No window handle captured for pid {}", target.pid);
        }
        unsafe { PostMessageW(HWND(target.window), WM_PASTE, WPARAM(0), LPARAM(0)) }
            .context("PostMessageW(WM_PASTE) failed")?;
        Ok(())
    }

    #[cfg(not(windows))]
    fn attempt(&self, _target: &ProcessTarget) -> Result<()> {
        bail!("Not supported on this platform")
    }
}

// ── Tier 2: script host ───────────────────────────────────────────────────────

/// Sends the paste shortcut through the Windows Script Host, which delivers
/// it to whatever window currently has focus (the coordinator activates the
/// target first).
pub struct ScriptHostPaste;

impl PasteStrategy for ScriptHostPaste {
    fn name(&self) -> &'static str {
        "script-host"
    }

    #[cfg(windows)]
    fn attempt(&self, _target: &ProcessTarget) -> Result<()> {
        use anyhow::Context;

        let status = std::process::Command::new("powershell")
            .args([
                "-NoProfile",
                "-Command",
                "(New-Object -ComObject WScript.Shell).SendKeys('^v')",
            ])
            .status()
            .context("Failed to launch powershell")?;
        if !status.success() {
            bail!("powershell exited with {status}");
        }
        Ok(())
    }

    #[cfg(not(windows))]
    fn attempt(&self, _target: &ProcessTarget) -> Result<()> {
        bail!("Not supported on this platform")
    }
}

// ── Tier 3: synthesized input ─────────────────────────────────────────────────

/// Posts low-level key events for the platform paste shortcut.
///
/// A new enigo handle is created per attempt: the handle is cheap and is not
/// `Send`, so it cannot live in the deliverer across threads.
pub struct SyntheticKeyPaste;

impl PasteStrategy for SyntheticKeyPaste {
    fn name(&self) -> &'static str {
        "synthetic-keys"
    }

    fn attempt(&self, _target: &ProcessTarget) -> Result<()> {
        use enigo::{Direction, Enigo, Key, Keyboard, Settings};

        let mut enigo = Enigo::new(&Settings::default())
            .map_err(|e| anyhow::anyhow!("Failed to initialise input synthesis: {e}"))?;

        #[cfg(target_os = "macos")]
        let modifier = Key::Meta;
        #[cfg(not(target_os = "macos"))]
        let modifier = Key::Control;

        enigo
            .key(modifier, Direction::Press)
            .map_err(|e| anyhow::anyhow!("Modifier press failed: {e}"))?;
        let result = enigo
            .key(Key::Unicode('v'), Direction::Click)
            .map_err(|e| anyhow::anyhow!("Key click failed: {e}"));
        // Always release the modifier, even when the click failed.
        enigo
            .key(modifier, Direction::Release)
            .map_err(|e| anyhow::anyhow!("Modifier release failed: {e}"))?;
        result?;
        Ok(())
    }
}
