/// Frontmost-application inspection and activation.
///
/// The allow-list decision and the paste delivery both need to know which
/// application owns the foreground window at the instant the trigger chord
/// fires.  On Windows this is the foreground window's owning process; the
/// process's executable name (lowercased) doubles as its identity for the
/// allow-list.  On other platforms the inspector reports no frontmost
/// application, which makes the smart-paste flow fall back to a plain
/// stop-and-copy.
use sysinfo::{Pid, ProcessesToUpdate, System};

/// The application that owned the foreground window when a chord fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessTarget {
    pub pid: u32,
    /// Lowercased executable name, e.g. "notepad.exe".
    pub app_id: String,
    /// Native window handle captured alongside the pid, used to re-activate
    /// the same window later.
    #[cfg(windows)]
    pub window: isize,
}

impl ProcessTarget {
    /// Target with no native window handle; activation and window-message
    /// delivery fail benignly and the chain falls through to synthetic input.
    #[cfg(test)]
    pub fn from_pid(pid: u32, app_id: impl Into<String>) -> Self {
        #[cfg(windows)]
        {
            Self { pid, app_id: app_id.into(), window: 0 }
        }
        #[cfg(not(windows))]
        {
            Self { pid, app_id: app_id.into() }
        }
    }
}

pub trait FocusInspector: Send + Sync {
    /// Identifies the frontmost application, or `None` if there is none or it
    /// cannot be resolved to a process.
    fn frontmost(&self) -> Option<ProcessTarget>;
    /// Brings `target` back to the foreground.  Returns false when the OS
    /// refuses; the caller treats that as best-effort.
    fn activate(&self, target: &ProcessTarget) -> bool;
}

pub struct SystemFocus;

/// Resolves a pid to its lowercased executable name.
#[cfg_attr(not(windows), allow(dead_code))]
fn executable_name(pid: u32) -> Option<String> {
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[Pid::from_u32(pid)]), false);
    sys.process(Pid::from_u32(pid))
        .map(|p| p.name().to_string_lossy().to_lowercase())
}

#[cfg(windows)]
impl FocusInspector for SystemFocus {
    fn frontmost(&self) -> Option<ProcessTarget> {
        use windows::Win32::UI::WindowsAndMessaging::{
            GetForegroundWindow, GetWindowThreadProcessId,
        };

        let hwnd = unsafe { GetForegroundWindow() };
        if hwnd.0 == 0 {
            return None;
        }
        let mut pid: u32 = 0;
        unsafe { GetWindowThreadProcessId(hwnd, Some(&mut pid)) };
        if pid == 0 {
            return None;
        }
        let app_id = executable_name(pid)?;
        Some(ProcessTarget { pid, app_id, window: hwnd.0 })
    }

    fn activate(&self, target: &ProcessTarget) -> bool {
        use windows::Win32::Foundation::HWND;
        use windows::Win32::UI::WindowsAndMessaging::SetForegroundWindow;

        unsafe { SetForegroundWindow(HWND(target.window)).as_bool() }
    }
}

#[cfg(not(windows))]
impl FocusInspector for SystemFocus {
    fn frontmost(&self) -> Option<ProcessTarget> {
        None
    }

    fn activate(&self, _target: &ProcessTarget) -> bool {
        false
    }
}
