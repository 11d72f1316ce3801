/// Login-startup registration via the `HKCU\...\Run` registry key.
///
/// A tray-style utility is only useful if it is already running when the user
/// drops files into the watched folder, so the daemon adds itself to the
/// per-user Run key on every launch (idempotently).  Running the daemon with
/// the `--unregister-startup` flag removes the entry again.
///
/// On non-Windows platforms both functions compile and succeed as no-ops.
use anyhow::Result;

// ── Windows implementation ─────────────────────────────────────────────────────

#[cfg(windows)]
mod imp {
    use anyhow::{bail, Result};
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::ERROR_SUCCESS;
    use windows::Win32::System::Registry::{
        RegCloseKey, RegCreateKeyExW, RegDeleteValueW, RegSetValueExW, HKEY,
        HKEY_CURRENT_USER, KEY_SET_VALUE, REG_OPTION_NON_VOLATILE, REG_SZ,
    };

    const RUN_KEY: &str = r"Software\Microsoft\Windows\CurrentVersion\Run";
    const VALUE_NAME: &str = "Dropclip";

    /// Null-terminated UTF-16 for the registry APIs.
    fn to_wide(s: &str) -> Vec<u16> {
        s.encode_utf16().chain(std::iter::once(0)).collect()
    }

    /// Opens (creating if needed) the per-user Run key with write access.
    /// The caller owns the returned handle and must close it.
    fn open_run_key() -> Result<HKEY> {
        let key_w = to_wide(RUN_KEY);
        let mut hkey = HKEY::default();
        let err = unsafe {
            RegCreateKeyExW(
                HKEY_CURRENT_USER,
                PCWSTR::from_raw(key_w.as_ptr()),
                0,
                PCWSTR::null(),
                REG_OPTION_NON_VOLATILE,
                KEY_SET_VALUE,
                None,
                &mut hkey,
                None,
            )
        };
        if err != ERROR_SUCCESS {
            bail!("RegCreateKeyExW failed: {err:?}");
        }
        Ok(hkey)
    }

    /// Writes `exe_path` as the `Dropclip` value.  Idempotent.
    pub fn set_run_value(exe_path: &str) -> Result<()> {
        let val_w = to_wide(VALUE_NAME);
        let data_w = to_wide(exe_path);
        let data_bytes: &[u8] = unsafe {
            std::slice::from_raw_parts(data_w.as_ptr() as *const u8, data_w.len() * 2)
        };

        let hkey = open_run_key()?;
        let err = unsafe {
            RegSetValueExW(hkey, PCWSTR::from_raw(val_w.as_ptr()), 0, REG_SZ, Some(data_bytes))
        };
        unsafe {
            let _ = RegCloseKey(hkey);
        }
        if err != ERROR_SUCCESS {
            bail!("RegSetValueExW failed: {err:?}");
        }
        Ok(())
    }

    /// Deletes the `Dropclip` value.  Succeeds when it was already absent.
    pub fn delete_run_value() -> Result<()> {
        let val_w = to_wide(VALUE_NAME);
        let hkey = open_run_key()?;
        let err = unsafe { RegDeleteValueW(hkey, PCWSTR::from_raw(val_w.as_ptr())) };
        unsafe {
            let _ = RegCloseKey(hkey);
        }
        // 2 = ERROR_FILE_NOT_FOUND: the value was never there.
        if err != ERROR_SUCCESS && err.0 != 2 {
            bail!("RegDeleteValueW failed: {err:?}");
        }
        Ok(())
    }
}

// ── Public API ─────────────────────────────────────────────────────────────────

/// Registers the running daemon binary to launch automatically at user login.
/// Idempotent — safe to call on every startup.
pub fn register_startup() -> Result<()> {
    #[cfg(windows)]
    {
        let exe = std::env::current_exe()
            .map_err(|e| anyhow::anyhow!("Failed to locate daemon executable: {e}"))?;
        let exe_str = exe.to_string_lossy();
        imp::set_run_value(&exe_str)?;
        println!("[startup] Registered in Windows startup: {exe_str}");
    }
    Ok(())
}

/// Removes the daemon from the login-startup registry.
pub fn unregister_startup() -> Result<()> {
    #[cfg(windows)]
    {
        imp::delete_run_value()?;
        println!("[startup] Removed from Windows startup registry");
    }
    Ok(())
}
