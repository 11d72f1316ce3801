use anyhow::{Context, Result};

/// Destination for the formatted path list.  Replaces the current clipboard
/// contents unconditionally.
pub trait ClipboardSink: Send + Sync {
    fn publish(&self, text: &str) -> Result<()>;
}

/// [`ClipboardSink`] backed by the system clipboard via arboard.
///
/// A new clipboard handle is opened per call: the handle is cheap to
/// construct and is not `Send`, so holding one across the async session
/// context is not an option.
pub struct SystemClipboard;

impl ClipboardSink for SystemClipboard {
    fn publish(&self, text: &str) -> Result<()> {
        let mut clipboard =
            arboard::Clipboard::new().context("Failed to open the system clipboard")?;
        clipboard
            .set_text(text.to_owned())
            .context("Failed to write clipboard text")?;
        Ok(())
    }
}
