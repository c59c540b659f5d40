//! Clipboard copy with timed clearing, used by the `copy` command.

use crate::error::{PassTreeError, Result};
use copypasta::{ClipboardContext, ClipboardProvider};
use std::time::Duration;
use tokio::time::sleep;
use zeroize::Zeroizing;

/// Clipboard manager for secure clipboard operations.
pub struct ClipboardManager;

impl ClipboardManager {
    /// Copy text, wait for `timeout_secs`, then clear the clipboard if it
    /// still holds our text.
    pub async fn copy_for(text: &str, timeout_secs: u64) -> Result<()> {
        Self::copy(text)?;
        sleep(Duration::from_secs(timeout_secs)).await;

        if let Ok(current) = Self::get_contents() {
            let current = Zeroizing::new(current);
            if current.as_str() == text {
                Self::clear()?;
            }
        }
        Ok(())
    }

    /// Copy text to clipboard.
    pub fn copy(text: &str) -> Result<()> {
        let mut ctx = ClipboardContext::new().map_err(|_| PassTreeError::ClipboardFailed)?;

        ctx.set_contents(text.to_string())
            .map_err(|_| PassTreeError::ClipboardFailed)?;

        Ok(())
    }

    /// Get clipboard contents.
    pub fn get_contents() -> Result<String> {
        let mut ctx = ClipboardContext::new().map_err(|_| PassTreeError::ClipboardFailed)?;

        ctx.get_contents().map_err(|_| PassTreeError::ClipboardFailed)
    }

    /// Clear clipboard.
    pub fn clear() -> Result<()> {
        Self::copy("")
    }
}
