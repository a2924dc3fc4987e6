//! Callbacks for user interaction during a reconcile run
//!
//! These traits keep the engine free of any terminal code. The binary
//! provides interactive implementations; tests script the answers.

use crate::change::Change;
use crate::error::Result;

/// Progress callback for a reconcile run
pub trait ProgressCallback: Send {
    /// Called when a workflow step starts, e.g. "Read current state..."
    fn on_phase(&mut self, message: &str);

    /// Called when the user asked to see the pending changes
    fn on_change_list(&mut self, changes: &[Change]);

    /// Called before a change is executed (`index` is one-based)
    fn on_change_start(&mut self, index: usize, total: usize, change: &Change);
}

/// Confirmation callback for user interaction
pub trait ConfirmCallback: Send {
    /// Ask a yes/no question
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_phase(&mut self, _message: &str) {}
    fn on_change_list(&mut self, _changes: &[Change]) {}
    fn on_change_start(&mut self, _index: usize, _total: usize, _change: &Change) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}
