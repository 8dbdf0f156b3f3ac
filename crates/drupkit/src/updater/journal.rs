//! Record of what a sync found and what it plans to do.

use super::action::Action;
use crate::error::Result;

/// Actions, errors, warnings and notices collected during a sync.
///
/// Every entry is also forwarded to the `log` facade as it is recorded.
#[derive(Debug, Clone, Default)]
pub struct Log {
    actions: Vec<Action>,
    errors: Vec<String>,
    warnings: Vec<String>,
    notices: Vec<String>,
}

impl Log {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a planned action.
    pub fn action(&mut self, action: Action) {
        log::info!("{}", action.message());
        self.actions.push(action);
    }

    /// Record an error. Errors block applying changes unless forced.
    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::error!("{message}");
        self.errors.push(message);
    }

    /// Record a warning.
    pub fn warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{message}");
        self.warnings.push(message);
    }

    /// Record an informational notice.
    pub fn notice(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::info!("{message}");
        self.notices.push(message);
    }

    /// Recorded actions, pending or not.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Recorded errors.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Recorded warnings.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Recorded notices.
    pub fn notices(&self) -> &[String] {
        &self.notices
    }

    /// Whether any action was recorded.
    pub fn has_actions(&self) -> bool {
        !self.actions.is_empty()
    }

    /// Whether any action has not fired yet.
    pub fn has_pending_actions(&self) -> bool {
        self.actions.iter().any(Action::is_pending)
    }

    /// Whether any error was recorded.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Whether any warning was recorded.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Whether any notice was recorded.
    pub fn has_notices(&self) -> bool {
        !self.notices.is_empty()
    }

    /// Fire every pending action in order. Returns how many fired.
    ///
    /// Stops at the first action that fails.
    pub fn apply_pending_actions(&self) -> Result<usize> {
        let mut fired = 0;
        for action in &self.actions {
            if action.fire()? {
                fired += 1;
            }
        }
        Ok(fired)
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.actions.clear();
        self.errors.clear();
        self.warnings.clear();
        self.notices.clear();
    }

    /// A new log holding this log's entries followed by `other`'s.
    ///
    /// Actions keep their identity: firing one through either log marks it
    /// done in both.
    pub fn merged(&self, other: &Log) -> Log {
        let mut merged = self.clone();
        merged.actions.extend(other.actions.iter().cloned());
        merged.errors.extend(other.errors.iter().cloned());
        merged.warnings.extend(other.warnings.iter().cloned());
        merged.notices.extend(other.notices.iter().cloned());
        merged
    }

    /// One line per pending action followed by errors and warnings.
    pub fn summary(&self) -> String {
        let mut lines: Vec<String> = self
            .actions
            .iter()
            .filter(|a| a.is_pending())
            .map(|a| a.message().to_string())
            .collect();
        lines.extend(self.errors.iter().map(|e| format!("ERROR: {e}")));
        lines.extend(self.warnings.iter().map(|w| format!("WARNING: {w}")));
        lines.join("\n")
    }
}
