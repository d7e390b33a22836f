use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Deref, DerefMut};

use crate::time::log_timestamp;

pub const IDLE: &str = "Idle";

/// Runtime state of the worklist server: running flag, request counter,
/// current activity text and the accumulated error log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStatus {
    running: bool,
    request_count: u64,
    status_text: String,
    errors: Vec<String>,
}

impl ServerStatus {
    pub fn new() -> Self {
        Self {
            running: false,
            request_count: 0,
            status_text: IDLE.to_string(),
            errors: Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    /// Count one handled request and return the new total.
    pub fn record_request(&mut self) -> u64 {
        self.request_count += 1;
        self.request_count
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    pub fn set_status_text(&mut self, text: impl Into<String>) {
        self.status_text = text.into();
    }

    /// Errors recorded since the last snapshot.
    pub fn pending_errors(&self) -> &[String] {
        &self.errors
    }

    /// Append a timestamped error to the log.
    pub fn error(&mut self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::warn!(target: "octowl::status", "{message}");
        self.errors
            .push(format!("{} Error: {message}", log_timestamp()));
    }

    /// Capture the current state and clear the error log.
    ///
    /// Every snapshot consumes the errors it reports; a second snapshot taken
    /// without new failures shows none.
    pub fn take_snapshot(&mut self) -> StatusSnapshot {
        StatusSnapshot {
            running: self.running,
            request_count: self.request_count,
            status_text: self.status_text.clone(),
            last_errors: std::mem::take(&mut self.errors),
        }
    }

    /// Human-readable snapshot, clearing the error log.
    pub fn render(&mut self) -> String {
        self.take_snapshot().to_string()
    }

    /// Enter a guarded operation, see [`ScopedStatus`].
    pub fn scoped(&mut self, action: &str) -> ScopedStatus<'_> {
        ScopedStatus::enter(self, action)
    }
}

impl Default for ServerStatus {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub running: bool,
    #[serde(rename = "requestCount")]
    pub request_count: u64,
    #[serde(rename = "statusText")]
    pub status_text: String,
    #[serde(rename = "lastErrors")]
    pub last_errors: Vec<String>,
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Running: {}\n Requests: {}\n State: {}\n Last Errors: ",
            self.running, self.request_count, self.status_text
        )?;
        if self.last_errors.is_empty() {
            return f.write_str("None");
        }
        for line in &self.last_errors {
            write!(f, "\n\t{line}")?;
        }
        Ok(())
    }
}

/// Marks a [`ServerStatus`] as busy for the lifetime of the guard.
///
/// Entering sets the status text to `Processing: <action>` and counts one
/// request. Dropping the guard restores the previous text, or applies the
/// final text registered with [`ScopedStatus::change_status`]. The guard
/// derefs to the status so errors can be logged while it is held.
pub struct ScopedStatus<'a> {
    status: &'a mut ServerStatus,
    previous: String,
    final_text: Option<String>,
}

impl<'a> ScopedStatus<'a> {
    pub fn enter(status: &'a mut ServerStatus, action: &str) -> Self {
        let processing = if action.is_empty() {
            "Processing".to_string()
        } else {
            format!("Processing: {action}")
        };
        let previous = std::mem::replace(&mut status.status_text, processing);
        status.record_request();
        Self {
            status,
            previous,
            final_text: None,
        }
    }

    /// Enter with a final text already registered.
    pub fn with_final(status: &'a mut ServerStatus, action: &str, final_text: &str) -> Self {
        let mut scoped = Self::enter(status, action);
        scoped.change_status(final_text);
        scoped
    }

    /// Text to apply when the guard is dropped instead of the previous one.
    pub fn change_status(&mut self, final_text: impl Into<String>) {
        self.final_text = Some(final_text.into());
    }
}

impl Deref for ScopedStatus<'_> {
    type Target = ServerStatus;

    fn deref(&self) -> &ServerStatus {
        self.status
    }
}

impl DerefMut for ScopedStatus<'_> {
    fn deref_mut(&mut self) -> &mut ServerStatus {
        self.status
    }
}

impl Drop for ScopedStatus<'_> {
    fn drop(&mut self) {
        let text = self
            .final_text
            .take()
            .unwrap_or_else(|| std::mem::take(&mut self.previous));
        self.status.status_text = text;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_status_is_idle() {
        let status = ServerStatus::new();
        assert!(!status.is_running());
        assert_eq!(status.request_count(), 0);
        assert_eq!(status.status_text(), IDLE);
        assert!(status.pending_errors().is_empty());
    }

    #[test]
    fn test_render_without_errors() {
        let mut status = ServerStatus::new();
        assert_eq!(
            status.render(),
            "Running: false\n Requests: 0\n State: Idle\n Last Errors: None"
        );
    }

    #[test]
    fn test_render_consumes_errors() {
        let mut status = ServerStatus::new();
        status.error("Failed to save: a.dcm");
        status.error("Failed to save: b.dcm");

        let first = status.render();
        assert!(first.contains("Error: Failed to save: a.dcm"));
        assert!(first.contains("Error: Failed to save: b.dcm"));
        assert!(first.contains("\n\t"));

        let second = status.render();
        assert!(second.ends_with("Last Errors: None"));
    }

    #[test]
    fn test_error_lines_are_timestamped() {
        let mut status = ServerStatus::new();
        status.error("boom");
        let line = &status.pending_errors()[0];
        assert_eq!(line.len(), "HH:MM:SS Error: boom".len());
        assert_eq!(&line[2..3], ":");
        assert!(line.ends_with(" Error: boom"));
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let mut status = ServerStatus::new();
        status.set_running(true);
        let json = serde_json::to_value(status.take_snapshot()).unwrap();
        assert_eq!(json["running"], true);
        assert_eq!(json["requestCount"], 0);
        assert_eq!(json["statusText"], "Idle");
        assert!(json["lastErrors"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_scoped_status_restores_previous_text() {
        let mut status = ServerStatus::new();
        {
            let scoped = status.scoped("Adding a dataset");
            assert_eq!(scoped.status_text(), "Processing: Adding a dataset");
        }
        assert_eq!(status.status_text(), IDLE);
        assert_eq!(status.request_count(), 1);
    }

    #[test]
    fn test_scoped_status_without_action() {
        let mut status = ServerStatus::new();
        let scoped = status.scoped("");
        assert_eq!(scoped.status_text(), "Processing");
    }

    #[test]
    fn test_scoped_status_applies_final_text() {
        let mut status = ServerStatus::new();
        {
            let mut scoped = status.scoped("Starting");
            scoped.change_status("Listening");
        }
        assert_eq!(status.status_text(), "Listening");

        {
            let _scoped = ScopedStatus::with_final(&mut status, "Stopping", IDLE);
        }
        assert_eq!(status.status_text(), IDLE);
        assert_eq!(status.request_count(), 2);
    }

    #[test]
    fn test_scoped_status_restores_on_early_return() {
        fn guarded(status: &mut ServerStatus, bail: bool) -> bool {
            let mut scoped = status.scoped("Saving a dataset by index");
            if bail {
                return false;
            }
            scoped.error("not reached");
            true
        }

        let mut status = ServerStatus::new();
        status.set_status_text("Listening");
        assert!(!guarded(&mut status, true));
        assert_eq!(status.status_text(), "Listening");
        assert!(status.pending_errors().is_empty());

        assert!(guarded(&mut status, false));
        assert_eq!(status.status_text(), "Listening");
        assert_eq!(status.pending_errors().len(), 1);
    }

    #[test]
    fn test_scoped_status_restores_on_panic() {
        let mut status = ServerStatus::new();
        status.set_status_text("Listening");
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _scoped = status.scoped("Clearing the list");
            panic!("storage exploded");
        }));
        assert!(result.is_err());
        assert_eq!(status.status_text(), "Listening");
    }

    #[test]
    fn test_nested_scopes_unwind_in_order() {
        let mut status = ServerStatus::new();
        {
            let mut outer = status.scoped("Loading all datasets from file");
            {
                let inner = outer.scoped("Adding a dataset");
                assert_eq!(inner.status_text(), "Processing: Adding a dataset");
            }
            assert_eq!(outer.status_text(), "Processing: Loading all datasets from file");
        }
        assert_eq!(status.status_text(), IDLE);
        assert_eq!(status.request_count(), 2);
    }
}
