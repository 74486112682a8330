use std::time::Duration;
use thiserror::Error;

/// Errors raised by the scraping core
#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Timed out after {:?} waiting for {what}", .after)]
    Timeout { what: String, after: Duration },

    #[error("Selector not found: {0}")]
    MissingSelector(String),

    #[error("Invalid CSS selector: {0}")]
    InvalidSelector(String),

    #[error("Could not read page content: {0}")]
    Snapshot(String),

    #[error("Browser unavailable: {0}")]
    Browser(String),

    #[error("Run cancelled")]
    Cancelled,
}

impl ScoutError {
    /// Whether retrying the same page (or skipping the current listing) is sensible.
    /// Anything else ends the run. A bad selector fails the same way on every
    /// page, so it is not recoverable; field selectors are handled per field.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Navigation { .. }
                | Self::Timeout { .. }
                | Self::MissingSelector(_)
                | Self::Snapshot(_)
        )
    }

    pub fn timeout(what: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            after,
        }
    }
}

pub type ScoutResult<T> = std::result::Result<T, ScoutError>;
