use crate::error::ScoutResult;
use crate::scrapers::document::PageDocument;
use crate::scrapers::interstitial::Interstitial;
use crate::scrapers::session::CancelToken;
use std::time::Duration;

/// Condition a bounded wait blocks on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitCondition {
    /// The current navigation has finished loading
    Load,
    /// An element matching the selector is present
    Selector(String),
}

/// Browser automation seam used by every scraping component.
/// Implementations drive a single tab; calls are sequential.
pub trait Browser {
    fn navigate(&self, url: &str) -> ScoutResult<()>;

    /// Block until `condition` holds, failing with `ScoutError::Timeout` after `timeout`
    fn wait_for(&self, condition: &WaitCondition, timeout: Duration) -> ScoutResult<()>;

    /// Parse the current DOM into a queryable document
    fn snapshot(&self) -> ScoutResult<PageDocument>;

    fn is_visible(&self, selector: &str) -> ScoutResult<bool>;

    fn click(&self, selector: &str) -> ScoutResult<()>;

    fn reload(&self) -> ScoutResult<()>;

    fn current_url(&self) -> String;
}

/// Strategy for getting past a consent banner or CAPTCHA.
/// Blocks until resolved, `timeout` elapses or `cancel` fires.
pub trait InterstitialResolver {
    fn resolve(
        &self,
        browser: &dyn Browser,
        kind: Interstitial,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> ScoutResult<()>;

    /// Name used in log lines
    fn name(&self) -> &'static str;
}
