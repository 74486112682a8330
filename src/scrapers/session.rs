use crate::error::{ScoutError, ScoutResult};
use crate::scrapers::interstitial::{detect_interstitial, InterstitialSelectors};
use crate::scrapers::traits::{Browser, InterstitialResolver, WaitCondition};
use std::thread;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Cancellation shared between the Ctrl-C handler and the blocking scrape loop,
/// which polls it through `check`
#[derive(Debug, Clone, Default)]
pub struct CancelToken(CancellationToken);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Resolves once `cancel` has been called on any clone
    pub async fn cancelled(&self) {
        self.0.cancelled().await
    }

    pub fn check(&self) -> ScoutResult<()> {
        if self.is_cancelled() {
            Err(ScoutError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Timeouts and delays around every page load
#[derive(Debug, Clone)]
pub struct LoadSettings {
    pub page_load_timeout: Duration,
    pub selector_timeout: Duration,
    pub interstitial_timeout: Duration,
    /// Extra wait after load for client-side rendering
    pub settle: Duration,
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            page_load_timeout: Duration::from_secs(30),
            selector_timeout: Duration::from_secs(10),
            interstitial_timeout: Duration::from_secs(300),
            settle: Duration::from_millis(2000),
        }
    }
}

/// Loads pages into the browser, absorbing slow loads and interstitials
pub struct PageLoader<'a> {
    browser: &'a dyn Browser,
    resolver: &'a dyn InterstitialResolver,
    interstitials: &'a InterstitialSelectors,
    settings: LoadSettings,
    cancel: CancelToken,
}

impl<'a> PageLoader<'a> {
    pub fn new(
        browser: &'a dyn Browser,
        resolver: &'a dyn InterstitialResolver,
        interstitials: &'a InterstitialSelectors,
        settings: LoadSettings,
        cancel: CancelToken,
    ) -> Self {
        Self {
            browser,
            resolver,
            interstitials,
            settings,
            cancel,
        }
    }

    pub fn browser(&self) -> &'a dyn Browser {
        self.browser
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Navigate to `url` and leave the page ready for reading
    pub fn load(&self, url: &str) -> ScoutResult<()> {
        self.cancel.check()?;
        debug!("Navigating to {}", url);
        self.browser.navigate(url)?;
        self.settle()
    }

    /// Reload the current page, used when retrying after a recoverable error
    pub fn reload(&self) -> ScoutResult<()> {
        self.cancel.check()?;
        debug!("Reloading {}", self.browser.current_url());
        self.browser.reload()?;
        self.settle()
    }

    /// Wait for `selector`; a timeout only produces a warning
    pub fn soft_wait_for(&self, selector: &str) -> ScoutResult<()> {
        let condition = WaitCondition::Selector(selector.to_string());
        match self.browser.wait_for(&condition, self.settings.selector_timeout) {
            Err(ScoutError::Timeout { what, after }) => {
                warn!("Gave up waiting for {} after {:?}, proceeding anyway", what, after);
                Ok(())
            }
            other => other,
        }
    }

    fn settle(&self) -> ScoutResult<()> {
        match self.browser.wait_for(&WaitCondition::Load, self.settings.page_load_timeout) {
            Ok(()) => {}
            Err(ScoutError::Timeout { after, .. }) => {
                warn!(
                    "Page {} still loading after {:?}, proceeding anyway",
                    self.browser.current_url(),
                    after
                );
            }
            Err(e) => return Err(e),
        }

        if !self.settings.settle.is_zero() {
            thread::sleep(self.settings.settle);
        }
        self.cancel.check()?;

        self.handle_interstitials()
    }

    /// Resolve consent banners and CAPTCHAs until none is visible.
    /// Each kind gets one resolution attempt per load.
    fn handle_interstitials(&self) -> ScoutResult<()> {
        let mut attempted = Vec::new();
        while let Some(kind) = detect_interstitial(self.browser, self.interstitials)? {
            if attempted.contains(&kind) {
                warn!("{} still visible after {} resolved it", kind, self.resolver.name());
                return Err(ScoutError::MissingSelector(format!("{kind} not cleared")));
            }
            attempted.push(kind);

            info!("{} detected, handing over to {}", kind, self.resolver.name());
            self.resolver
                .resolve(self.browser, kind, self.settings.interstitial_timeout, &self.cancel)?;
            self.cancel.check()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::interstitial::{Interstitial, NoOpResolver};
    use crate::scrapers::testing::FakeBrowser;
    use std::cell::RefCell;

    fn quick_settings() -> LoadSettings {
        LoadSettings {
            settle: Duration::ZERO,
            ..LoadSettings::default()
        }
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let observer = token.clone();
        assert!(observer.check().is_ok());
        token.cancel();
        assert!(matches!(observer.check(), Err(ScoutError::Cancelled)));
    }

    #[tokio::test]
    async fn cancel_from_blocking_thread_wakes_waiters() {
        let token = CancelToken::new();
        let worker = token.clone();
        tokio::task::spawn_blocking(move || worker.cancel()).await.unwrap();
        token.cancelled().await;
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancellation_during_load_is_reported() {
        let browser = FakeBrowser::new().with_page("https://example.test/a", "<p>content</p>");
        let selectors = InterstitialSelectors::default();
        let cancel = CancelToken::new();
        browser.cancel_on_visit("https://example.test/a", cancel.clone());
        let loader = PageLoader::new(&browser, &NoOpResolver, &selectors, quick_settings(), cancel);

        assert!(matches!(loader.load("https://example.test/a"), Err(ScoutError::Cancelled)));
        assert_eq!(browser.visited(), vec!["https://example.test/a".to_string()]);
    }

    #[test]
    fn load_timeout_downgrades_to_warning() {
        let browser = FakeBrowser::new().with_page("https://example.test/a", "<p>slow</p>");
        browser.set_load_timeout(true);
        let selectors = InterstitialSelectors::default();
        let loader = PageLoader::new(&browser, &NoOpResolver, &selectors, quick_settings(), CancelToken::new());

        loader.load("https://example.test/a").unwrap();
        assert_eq!(browser.current_url(), "https://example.test/a");
    }

    #[test]
    fn cancelled_loader_refuses_to_navigate() {
        let browser = FakeBrowser::new();
        let selectors = InterstitialSelectors::default();
        let cancel = CancelToken::new();
        cancel.cancel();
        let loader = PageLoader::new(&browser, &NoOpResolver, &selectors, quick_settings(), cancel);

        assert!(matches!(loader.load("https://example.test/a"), Err(ScoutError::Cancelled)));
        assert!(browser.visited().is_empty());
    }

    struct RemovingResolver {
        seen: RefCell<Vec<Interstitial>>,
    }

    impl InterstitialResolver for RemovingResolver {
        fn resolve(&self, browser: &dyn Browser, kind: Interstitial, _: Duration, _: &CancelToken) -> ScoutResult<()> {
            self.seen.borrow_mut().push(kind);
            browser.click("#accept")
        }

        fn name(&self) -> &'static str {
            "test resolver"
        }
    }

    #[test]
    fn consent_banner_goes_through_resolver() {
        let browser = FakeBrowser::new().with_page(
            "https://example.test/a",
            r#"<div id="usercentrics-root"></div><p>content</p>"#,
        );
        browser.make_clickable_dismiss("#accept", "#usercentrics-root");
        let selectors = InterstitialSelectors::default();
        let resolver = RemovingResolver { seen: RefCell::new(Vec::new()) };
        let loader = PageLoader::new(&browser, &resolver, &selectors, quick_settings(), CancelToken::new());

        loader.load("https://example.test/a").unwrap();
        assert_eq!(*resolver.seen.borrow(), vec![Interstitial::Consent]);
    }

    #[test]
    fn unresolved_interstitial_is_a_recoverable_error() {
        let browser = FakeBrowser::new().with_page(
            "https://example.test/a",
            r#"<div class="geetest_panel"></div>"#,
        );
        let selectors = InterstitialSelectors::default();
        let loader = PageLoader::new(&browser, &NoOpResolver, &selectors, quick_settings(), CancelToken::new());

        let err = loader.load("https://example.test/a").unwrap_err();
        assert!(err.is_recoverable());
    }
}
