use crate::console::Console;
use crate::error::{ScoutError, ScoutResult};
use crate::scrapers::session::CancelToken;
use crate::scrapers::traits::{Browser, InterstitialResolver};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Page overlay that blocks access to the content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interstitial {
    Consent,
    Captcha,
}

impl fmt::Display for Interstitial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interstitial::Consent => write!(f, "Cookie consent banner"),
            Interstitial::Captcha => write!(f, "CAPTCHA"),
        }
    }
}

/// Selectors recognizing interstitials; an empty selector disables detection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InterstitialSelectors {
    pub consent: String,
    pub consent_button: String,
    pub captcha: String,
}

impl Default for InterstitialSelectors {
    fn default() -> Self {
        Self {
            consent: "#usercentrics-root".to_string(),
            consent_button: "#accept".to_string(),
            captcha: ".geetest_panel, #captcha-box".to_string(),
        }
    }
}

impl InterstitialSelectors {
    fn for_kind(&self, kind: Interstitial) -> &str {
        match kind {
            Interstitial::Consent => &self.consent,
            Interstitial::Captcha => &self.captcha,
        }
    }
}

/// First visible interstitial on the current page, consent before CAPTCHA
pub fn detect_interstitial(
    browser: &dyn Browser,
    selectors: &InterstitialSelectors,
) -> ScoutResult<Option<Interstitial>> {
    for kind in [Interstitial::Consent, Interstitial::Captcha] {
        let selector = selectors.for_kind(kind);
        if !selector.is_empty() && browser.is_visible(selector)? {
            return Ok(Some(kind));
        }
    }
    Ok(None)
}

/// Poll until `selector` is no longer visible
fn wait_until_gone(
    browser: &dyn Browser,
    selector: &str,
    timeout: Duration,
    cancel: &CancelToken,
) -> ScoutResult<()> {
    let started = Instant::now();
    while browser.is_visible(selector)? {
        cancel.check()?;
        if started.elapsed() >= timeout {
            return Err(ScoutError::timeout(format!("{selector} to disappear"), timeout));
        }
        thread::sleep(POLL_INTERVAL);
    }
    Ok(())
}

/// Leaves the page as it is
pub struct NoOpResolver;

impl InterstitialResolver for NoOpResolver {
    fn resolve(&self, _: &dyn Browser, _: Interstitial, _: Duration, _: &CancelToken) -> ScoutResult<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "no-op"
    }
}

/// Clicks the consent button; waits for a CAPTCHA to be cleared by other means
pub struct AutoClickResolver {
    selectors: InterstitialSelectors,
}

impl AutoClickResolver {
    pub fn new(selectors: InterstitialSelectors) -> Self {
        Self { selectors }
    }
}

impl InterstitialResolver for AutoClickResolver {
    fn resolve(
        &self,
        browser: &dyn Browser,
        kind: Interstitial,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> ScoutResult<()> {
        if kind == Interstitial::Consent && !self.selectors.consent_button.is_empty() {
            if browser.is_visible(&self.selectors.consent_button)? {
                debug!("Clicking {}", self.selectors.consent_button);
                browser.click(&self.selectors.consent_button)?;
            } else {
                debug!("Consent button {} not visible", self.selectors.consent_button);
            }
        }
        wait_until_gone(browser, self.selectors.for_kind(kind), timeout, cancel)
    }

    fn name(&self) -> &'static str {
        "auto-click"
    }
}

/// Asks the operator to clear the interstitial in the browser window
pub struct ManualPromptResolver {
    console: Arc<Console>,
}

impl ManualPromptResolver {
    pub fn new(console: Arc<Console>) -> Self {
        Self { console }
    }
}

impl InterstitialResolver for ManualPromptResolver {
    fn resolve(
        &self,
        browser: &dyn Browser,
        kind: Interstitial,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> ScoutResult<()> {
        println!();
        println!("⚠️  {} on {}", kind, browser.current_url());
        self.console.ask(
            "   Solve it in the browser window, then press Enter to continue... ",
            Some(timeout),
            cancel,
        )?;
        info!("Operator confirmed {} as solved", kind);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "manual prompt"
    }
}

/// Routes consent banners and CAPTCHAs to different strategies
pub struct CompositeResolver {
    consent: Box<dyn InterstitialResolver + Send + Sync>,
    captcha: Box<dyn InterstitialResolver + Send + Sync>,
}

impl CompositeResolver {
    pub fn new(
        consent: Box<dyn InterstitialResolver + Send + Sync>,
        captcha: Box<dyn InterstitialResolver + Send + Sync>,
    ) -> Self {
        Self { consent, captcha }
    }
}

impl InterstitialResolver for CompositeResolver {
    fn resolve(
        &self,
        browser: &dyn Browser,
        kind: Interstitial,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> ScoutResult<()> {
        match kind {
            Interstitial::Consent => self.consent.resolve(browser, kind, timeout, cancel),
            Interstitial::Captcha => self.captcha.resolve(browser, kind, timeout, cancel),
        }
    }

    fn name(&self) -> &'static str {
        "composite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::testing::FakeBrowser;

    const PAGE: &str = "https://www.immobilienscout24.de/expose/1";

    #[test]
    fn nothing_detected_on_clean_page() {
        let browser = FakeBrowser::new().with_page(PAGE, "<h1 id='expose-title'>Wohnung</h1>");
        browser.navigate(PAGE).unwrap();
        let found = detect_interstitial(&browser, &InterstitialSelectors::default()).unwrap();
        assert_eq!(found, None);
    }

    #[test]
    fn consent_reported_before_captcha() {
        let browser = FakeBrowser::new().with_page(
            PAGE,
            r#"<div class="geetest_panel"></div><div id="usercentrics-root"></div>"#,
        );
        browser.navigate(PAGE).unwrap();
        let found = detect_interstitial(&browser, &InterstitialSelectors::default()).unwrap();
        assert_eq!(found, Some(Interstitial::Consent));
    }

    #[test]
    fn captcha_matches_any_selector_in_the_list() {
        let browser = FakeBrowser::new().with_page(PAGE, r#"<div id="captcha-box"></div>"#);
        browser.navigate(PAGE).unwrap();
        let found = detect_interstitial(&browser, &InterstitialSelectors::default()).unwrap();
        assert_eq!(found, Some(Interstitial::Captcha));
    }

    #[test]
    fn empty_selectors_disable_detection() {
        let browser = FakeBrowser::new().with_page(PAGE, r#"<div id="usercentrics-root"></div>"#);
        browser.navigate(PAGE).unwrap();
        let selectors = InterstitialSelectors {
            consent: String::new(),
            ..InterstitialSelectors::default()
        };
        assert_eq!(detect_interstitial(&browser, &selectors).unwrap(), None);
    }

    #[test]
    fn auto_click_accepts_consent() {
        let browser = FakeBrowser::new().with_page(
            PAGE,
            r#"<div id="usercentrics-root"><button id="accept">OK</button></div>"#,
        );
        browser.make_clickable_dismiss("#accept", "#usercentrics-root");
        browser.navigate(PAGE).unwrap();

        let resolver = AutoClickResolver::new(InterstitialSelectors::default());
        resolver
            .resolve(&browser, Interstitial::Consent, Duration::from_secs(1), &CancelToken::new())
            .unwrap();
        assert_eq!(browser.clicks(), vec!["#accept".to_string()]);
        assert!(!browser.is_visible("#usercentrics-root").unwrap());
    }

    #[test]
    fn auto_click_times_out_on_unsolved_captcha() {
        let browser = FakeBrowser::new().with_page(PAGE, r#"<div class="geetest_panel"></div>"#);
        browser.navigate(PAGE).unwrap();

        let resolver = AutoClickResolver::new(InterstitialSelectors::default());
        let err = resolver
            .resolve(&browser, Interstitial::Captcha, Duration::ZERO, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, ScoutError::Timeout { .. }));
        assert!(browser.clicks().is_empty());
    }

    #[test]
    fn cancellation_interrupts_waiting() {
        let browser = FakeBrowser::new().with_page(PAGE, r#"<div class="geetest_panel"></div>"#);
        browser.navigate(PAGE).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let resolver = AutoClickResolver::new(InterstitialSelectors::default());
        let err = resolver
            .resolve(&browser, Interstitial::Captcha, Duration::from_secs(60), &cancel)
            .unwrap_err();
        assert!(matches!(err, ScoutError::Cancelled));
    }
}
