//! In-memory browser serving canned HTML, for unit tests.

use crate::error::{ScoutError, ScoutResult};
use crate::scrapers::document::PageDocument;
use crate::scrapers::session::CancelToken;
use crate::scrapers::traits::{Browser, WaitCondition};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

type PageGenerator = Box<dyn Fn(&str) -> Option<String>>;

#[derive(Default)]
pub struct FakeBrowser {
    pages: HashMap<String, String>,
    generator: Option<PageGenerator>,
    current: RefCell<String>,
    visited: RefCell<Vec<String>>,
    clicks: RefCell<Vec<String>>,
    dismissals: RefCell<HashMap<String, String>>,
    hidden: RefCell<HashSet<String>>,
    failures: RefCell<HashMap<String, u32>>,
    load_timeout: Cell<bool>,
    dead: Cell<bool>,
    die_after: Cell<Option<usize>>,
    cancel_on: RefCell<Option<(String, CancelToken)>>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    /// Serve pages not registered with `with_page` from a function of the URL
    pub fn with_generator(mut self, generator: impl Fn(&str) -> Option<String> + 'static) -> Self {
        self.generator = Some(Box::new(generator));
        self
    }

    /// Make the next `times` navigations (or reloads) of `url` fail
    pub fn fail_navigation(&self, url: &str, times: u32) {
        self.failures.borrow_mut().insert(url.to_string(), times);
    }

    /// Clicking `button` hides everything matching `target`
    pub fn make_clickable_dismiss(&self, button: &str, target: &str) {
        self.dismissals
            .borrow_mut()
            .insert(button.to_string(), target.to_string());
    }

    pub fn set_load_timeout(&self, enabled: bool) {
        self.load_timeout.set(enabled);
    }

    /// Every subsequent call fails as if the browser process had died
    pub fn kill(&self) {
        self.dead.set(true);
    }

    /// The browser dies on the navigation after `visits` successful or failed ones
    pub fn kill_after_visits(&self, visits: usize) {
        self.die_after.set(Some(visits));
    }

    /// Cancel `token` as soon as `url` is navigated to, as a Ctrl-C would
    pub fn cancel_on_visit(&self, url: &str, token: CancelToken) {
        *self.cancel_on.borrow_mut() = Some((url.to_string(), token));
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.borrow().clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.clicks.borrow().clone()
    }

    fn alive(&self) -> ScoutResult<()> {
        if self.dead.get() {
            Err(ScoutError::Browser("browser process exited".into()))
        } else {
            Ok(())
        }
    }

    fn html(&self) -> String {
        let url = self.current.borrow();
        self.pages
            .get(url.as_str())
            .cloned()
            .or_else(|| self.generator.as_ref().and_then(|generate| generate(&url)))
            .unwrap_or_else(|| "<html><body></body></html>".to_string())
    }

    fn open(&self, url: &str) -> ScoutResult<()> {
        if self.die_after.get().is_some_and(|limit| self.visited.borrow().len() >= limit) {
            self.dead.set(true);
        }
        self.alive()?;
        self.visited.borrow_mut().push(url.to_string());
        if let Some((target, token)) = self.cancel_on.borrow().as_ref() {
            if target == url {
                token.cancel();
            }
        }
        let mut failures = self.failures.borrow_mut();
        if let Some(remaining) = failures.get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ScoutError::Navigation {
                    url: url.to_string(),
                    reason: "net::ERR_CONNECTION_RESET".into(),
                });
            }
        }
        *self.current.borrow_mut() = url.to_string();
        self.hidden.borrow_mut().clear();
        Ok(())
    }
}

impl Browser for FakeBrowser {
    fn navigate(&self, url: &str) -> ScoutResult<()> {
        self.open(url)
    }

    fn wait_for(&self, condition: &WaitCondition, timeout: Duration) -> ScoutResult<()> {
        self.alive()?;
        match condition {
            WaitCondition::Load if self.load_timeout.get() => Err(ScoutError::timeout("page load", timeout)),
            WaitCondition::Load => Ok(()),
            WaitCondition::Selector(selector) => {
                if self.is_visible(selector)? {
                    Ok(())
                } else {
                    Err(ScoutError::timeout(format!("selector {selector}"), timeout))
                }
            }
        }
    }

    fn snapshot(&self) -> ScoutResult<PageDocument> {
        self.alive()?;
        Ok(PageDocument::parse(&self.html()))
    }

    fn is_visible(&self, selector: &str) -> ScoutResult<bool> {
        self.alive()?;
        if self.hidden.borrow().contains(selector) {
            return Ok(false);
        }
        Ok(self.snapshot()?.query(selector)?.is_some())
    }

    fn click(&self, selector: &str) -> ScoutResult<()> {
        self.alive()?;
        self.clicks.borrow_mut().push(selector.to_string());
        if let Some(target) = self.dismissals.borrow().get(selector) {
            self.hidden.borrow_mut().insert(target.clone());
            return Ok(());
        }
        match self.snapshot()?.query(selector)? {
            Some(_) => Ok(()),
            None => Err(ScoutError::MissingSelector(selector.to_string())),
        }
    }

    fn reload(&self) -> ScoutResult<()> {
        let url = self.current.borrow().clone();
        self.open(&url)
    }

    fn current_url(&self) -> String {
        self.current.borrow().clone()
    }
}
