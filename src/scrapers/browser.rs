use crate::error::{ScoutError, ScoutResult};
use crate::scrapers::document::PageDocument;
use crate::scrapers::traits::{Browser, WaitCondition};
use anyhow::{Context, Result};
use headless_chrome::{Browser as ChromeProcess, LaunchOptions, Tab};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How to launch Chrome
#[derive(Debug, Clone)]
pub struct ChromeOptions {
    pub headless: bool,
    pub window_size: (u32, u32),
    /// Profile directory; keeps cookies and consent decisions between runs
    pub user_data_dir: Option<PathBuf>,
}

impl Default for ChromeOptions {
    fn default() -> Self {
        Self {
            headless: false,
            window_size: (1366, 900),
            user_data_dir: None,
        }
    }
}

/// `Browser` backed by a single headless_chrome tab
pub struct ChromeBrowser {
    // the tab dies with the process, so it is kept alongside it
    _process: ChromeProcess,
    tab: Arc<Tab>,
}

impl ChromeBrowser {
    pub fn launch(options: &ChromeOptions) -> Result<Self> {
        info!(
            "Launching Chrome ({})...",
            if options.headless { "headless" } else { "headed" }
        );

        let launch = LaunchOptions::default_builder()
            .headless(options.headless)
            .window_size(Some(options.window_size))
            .user_data_dir(options.user_data_dir.clone())
            .idle_browser_timeout(Duration::from_secs(3600))
            .build()
            .context("Failed to build launch options")?;

        let process = ChromeProcess::new(launch).context("Failed to launch Chrome browser")?;
        let tab = process.new_tab().context("Failed to open a browser tab")?;

        Ok(Self {
            _process: process,
            tab,
        })
    }

    /// Evaluate `script` and return its JSON value
    fn evaluate(&self, script: &str) -> ScoutResult<serde_json::Value> {
        let result = self
            .tab
            .evaluate(script, false)
            .map_err(|e| classify(e, ScoutError::Snapshot))?;
        Ok(result.value.unwrap_or(serde_json::Value::Null))
    }
}

impl Browser for ChromeBrowser {
    fn navigate(&self, url: &str) -> ScoutResult<()> {
        self.tab.navigate_to(url).map_err(|e| {
            classify(e, |reason| ScoutError::Navigation {
                url: url.to_string(),
                reason,
            })
        })?;
        Ok(())
    }

    fn wait_for(&self, condition: &WaitCondition, timeout: Duration) -> ScoutResult<()> {
        match condition {
            WaitCondition::Load => {
                self.tab.set_default_timeout(timeout);
                self.tab
                    .wait_until_navigated()
                    .map_err(|e| classify(e, |_| ScoutError::timeout("page load", timeout)))?;
            }
            WaitCondition::Selector(selector) => {
                self.tab
                    .wait_for_element_with_custom_timeout(selector, timeout)
                    .map_err(|e| {
                        classify(e, |_| ScoutError::timeout(format!("selector {selector}"), timeout))
                    })?;
            }
        }
        Ok(())
    }

    fn snapshot(&self) -> ScoutResult<PageDocument> {
        let html = self.evaluate("document.documentElement.outerHTML")?;
        match html.as_str() {
            Some(html) if !html.is_empty() => {
                debug!("Captured {} bytes of HTML", html.len());
                Ok(PageDocument::parse(html))
            }
            _ => Err(ScoutError::Snapshot("page returned no HTML".into())),
        }
    }

    fn is_visible(&self, selector: &str) -> ScoutResult<bool> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({selector});
                if (!el) return false;
                const style = window.getComputedStyle(el);
                if (style.display === 'none' || style.visibility === 'hidden') return false;
                const rect = el.getBoundingClientRect();
                return rect.width > 0 || rect.height > 0 || el.shadowRoot !== null;
            }})()"#,
            selector = js_string(selector)
        );
        Ok(self.evaluate(&script)?.as_bool().unwrap_or(false))
    }

    fn click(&self, selector: &str) -> ScoutResult<()> {
        let native = self.tab.find_element(selector).and_then(|element| {
            element.click()?;
            Ok(())
        });
        match native {
            Ok(()) => Ok(()),
            Err(e) => {
                // consent dialogs often live in a shadow root the CDP lookup cannot reach
                debug!("Native click on {} failed ({}), trying script click", selector, e);
                let script = format!(
                    r#"(() => {{
                        const el = document.querySelector({selector});
                        if (!el) return false;
                        el.click();
                        return true;
                    }})()"#,
                    selector = js_string(selector)
                );
                if self.evaluate(&script)?.as_bool().unwrap_or(false) {
                    Ok(())
                } else {
                    Err(ScoutError::MissingSelector(selector.to_string()))
                }
            }
        }
    }

    fn reload(&self) -> ScoutResult<()> {
        let url = self.current_url();
        self.tab
            .reload(false, None)
            .map_err(|e| classify(e, |reason| ScoutError::Navigation { url, reason }))?;
        Ok(())
    }

    fn current_url(&self) -> String {
        self.tab.get_url()
    }
}

/// Map a headless_chrome error onto the scraping taxonomy.
/// A closed DevTools connection means the browser is gone; anything else
/// goes through `fallback`.
fn classify(error: anyhow::Error, fallback: impl FnOnce(String) -> ScoutError) -> ScoutError {
    let message = format!("{error:#}");
    if message.to_lowercase().contains("connection is closed") {
        warn!("Lost connection to Chrome: {}", message);
        ScoutError::Browser(message)
    } else {
        fallback(message)
    }
}

/// `value` as a JavaScript string literal
fn js_string(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}
