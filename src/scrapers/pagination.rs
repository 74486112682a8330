use crate::error::{ScoutError, ScoutResult};
use crate::models::{ContextFlags, ListingLink};
use crate::scrapers::links;
use crate::scrapers::session::PageLoader;
use crate::scrapers::types::SiteConfig;
use std::collections::HashSet;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageState {
    Loading(u32),
    Extracting(u32),
    Continue(u32),
    Exhausted,
}

/// Links found by one search configuration, plus how many pages it took
#[derive(Debug, Default)]
pub struct PaginationResult {
    pub links: Vec<ListingLink>,
    pub pages: u32,
}

/// Walks the result pages of one search configuration
pub struct Paginator<'a> {
    loader: &'a PageLoader<'a>,
    site: &'a SiteConfig,
    max_retries: u32,
}

impl<'a> Paginator<'a> {
    pub fn new(loader: &'a PageLoader<'a>, site: &'a SiteConfig, max_retries: u32) -> Self {
        Self {
            loader,
            site,
            max_retries,
        }
    }

    /// Collect up to `limit` links from `search_url` and the pages after it.
    ///
    /// Stops at the first page without new links. Recoverable failures retry
    /// the same page; once the retry budget is spent the search ends with
    /// whatever it has. Only fatal errors are returned.
    pub fn collect_all(
        &self,
        search_url: &str,
        flags: &ContextFlags,
        limit: usize,
    ) -> ScoutResult<PaginationResult> {
        let seed = Url::parse(search_url).map_err(|e| ScoutError::Navigation {
            url: search_url.to_string(),
            reason: e.to_string(),
        })?;

        let mut result = PaginationResult::default();
        let mut seen: HashSet<ListingLink> = HashSet::new();
        let mut retries = 0;
        let mut state = if limit == 0 {
            PageState::Exhausted
        } else {
            PageState::Loading(start_page(&seed, &self.site.page_param))
        };

        loop {
            state = match state {
                PageState::Loading(page) => {
                    let url = page_url(&seed, &self.site.page_param, page);
                    info!("📄 Loading result page {}: {}", page, url);
                    match self.load(&url, retries > 0) {
                        Ok(()) => PageState::Extracting(page),
                        Err(e) => self.retry_or_stop(e, page, &mut retries)?,
                    }
                }
                PageState::Extracting(page) => match self.extract(flags, limit - result.links.len()) {
                    Ok(found) => {
                        retries = 0;
                        result.pages += 1;
                        let fresh: Vec<_> = found.into_iter().filter(|link| seen.insert(link.clone())).collect();
                        info!("Page {} yielded {} new links", page, fresh.len());
                        if fresh.is_empty() {
                            debug!("No new links on page {}, search exhausted", page);
                            PageState::Exhausted
                        } else {
                            result.links.extend(fresh);
                            PageState::Continue(page)
                        }
                    }
                    Err(e) => self.retry_or_stop(e, page, &mut retries)?,
                },
                PageState::Continue(page) if result.links.len() < limit => PageState::Loading(page + 1),
                PageState::Continue(_) => PageState::Exhausted,
                PageState::Exhausted => break,
            };
        }

        result.links.truncate(limit);
        Ok(result)
    }

    fn load(&self, url: &str, retrying: bool) -> ScoutResult<()> {
        if retrying && self.loader.browser().current_url() == url {
            self.loader.reload()?;
        } else {
            self.loader.load(url)?;
        }
        self.loader.soft_wait_for(&self.site.result_container)
    }

    fn extract(&self, flags: &ContextFlags, remaining: usize) -> ScoutResult<Vec<ListingLink>> {
        let page = self.loader.browser().snapshot()?;
        links::collect(&page, flags, self.site, remaining)
    }

    fn retry_or_stop(&self, error: ScoutError, page: u32, retries: &mut u32) -> ScoutResult<PageState> {
        if !error.is_recoverable() {
            return Err(error);
        }
        if *retries < self.max_retries {
            *retries += 1;
            warn!("Page {} failed ({}), retry {}/{}", page, error, retries, self.max_retries);
            Ok(PageState::Loading(page))
        } else {
            warn!("Page {} failed after {} retries ({}), ending this search", page, self.max_retries, error);
            Ok(PageState::Exhausted)
        }
    }
}

/// Page number in the seed URL's query, or 1
fn start_page(seed: &Url, param: &str) -> u32 {
    seed.query_pairs()
        .find(|(key, _)| key == param)
        .and_then(|(_, value)| value.parse::<u32>().ok())
        .filter(|page| *page > 0)
        .unwrap_or(1)
}

/// Seed URL with the page parameter set to `page`, other parameters untouched
fn page_url(seed: &Url, param: &str, page: u32) -> String {
    let pairs: Vec<(String, String)> = seed
        .query_pairs()
        .filter(|(key, _)| key != param)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let mut url = seed.clone();
    {
        let mut query = url.query_pairs_mut();
        query.clear();
        for (key, value) in &pairs {
            query.append_pair(key, value);
        }
        query.append_pair(param, &page.to_string());
    }
    url.to_string()
}
