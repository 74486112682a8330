use crate::error::{ScoutError, ScoutResult};
use crate::models::{ContextFlag, FieldValue, ListingLink, ListingRecord};
use crate::scrapers::extractor::{self, CompletenessGate};
use crate::scrapers::pagination::Paginator;
use crate::scrapers::session::PageLoader;
use crate::scrapers::types::{FieldSpec, SearchConfig, SiteConfig, SCRAPED_AT, URL};
use chrono::Utc;
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

/// Asked between link collection and listing visits; `false` ends the run
pub type Confirmation<'a> = Box<dyn FnMut(&[ListingLink]) -> ScoutResult<bool> + 'a>;

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
    /// A fatal error stopped the run
    Aborted(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    pub search_pages: u32,
    pub links: usize,
    pub records: usize,
    /// Records rejected by the completeness gate
    pub dropped: usize,
    /// Listings that could not be loaded or read
    pub failed: usize,
}

/// Result of a run. `records` holds everything gathered, whatever the outcome.
#[derive(Debug)]
pub struct RunReport {
    pub records: Vec<ListingRecord>,
    pub stats: RunStats,
    pub outcome: RunOutcome,
}

impl RunReport {
    /// False when the run was stopped before any record was read, so an
    /// existing output file should be left alone
    pub fn has_output(&self) -> bool {
        !(self.outcome == RunOutcome::Cancelled && self.records.is_empty())
    }
}

/// Limits applied to every search configuration
#[derive(Debug, Clone)]
pub struct ScrapeLimits {
    /// Links collected per search configuration
    pub per_search: usize,
    pub max_retries: u32,
}

/// Runs link collection over all searches, then extracts every listing found
pub struct Orchestrator<'a> {
    loader: &'a PageLoader<'a>,
    site: &'a SiteConfig,
    spec: &'a FieldSpec,
    gate: &'a CompletenessGate,
    limits: ScrapeLimits,
    confirm: Option<Confirmation<'a>>,
    records: Vec<ListingRecord>,
    stats: RunStats,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        loader: &'a PageLoader<'a>,
        site: &'a SiteConfig,
        spec: &'a FieldSpec,
        gate: &'a CompletenessGate,
        limits: ScrapeLimits,
    ) -> Self {
        Self {
            loader,
            site,
            spec,
            gate,
            limits,
            confirm: None,
            records: Vec::new(),
            stats: RunStats::default(),
        }
    }

    pub fn with_confirmation(mut self, confirm: Confirmation<'a>) -> Self {
        self.confirm = Some(confirm);
        self
    }

    pub fn run(mut self, searches: &[SearchConfig]) -> RunReport {
        let outcome = match self.stages(searches) {
            Ok(()) => RunOutcome::Completed,
            Err(ScoutError::Cancelled) => {
                warn!("Run cancelled, keeping {} records gathered so far", self.records.len());
                RunOutcome::Cancelled
            }
            Err(e) => {
                error!("Run aborted: {}", e);
                RunOutcome::Aborted(e.to_string())
            }
        };

        self.stats.records = self.records.len();
        info!(
            "📊 {} result pages, {} links, {} records, {} dropped as incomplete, {} failed",
            self.stats.search_pages, self.stats.links, self.stats.records, self.stats.dropped, self.stats.failed
        );

        RunReport {
            records: self.records,
            stats: self.stats,
            outcome,
        }
    }

    fn stages(&mut self, searches: &[SearchConfig]) -> ScoutResult<()> {
        let links = self.collect_links(searches)?;
        self.stats.links = links.len();
        info!("🔗 Collected {} unique listing links from {} searches", links.len(), searches.len());

        if let Some(confirm) = self.confirm.as_mut() {
            if !confirm(&links)? {
                info!("Stopping before visiting listings");
                return Err(ScoutError::Cancelled);
            }
        }

        self.visit_listings(&links)
    }

    fn collect_links(&mut self, searches: &[SearchConfig]) -> ScoutResult<Vec<ListingLink>> {
        let paginator = Paginator::new(self.loader, self.site, self.limits.max_retries);
        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for (idx, search) in searches.iter().enumerate() {
            info!("🔍 Search {}/{}: {}", idx + 1, searches.len(), search.url);
            let found = paginator.collect_all(&search.url, &search.flags, self.limits.per_search)?;
            self.stats.search_pages += found.pages;
            let before = links.len();
            links.extend(found.links.into_iter().filter(|link| seen.insert(link.clone())));
            info!("Search {} added {} links", idx + 1, links.len() - before);
        }

        Ok(links)
    }

    fn visit_listings(&mut self, links: &[ListingLink]) -> ScoutResult<()> {
        for (idx, link) in links.iter().enumerate() {
            self.loader.cancel_token().check()?;
            info!("🏠 [{}/{}] {}", idx + 1, links.len(), link.url);

            match self.scrape_listing(link) {
                Ok(Some(record)) => {
                    debug!("Fields: {}", record.names().collect::<Vec<_>>().join(", "));
                    self.records.push(record);
                }
                Ok(None) => {
                    self.stats.dropped += 1;
                    info!("Dropped incomplete listing {}", link.url);
                }
                Err(e) if e.is_recoverable() => {
                    self.stats.failed += 1;
                    warn!("Skipping {}: {}", link.url, e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn scrape_listing(&self, link: &ListingLink) -> ScoutResult<Option<ListingRecord>> {
        self.loader.load(&link.url)?;
        let page = self.loader.browser().snapshot()?;
        Ok(extractor::extract(&page, self.spec, self.gate).map(|record| decorate(record, link)))
    }
}

/// Append source URL, search flags and scrape time to an extracted record
fn decorate(mut record: ListingRecord, link: &ListingLink) -> ListingRecord {
    record.set(URL, FieldValue::Text(link.url.clone()));
    for flag in ContextFlag::ALL {
        record.set(flag.field_name(), FieldValue::Bool(link.flags.contains(&flag)));
    }
    record.set(SCRAPED_AT, FieldValue::Text(Utc::now().to_rfc3339()));
    record
}
